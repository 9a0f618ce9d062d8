//! Driving the deferred queue from tokio.
//!
//! quill defers batched state flushes and component updates to a
//! per-thread queue. Inside a tokio current-thread runtime, await
//! [`run_until_idle`] wherever the host would otherwise end its turn:
//!
//! ```ignore
//! counter.set("count", 1)?;
//! quill::runtime::run_until_idle().await?;
//! assert_eq!(counter.element().unwrap().text_content(), "1");
//! ```

use quill_core::scheduler::{self, SchedulerError};

/// Drain the deferred queue until it stays empty, yielding to tokio between
/// drains so other tasks on the runtime can queue more work.
///
/// Returns the number of tasks run.
pub async fn run_until_idle() -> Result<usize, SchedulerError> {
    let mut total = 0;
    loop {
        total += scheduler::drain()?;
        tokio::task::yield_now().await;
        if scheduler::is_idle() {
            tracing::trace!(tasks = total, "deferred queue idle");
            return Ok(total);
        }
    }
}
