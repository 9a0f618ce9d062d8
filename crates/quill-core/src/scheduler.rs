//! The per-thread deferred task queue.
//!
//! Everything that happens "at the end of the current turn" (batched state
//! flushes, batched component updates) is queued here with [`defer`] and run
//! by [`drain`]. The host decides when a turn ends: tests call [`drain`]
//! directly, the `quill` facade offers an async driver on top of tokio.
//!
//! # Example
//!
//! ```ignore
//! use quill_core::scheduler;
//!
//! scheduler::defer(|| println!("later"));
//! println!("now");
//! scheduler::drain()?; // prints "later"
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::error::Error as StdError;

use thiserror::Error;

// ============================================================================
// Configuration
// ============================================================================

/// Tuning for the deferred queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on tasks a single [`drain`] call runs, counting tasks
    /// queued by other tasks during the drain.
    pub max_tasks_per_drain: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_drain: 10_000,
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_tasks_per_drain(mut self, max: usize) -> Self {
        self.max_tasks_per_drain = max;
        self
    }
}

/// Errors surfaced by [`drain`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The drain hit its task budget; the remaining tasks stay queued.
    #[error("deferred queue exceeded {budget} tasks in one drain ({remaining} still queued)")]
    TaskBudgetExceeded { budget: usize, remaining: usize },
    /// A task returned an error; tasks after it stay queued.
    #[error("deferred task failed: {0}")]
    TaskFailed(Box<dyn StdError>),
}

// ============================================================================
// Queue
// ============================================================================

/// Identifier of a queued task, usable with [`cancel`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(usize);

type Task = Box<dyn FnOnce() -> Result<(), Box<dyn StdError>>>;

thread_local! {
    static QUEUE: RefCell<TaskQueue> = RefCell::new(TaskQueue::new());
}

struct TaskQueue {
    tasks: VecDeque<(TaskId, Task)>,
    config: SchedulerConfig,
    /// Whether a drain is running on this thread
    draining: bool,
    next_id: usize,
}

impl TaskQueue {
    fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
            config: SchedulerConfig::default(),
            draining: false,
            next_id: 0,
        }
    }

    fn push(&mut self, task: Task) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.push_back((id, task));
        id
    }
}

/// Queue `task` to run at the end of the current turn.
pub fn defer<F>(task: F) -> TaskId
where
    F: FnOnce() + 'static,
{
    QUEUE.with(|queue| {
        queue.borrow_mut().push(Box::new(move || {
            task();
            Ok(())
        }))
    })
}

/// Queue a fallible task. An error stops the drain and is returned from it.
pub fn try_defer<F, E>(task: F) -> TaskId
where
    F: FnOnce() -> Result<(), E> + 'static,
    E: StdError + 'static,
{
    QUEUE.with(|queue| {
        queue
            .borrow_mut()
            .push(Box::new(move || task().map_err(|err| Box::new(err) as Box<dyn StdError>)))
    })
}

/// Remove a queued task. Returns `false` if it already ran or was cancelled.
pub fn cancel(id: TaskId) -> bool {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let before = queue.tasks.len();
        queue.tasks.retain(|(task_id, _)| *task_id != id);
        queue.tasks.len() != before
    })
}

/// Number of queued tasks.
pub fn pending() -> usize {
    QUEUE.with(|queue| queue.borrow().tasks.len())
}

pub fn is_idle() -> bool {
    pending() == 0
}

/// Replace this thread's scheduler configuration.
pub fn configure(config: SchedulerConfig) {
    QUEUE.with(|queue| queue.borrow_mut().config = config);
}

/// Drop every queued task without running it.
pub fn clear() {
    let dropped = QUEUE.with(|queue| std::mem::take(&mut queue.borrow_mut().tasks));
    // Dropping tasks may drop component handles; do it outside the borrow.
    drop(dropped);
}

/// Resets the draining flag even if a task panics.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        QUEUE.with(|queue| queue.borrow_mut().draining = false);
    }
}

/// Run queued tasks in FIFO order, including tasks queued while draining.
///
/// Returns the number of tasks run. A nested call from inside a task is a
/// no-op returning `Ok(0)`; the outer drain picks up whatever was queued.
pub fn drain() -> Result<usize, SchedulerError> {
    let budget = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.draining {
            None
        } else {
            queue.draining = true;
            Some(queue.config.max_tasks_per_drain)
        }
    });
    let Some(budget) = budget else {
        return Ok(0);
    };
    let _guard = DrainGuard;

    let mut ran = 0;
    loop {
        if ran >= budget && !is_idle() {
            let remaining = pending();
            tracing::error!(budget, remaining, "deferred queue did not settle");
            return Err(SchedulerError::TaskBudgetExceeded { budget, remaining });
        }
        let next = QUEUE.with(|queue| queue.borrow_mut().tasks.pop_front());
        let Some((_, task)) = next else {
            break;
        };
        ran += 1;
        task().map_err(SchedulerError::TaskFailed)?;
    }

    if ran > 0 {
        tracing::debug!(ran, "drained deferred queue");
    }
    Ok(ran)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn runs_in_fifo_order_including_nested() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log1 = Rc::clone(&log);
        defer(move || {
            log1.borrow_mut().push(1);
            let log3 = Rc::clone(&log1);
            defer(move || log3.borrow_mut().push(3));
        });
        let log2 = Rc::clone(&log);
        defer(move || log2.borrow_mut().push(2));

        assert_eq!(drain().unwrap(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert!(is_idle());
    }

    #[test]
    fn cancel_skips_task() {
        let ran = Rc::new(Cell::new(false));
        let ran_clone = Rc::clone(&ran);
        let id = defer(move || ran_clone.set(true));
        assert!(cancel(id));
        assert!(!cancel(id));
        drain().unwrap();
        assert!(!ran.get());
    }

    #[test]
    fn nested_drain_is_noop() {
        let inner = Rc::new(Cell::new(None));
        let inner_clone = Rc::clone(&inner);
        defer(move || inner_clone.set(Some(drain().unwrap())));
        drain().unwrap();
        assert_eq!(inner.get(), Some(0));
    }

    #[test]
    fn budget_stops_runaway_loop() {
        fn requeue(count: Rc<Cell<usize>>) {
            defer(move || {
                count.set(count.get() + 1);
                requeue(count);
            });
        }
        configure(SchedulerConfig::default().with_max_tasks_per_drain(5));
        let count = Rc::new(Cell::new(0));
        requeue(Rc::clone(&count));

        let err = drain().unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::TaskBudgetExceeded {
                budget: 5,
                remaining: 1
            }
        ));
        assert_eq!(count.get(), 5);
        clear();
        assert!(is_idle());
    }

    #[test]
    fn failing_task_stops_drain() {
        #[derive(Debug, Error)]
        #[error("boom")]
        struct Boom;

        try_defer(|| Err(Boom));
        defer(|| {});

        let err = drain().unwrap_err();
        assert_eq!(err.to_string(), "deferred task failed: boom");
        assert_eq!(pending(), 1);
        assert_eq!(drain().unwrap(), 1);
    }
}
