//! Log output setup.
//!
//! quill logs through `tracing`. Applications that have no subscriber of
//! their own can install the stock one here:
//!
//! ```ignore
//! quill::logging::init();
//! // or
//! quill::logging::init_with(LogConfig::default().with_filter("quill=debug"));
//! ```
//!
//! `RUST_LOG` overrides the configured filter when set.

use tracing_subscriber::EnvFilter;

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directives used when `RUST_LOG` is not set.
    pub filter: String,
    /// Print the event target (module path) with each line.
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "quill=info".to_string(),
            with_target: false,
        }
    }
}

impl LogConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.filter))
    }
}

/// Install a formatting subscriber with the default settings.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init() -> bool {
    init_with(LogConfig::default())
}

/// Install a formatting subscriber configured by `config`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_with(config: LogConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(config.with_target)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = LogConfig::default()
            .with_filter("quill_core=trace")
            .with_target(true);
        assert_eq!(config.filter, "quill_core=trace");
        assert!(config.with_target);
        assert_eq!(LogConfig::default().filter, "quill=info");
    }

    #[test]
    fn second_init_is_harmless() {
        init();
        assert!(!init());
    }
}
