//! Diagnostic logging setup
//!
//! Logs go to stderr through `env_logger`; stdout carries only the JSON event
//! stream. The filter is read from `GEOCONVERT_LOG` (same syntax as
//! `RUST_LOG`) and defaults to `warn`.

use env_logger::{Builder, Env, Target};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "GEOCONVERT_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Initialise the global logger. Safe to call more than once.
pub fn init_logging() {
    let _ = Builder::from_env(Env::new().filter_or(LOG_ENV, DEFAULT_FILTER))
        .target(Target::Stderr)
        .format_timestamp_millis()
        .try_init();
}
