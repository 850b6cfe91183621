//! Utility module - logging setup and message formatting

pub mod format;
pub mod logging;

pub use format::*;
pub use logging::*;
