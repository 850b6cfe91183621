//! CLI module - argument parsing and the conversion orchestrator

pub mod args;
pub mod convert;

pub use args::{Cli, ConversionRequest, USAGE};
pub use convert::{execute, run, run_convert, ConversionSummary, EXIT_FAILURE, EXIT_SUCCESS};
