//! geoconvert: Geospatial Vector Conversion CLI
//!
//! Usage: `geoconvert <input> <output> <source_format> <target_format>`.
//! Progress and the final result are written to stdout as JSON lines;
//! diagnostics go to stderr.

use std::io;
use std::process::ExitCode;

use geoconvert::cli;
use geoconvert::utils::init_logging;

fn main() -> ExitCode {
    init_logging();

    let stdout = io::stdout();
    let code = cli::run(std::env::args_os(), stdout.lock());
    ExitCode::from(code)
}
