//! Conversion orchestrator
//!
//! Runs the fixed conversion sequence for one request and turns the outcome
//! into progress/result events plus a process exit code.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};

use super::args::{Cli, ConversionRequest, USAGE};
use crate::pipeline::archive::extract_kml_payload;
use crate::pipeline::dataset::FeatureTable;
use crate::pipeline::engine::EngineChain;
use crate::pipeline::formats::{self, resolve_driver};
use crate::pipeline::loader::{
    ensure_input_exists, ensure_shapefile_sidecars, input_size, load_dataset,
};
use crate::pipeline::writer::{measure_output, write_wkt, OutputLayout, OutputSize};
use crate::report::{ProgressReporter, ResultEvent};
use crate::utils::group_thousands;

/// Exit code for a successful conversion
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for any failure, including bad arguments
pub const EXIT_FAILURE: u8 = 1;

/// What a successful conversion produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionSummary {
    /// File written, or the folder for bundled formats
    pub output_path: PathBuf,
    pub features_count: usize,
}

/// Parse `args`, run the conversion and report everything on `out`.
/// Returns the process exit code.
pub fn run<I, T, W>(args: I, out: W) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
{
    let mut reporter = ProgressReporter::new(out);

    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            debug!("Argument parsing failed: {}", err);
            let _ = reporter.result(ResultEvent::failed(USAGE, err.render().to_string()));
            return EXIT_FAILURE;
        }
    };

    let engines = EngineChain::with_default_engines();
    execute(&cli.request(), &engines, &mut reporter)
}

/// Run one conversion, catching any failure at this single point
pub fn execute<W: Write>(
    request: &ConversionRequest,
    engines: &EngineChain,
    reporter: &mut ProgressReporter<W>,
) -> u8 {
    match run_convert(request, engines, reporter) {
        Ok(summary) => {
            info!(
                "Converted {} features to {}",
                summary.features_count,
                summary.output_path.display()
            );
            let emitted = reporter.result(ResultEvent::converted(
                &summary.output_path,
                summary.features_count,
            ));
            match emitted {
                Ok(()) => EXIT_SUCCESS,
                Err(err) => {
                    error!("Failed to report result: {}", err);
                    EXIT_FAILURE
                }
            }
        }
        Err(err) => {
            let message = format!("{:#}", err);
            error!("Conversion failed: {}", message);
            let _ = reporter.failed(format!("Error: {}", message));
            let _ = reporter.result(ResultEvent::failed(message, format!("{:?}", err)));
            EXIT_FAILURE
        }
    }
}

/// The conversion sequence. Any error aborts the remaining steps.
pub fn run_convert<W: Write>(
    request: &ConversionRequest,
    engines: &EngineChain,
    reporter: &mut ProgressReporter<W>,
) -> Result<ConversionSummary> {
    let source = request.source_format.as_str();
    let target = request.target_format.as_str();
    let input = request.input_path.as_path();

    reporter.processing(0, "Starting conversion")?;
    ensure_input_exists(input)?;
    if formats::is_shapefile_format(source) {
        ensure_shapefile_sidecars(input)?;
    }

    reporter.processing(5, format!("Opening {} file", source))?;
    let archive = if formats::is_zipped_format(source) {
        Some(extract_kml_payload(input, &request.temp_root)?)
    } else {
        None
    };
    let read_path: &Path = archive.as_ref().map_or(input, |a| a.payload());

    let reading = match input_size(input) {
        Some(bytes) => format!("Reading {} file ({} bytes)", source, group_thousands(bytes)),
        None => format!("Reading {} file", source),
    };
    reporter.processing(10, reading)?;

    let table = load_dataset(engines, read_path, source)?;
    drop(archive);

    let count = group_thousands(table.len() as u64);
    reporter.processing(30, format!("Loaded {} features", count))?;
    reporter.processing(
        40,
        format!(
            "Processing {} features with {} attributes",
            count,
            table.attribute_count()
        ),
    )?;

    let driver = resolve_driver(target, &engines.available_drivers());
    debug!("Resolved driver {} for target format {}", driver, target);
    reporter.processing(50, format!("Preparing output format: {}", driver))?;

    let layout = if formats::is_bundled_format(target) {
        OutputLayout::bundle(&request.output_path).with_context(|| {
            format!(
                "Failed to create output folder for {}",
                request.output_path.display()
            )
        })?
    } else {
        OutputLayout::file(&request.output_path)
    };

    reporter.processing(60, format!("Writing {} features to {}", count, target))?;

    if let Err(err) = write_output(&table, &layout, target, driver, engines, reporter, &count) {
        layout.discard();
        return Err(err);
    }

    match measure_output(&layout) {
        Ok(OutputSize::File(bytes)) => {
            reporter.processing(95, format!("Output file: {} bytes", group_thousands(bytes)))?
        }
        Ok(OutputSize::Bundle(bytes)) => {
            reporter.processing(95, format!("Output bundle: {} bytes", group_thousands(bytes)))?
        }
        Err(err) => {
            debug!("Could not measure output: {}", err);
            reporter.processing(95, "Finalizing conversion")?
        }
    }

    reporter.completed(format!("Successfully converted {} features", count))?;

    Ok(ConversionSummary {
        output_path: layout.result_path,
        features_count: table.len(),
    })
}

/// Steps 70-90: encode the table into the prepared layout
fn write_output<W: Write>(
    table: &FeatureTable,
    layout: &OutputLayout,
    target: &str,
    driver: &str,
    engines: &EngineChain,
    reporter: &mut ProgressReporter<W>,
    count: &str,
) -> Result<()> {
    if formats::is_wkt_format(target) {
        reporter.processing(70, "Converting geometries to WKT format")?;
        reporter.processing(85, "Writing WKT data to .wkt file")?;
        write_wkt(table, &layout.write_path).with_context(|| {
            format!("Failed to write WKT file: {}", layout.write_path.display())
        })?;
    } else {
        reporter.processing(70, format!("Encoding {} features", count))?;
        engines
            .write(table, &layout.write_path, driver)
            .with_context(|| {
                format!(
                    "Failed to write {} output: {}",
                    driver,
                    layout.write_path.display()
                )
            })?;
        reporter.processing(90, "Finalizing output file")?;
    }
    Ok(())
}
