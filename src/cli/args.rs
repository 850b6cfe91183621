//! Command-line argument definitions using clap

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable naming the directory for temporary files
pub const TEMP_DIR_ENV: &str = "GEOCONVERT_TMPDIR";

/// Usage line reported when the argument count is wrong
pub const USAGE: &str =
    "Invalid arguments. Usage: geoconvert <input> <output> <source_format> <target_format>";

/// geoconvert - Convert a geospatial vector file between formats,
/// reporting progress as JSON lines on stdout
#[derive(Parser, Debug)]
#[command(name = "geoconvert")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input file path (GeoJSON, GeoPackage, Shapefile, KML, KMZ, GPX or GML)
    pub input: PathBuf,

    /// Output file path. Shapefile output is written into a folder named
    /// after the file stem.
    pub output: PathBuf,

    /// Source format (e.g. geojson, gpkg, shp, kml, kmz, gpx, gml)
    pub source_format: String,

    /// Target format (geojson, gpkg, shp, kml, kmz, gpx, gml, wkt).
    /// Unknown formats are written as GeoJSON.
    pub target_format: String,
}

/// Everything the orchestrator needs for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub source_format: String,
    pub target_format: String,
    pub temp_root: PathBuf,
}

impl Cli {
    /// Build the conversion request. Temporary files go under
    /// `$GEOCONVERT_TMPDIR`, or the system temp directory when it is unset.
    pub fn request(&self) -> ConversionRequest {
        ConversionRequest {
            input_path: self.input.clone(),
            output_path: self.output.clone(),
            source_format: self.source_format.clone(),
            target_format: self.target_format.clone(),
            temp_root: temp_root_from(std::env::var_os(TEMP_DIR_ENV)),
        }
    }
}

fn temp_root_from(value: Option<OsString>) -> PathBuf {
    value
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}
