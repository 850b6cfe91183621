//! Error types for the conversion pipeline.
//!
//! `ConvertError` covers failures the orchestrator detects itself;
//! `EngineError` covers failures reported by a read/write engine. Both are
//! wrapped in `anyhow::Error` at the application layer so the top-level
//! handler can render the full cause chain.

use std::path::PathBuf;

use thiserror::Error;

/// Failures detected by the orchestrator before or around engine calls.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The input path does not exist.
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// A shapefile is missing one or more of its mandatory sidecar files.
    #[error("Missing required files: {}", .missing.join(", "))]
    MissingSidecars {
        /// Shapefile that was checked
        path: PathBuf,
        /// Missing extensions, e.g. `.shx`
        missing: Vec<String>,
    },

    /// A KMZ archive has no `.kml` document inside it.
    #[error("KMZ archive {} does not contain a .kml document", .0.display())]
    NoKmlPayload(PathBuf),

    /// The archive could not be opened or read.
    #[error("Failed to read KMZ archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Failures reported by a `VectorEngine`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine cannot read this kind of file.
    #[error("{engine} engine cannot read {}", .path.display())]
    UnsupportedInput { engine: &'static str, path: PathBuf },

    /// The engine has no writer for the requested driver.
    #[error("{engine} engine does not support the {driver} driver")]
    UnsupportedDriver { engine: &'static str, driver: String },

    /// A geometry could not be converted between representations.
    #[error("Invalid geometry in feature {index}: {message}")]
    Geometry { index: usize, message: String },

    /// The document parsed but does not have the expected structure.
    #[error("Invalid {format} document: {message}")]
    Malformed { format: &'static str, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    GeoJson(#[from] geojson::Error),

    #[error(transparent)]
    Gpx(#[from] gpx::errors::GpxError),

    #[error(transparent)]
    Shapefile(#[from] shapefile::Error),

    #[error(transparent)]
    Dbase(#[from] shapefile::dbase::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Wkb(#[from] geozero::error::GeozeroError),

    #[error(transparent)]
    XmlRead(#[from] xmltree::ParseError),

    #[error(transparent)]
    XmlWrite(#[from] xmltree::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[cfg(feature = "gdal")]
    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),
}
