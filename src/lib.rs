//! geoconvert: Geospatial Vector Conversion Library
//!
//! Converts vector files between GeoJSON, GeoPackage, Shapefile, KML/KMZ,
//! GPX, GML and WKT, reporting progress as newline-delimited JSON events.

pub mod cli;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod utils;
