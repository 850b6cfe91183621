//! Pure-Rust engine built on the GeoRust codecs
//!
//! Reads and writes GeoJSON, GeoPackage, Shapefile, KML, GPX and GML with no
//! system libraries. The declared source format picks the reader; the file
//! extension is only consulted when the declared format is not one of ours.

mod geojson_io;
mod gml_io;
mod gpkg_io;
mod gpx_io;
mod kml_io;
mod markup;
mod shapefile_io;

use std::collections::BTreeSet;
use std::path::Path;

use geo_types::{Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon};

use super::VectorEngine;
use crate::error::EngineError;
use crate::pipeline::dataset::{AttributeValue, FeatureTable};

pub use geojson_io::{read_geojson, write_geojson};
pub use gml_io::{read_gml, write_gml};
pub use gpkg_io::{read_gpkg, write_gpkg};
pub use gpx_io::{read_gpx, write_gpx};
pub use kml_io::{read_kml, write_kml};
pub use shapefile_io::{read_shapefile, write_shapefile};

const ENGINE_NAME: &str = "native";

const GEOJSON_DRIVER: &str = "GeoJSON";
const GPKG_DRIVER: &str = "GPKG";
const SHAPEFILE_DRIVER: &str = "ESRI Shapefile";
const KML_DRIVER: &str = "KML";
const GPX_DRIVER: &str = "GPX";
const GML_DRIVER: &str = "GML";

/// Input formats the native engine can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    GeoJson,
    GeoPackage,
    Shapefile,
    Kml,
    Gpx,
    Gml,
}

impl InputKind {
    /// Match a format name or file extension (case-insensitive)
    fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "geojson" | "json" => Some(InputKind::GeoJson),
            "gpkg" => Some(InputKind::GeoPackage),
            "shp" => Some(InputKind::Shapefile),
            "kml" | "kmz" => Some(InputKind::Kml),
            "gpx" => Some(InputKind::Gpx),
            "gml" => Some(InputKind::Gml),
            _ => None,
        }
    }
}

/// In-process engine with no system dependencies
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

impl VectorEngine for NativeEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn drivers(&self) -> BTreeSet<String> {
        [
            GEOJSON_DRIVER,
            GPKG_DRIVER,
            SHAPEFILE_DRIVER,
            KML_DRIVER,
            GPX_DRIVER,
            GML_DRIVER,
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn read(&self, path: &Path, source_format: &str) -> Result<FeatureTable, EngineError> {
        let kind = InputKind::from_name(source_format)
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .and_then(InputKind::from_name)
            })
            .ok_or_else(|| EngineError::UnsupportedInput {
                engine: ENGINE_NAME,
                path: path.to_path_buf(),
            })?;

        match kind {
            InputKind::GeoJson => read_geojson(path),
            InputKind::GeoPackage => read_gpkg(path),
            InputKind::Shapefile => read_shapefile(path),
            InputKind::Kml => read_kml(path),
            InputKind::Gpx => read_gpx(path),
            InputKind::Gml => read_gml(path),
        }
    }

    fn write(&self, table: &FeatureTable, path: &Path, driver: &str) -> Result<(), EngineError> {
        match driver {
            GEOJSON_DRIVER => write_geojson(table, path),
            GPKG_DRIVER => write_gpkg(table, path),
            SHAPEFILE_DRIVER => write_shapefile(table, path),
            KML_DRIVER => write_kml(table, path),
            GPX_DRIVER => write_gpx(table, path),
            GML_DRIVER => write_gml(table, path),
            other => Err(EngineError::UnsupportedDriver {
                engine: ENGINE_NAME,
                driver: other.to_string(),
            }),
        }
    }
}

/// Layer name derived from the file stem
fn layer_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Geometry type name used in error messages
fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Fold the parts of a multi-geometry element into the narrowest type:
/// a homogeneous set becomes the matching Multi* geometry, anything else a
/// GeometryCollection.
fn collect_parts(parts: Vec<Geometry<f64>>) -> Geometry<f64> {
    if !parts.is_empty() && parts.iter().all(|g| matches!(g, Geometry::Point(_))) {
        let points = parts
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Point(p) => Some(p),
                _ => None,
            })
            .collect();
        return Geometry::MultiPoint(MultiPoint(points));
    }
    if !parts.is_empty() && parts.iter().all(|g| matches!(g, Geometry::LineString(_))) {
        let lines: Vec<LineString<f64>> = parts
            .into_iter()
            .filter_map(|g| match g {
                Geometry::LineString(l) => Some(l),
                _ => None,
            })
            .collect();
        return Geometry::MultiLineString(MultiLineString(lines));
    }
    if !parts.is_empty() && parts.iter().all(|g| matches!(g, Geometry::Polygon(_))) {
        let polygons = parts
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Polygon(p) => Some(p),
                _ => None,
            })
            .collect();
        return Geometry::MultiPolygon(MultiPolygon(polygons));
    }
    Geometry::GeometryCollection(GeometryCollection(parts))
}

/// Type a text value the way a schemaless reader would: integer, then real,
/// then plain text.
fn infer_text_value(text: &str) -> AttributeValue {
    let trimmed = text.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return AttributeValue::Integer(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => AttributeValue::Real(v),
        _ => AttributeValue::Text(text.to_string()),
    }
}

/// Position of the first field whose name matches one of `names`
/// (case-insensitive)
fn field_position(table: &FeatureTable, names: &[&str]) -> Option<usize> {
    table
        .fields
        .iter()
        .position(|f| names.iter().any(|n| f.name.eq_ignore_ascii_case(n)))
}
