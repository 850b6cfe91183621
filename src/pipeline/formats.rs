//! Target format → output driver resolution

use std::collections::BTreeSet;

/// Driver used when the target format is not in the table
pub const DEFAULT_DRIVER: &str = "GeoJSON";

/// Pseudo-driver for the plain-text geometry dump
pub const WKT_DRIVER: &str = "WKT";

/// Static table of driver candidates, in preference order, per target format
const DRIVER_TABLE: &[(&str, &[&str])] = &[
    ("geojson", &["GeoJSON"]),
    ("gpkg", &["GPKG"]),
    ("shp", &["ESRI Shapefile"]),
    ("kml", &["KML"]),
    ("kmz", &["KML"]),
    ("gpx", &["GPX"]),
    ("gml", &["GML"]),
    ("wkt", &[WKT_DRIVER]),
];

/// Driver candidates for a target format (case-insensitive).
/// Unknown formats map to `[DEFAULT_DRIVER]`.
pub fn driver_candidates(target_format: &str) -> &'static [&'static str] {
    let key = target_format.to_lowercase();
    DRIVER_TABLE
        .iter()
        .find(|(format, _)| *format == key)
        .map(|(_, drivers)| *drivers)
        .unwrap_or(&[DEFAULT_DRIVER])
}

/// Pick the first candidate the runtime actually provides, or the first
/// candidate when none of them is available.
pub fn resolve_driver(target_format: &str, available: &BTreeSet<String>) -> &'static str {
    let candidates = driver_candidates(target_format);
    candidates
        .iter()
        .copied()
        .find(|driver| available.contains(*driver))
        .unwrap_or(candidates[0])
}

/// Target formats written as a directory bundle rather than a single file
pub fn is_bundled_format(target_format: &str) -> bool {
    target_format.eq_ignore_ascii_case("shp")
}

/// Target formats that bypass the generic writer
pub fn is_wkt_format(target_format: &str) -> bool {
    target_format.eq_ignore_ascii_case("wkt")
}

/// Source formats wrapped in a zip container
pub fn is_zipped_format(source_format: &str) -> bool {
    source_format.eq_ignore_ascii_case("kmz")
}

/// Source formats that need sidecar files next to the main file
pub fn is_shapefile_format(source_format: &str) -> bool {
    source_format.eq_ignore_ascii_case("shp")
}
