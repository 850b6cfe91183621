//! Shared test utilities and fixture generators

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Three features in a known order: a point, a null geometry, a line
pub const SAMPLE_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [4.9, 52.4]},
     "properties": {"name": "Amsterdam", "population": 921402}},
    {"type": "Feature", "geometry": null,
     "properties": {"name": "Nowhere", "population": null}},
    {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[4.9, 52.4], [4.3, 52.1]]},
     "properties": {"name": "A4", "population": null}}
  ]
}"#;

/// Three point features, a single geometry type every format can hold
pub const SAMPLE_POINTS_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [4.9, 52.37]},
     "properties": {"name": "Amsterdam", "population": 921402}},
    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [4.48, 51.92]},
     "properties": {"name": "Rotterdam", "population": 655468}},
    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [5.12, 52.09]},
     "properties": {"name": "Utrecht", "population": 361924}}
  ]
}"#;

/// Minimal KML document with one placemark
pub const SAMPLE_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark>
      <name>Dam Square</name>
      <Point><coordinates>4.8932,52.3731,0</coordinates></Point>
    </Placemark>
  </Document>
</kml>"#;

/// Write the sample GeoJSON into `dir`
pub fn create_sample_geojson(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("cities.geojson");
    std::fs::write(&path, SAMPLE_GEOJSON).unwrap();
    path
}

/// Write the single-type point sample into `dir`
pub fn create_sample_points(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("towns.geojson");
    std::fs::write(&path, SAMPLE_POINTS_GEOJSON).unwrap();
    path
}

/// Write a zip archive with the given members
pub fn create_zip(path: &Path, members: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in members {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Parse newline-delimited JSON events
pub fn parse_events(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("bad event line {:?}: {}", l, e)))
        .collect()
}

/// The single result event, asserting there is exactly one
pub fn single_result(events: &[Value]) -> &Value {
    let results: Vec<&Value> = events.iter().filter(|e| e["type"] == "result").collect();
    assert_eq!(results.len(), 1, "Expected exactly one result event, got {:?}", events);
    results[0]
}

/// Assert that progress values never decrease
pub fn assert_monotonic_progress(events: &[Value]) {
    let values: Vec<u64> = events
        .iter()
        .filter(|e| e["type"] == "progress")
        .map(|e| e["progress"].as_u64().unwrap())
        .collect();
    assert!(
        values.windows(2).all(|w| w[0] <= w[1]),
        "Progress went backwards: {:?}",
        values
    );
}

/// Number of entries directly inside `dir`
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
