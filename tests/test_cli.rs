//! End-to-end tests driving the geoconvert binary

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use common::*;

fn geoconvert() -> Command {
    let mut cmd = Command::cargo_bin("geoconvert").unwrap();
    cmd.env_remove("GEOCONVERT_TMPDIR");
    cmd
}

#[test]
fn test_wrong_argument_count_fails_before_conversion() {
    let output = geoconvert()
        .args(["in.geojson", "out.gpkg", "geojson"])
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let events = parse_events(&output);
    assert_eq!(events.len(), 1, "Only the result event is expected");
    let result = single_result(&events);
    assert_eq!(result["success"], false);
    assert!(result["error"].as_str().unwrap().starts_with("Invalid arguments"));
}

#[test]
fn test_too_many_arguments_fail() {
    geoconvert()
        .args(["a", "b", "c", "d", "e"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""success":false"#));
}

#[test]
fn test_missing_input_reports_path() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("ghost.geojson");
    let out = dir.path().join("out.geojson");

    let output = geoconvert()
        .arg(&missing)
        .arg(&out)
        .args(["geojson", "geojson"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let events = parse_events(&output);
    let result = single_result(&events);
    assert_eq!(result["success"], false);
    assert!(result["error"].as_str().unwrap().contains("ghost.geojson"));
    assert!(result["traceback"].is_string());
    assert_eq!(
        events.iter().filter(|e| e["status"] == "failed").count(),
        1
    );
    assert_monotonic_progress(&events);
}

#[test]
fn test_geojson_to_geojson_succeeds() {
    let dir = TempDir::new().unwrap();
    let input = create_sample_geojson(&dir);
    let out = dir.path().join("copy.geojson");

    let output = geoconvert()
        .arg(&input)
        .arg(&out)
        .args(["geojson", "GEOJSON"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events = parse_events(&output);
    assert_monotonic_progress(&events);
    let result = single_result(&events);
    assert_eq!(result["success"], true);
    assert_eq!(result["features_count"], 3);
    assert_eq!(result["output_path"], out.display().to_string());
    assert!(out.exists());

    let last_progress = events.iter().rev().find(|e| e["type"] == "progress").unwrap();
    assert_eq!(last_progress["status"], "completed");
    assert_eq!(last_progress["progress"], 100);
}

#[test]
fn test_unknown_target_defaults_to_geojson() {
    let dir = TempDir::new().unwrap();
    let input = create_sample_geojson(&dir);
    let out = dir.path().join("cities.out");

    geoconvert()
        .arg(&input)
        .arg(&out)
        .args(["geojson", "mystery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Preparing output format: GeoJSON"));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["type"], "FeatureCollection");
    assert_eq!(written["features"].as_array().unwrap().len(), 3);
}

#[test]
fn test_wkt_output_one_line_per_feature() {
    let dir = TempDir::new().unwrap();
    let input = create_sample_geojson(&dir);
    let out = dir.path().join("cities.wkt");

    geoconvert()
        .arg(&input)
        .arg(&out)
        .args(["geojson", "wkt"])
        .assert()
        .success();

    let text = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("POINT"));
    assert_eq!(lines[1], "");
    assert!(lines[2].starts_with("LINESTRING"));
}

#[test]
fn test_stdout_is_only_json_lines() {
    let dir = TempDir::new().unwrap();
    let input = create_sample_geojson(&dir);
    let out = dir.path().join("cities.wkt");

    let output = geoconvert()
        .env("GEOCONVERT_LOG", "debug")
        .arg(&input)
        .arg(&out)
        .args(["geojson", "wkt"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    for line in String::from_utf8(output).unwrap().lines() {
        assert!(serde_json::from_str::<serde_json::Value>(line).is_ok(), "not JSON: {}", line);
    }
}

#[test]
fn test_kmz_without_kml_fails_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let kmz = dir.path().join("empty.kmz");
    create_zip(&kmz, &[("readme.txt", "no placemarks here")]);

    let output = geoconvert()
        .env("GEOCONVERT_TMPDIR", scratch.path())
        .arg(&kmz)
        .arg(dir.path().join("out.geojson"))
        .args(["kmz", "geojson"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let events = parse_events(&output);
    let result = single_result(&events);
    assert!(result["error"]
        .as_str()
        .unwrap()
        .contains("does not contain a .kml document"));
    assert_eq!(entry_count(scratch.path()), 0);
}

#[test]
fn test_kmz_to_geojson_succeeds_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let kmz = dir.path().join("places.kmz");
    let out = dir.path().join("places.geojson");
    create_zip(&kmz, &[("doc.kml", SAMPLE_KML)]);

    let output = geoconvert()
        .env("GEOCONVERT_TMPDIR", scratch.path())
        .arg(&kmz)
        .arg(&out)
        .args(["kmz", "geojson"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events = parse_events(&output);
    assert_monotonic_progress(&events);
    let result = single_result(&events);
    assert_eq!(result["success"], true);
    assert_eq!(result["features_count"], 1);
    assert_eq!(entry_count(scratch.path()), 0);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["features"][0]["properties"]["name"], "Dam Square");
    assert_eq!(written["features"][0]["geometry"]["type"], "Point");
}

#[test]
fn test_kmz_payload_released_when_read_fails() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let kmz = dir.path().join("broken.kmz");
    create_zip(&kmz, &[("doc.kml", "<kml><Document><Placemark>")]);

    let output = geoconvert()
        .env("GEOCONVERT_TMPDIR", scratch.path())
        .arg(&kmz)
        .arg(dir.path().join("out.geojson"))
        .args(["kmz", "geojson"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let events = parse_events(&output);
    let result = single_result(&events);
    assert!(result["error"].as_str().unwrap().contains("doc.kml"));
    assert_eq!(entry_count(scratch.path()), 0);
    assert!(!dir.path().join("out.geojson").exists());
}

#[test]
fn test_geojson_to_shapefile_writes_folder() {
    let dir = TempDir::new().unwrap();
    let input = create_sample_points(&dir);
    let out = dir.path().join("towns.shp");

    let output = geoconvert()
        .arg(&input)
        .arg(&out)
        .args(["geojson", "shp"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let folder = dir.path().join("towns");
    let events = parse_events(&output);
    let result = single_result(&events);
    assert_eq!(result["features_count"], 3);
    assert_eq!(result["output_path"], folder.display().to_string());
    for ext in ["shp", "shx", "dbf"] {
        assert!(folder.join(format!("towns.{}", ext)).is_file(), "missing .{}", ext);
    }
    assert!(events
        .iter()
        .any(|e| e["message"].as_str().is_some_and(|m| m.starts_with("Output bundle:"))));
}

#[test]
fn test_gpkg_round_trip_through_cli() {
    let dir = TempDir::new().unwrap();
    let input = create_sample_points(&dir);
    let gpkg = dir.path().join("towns.gpkg");
    let back = dir.path().join("towns.json");

    geoconvert()
        .arg(&input)
        .arg(&gpkg)
        .args(["geojson", "gpkg"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Preparing output format: GPKG"));

    geoconvert()
        .arg(&gpkg)
        .arg(&back)
        .args(["gpkg", "geojson"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""features_count":3"#));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&back).unwrap()).unwrap();
    assert_eq!(written["features"][1]["properties"]["name"], "Rotterdam");
    assert_eq!(written["features"][1]["properties"]["population"], 655468);
}

#[test]
fn test_temp_dir_flag_is_not_accepted() {
    let dir = TempDir::new().unwrap();
    let input = create_sample_geojson(&dir);

    let output = geoconvert()
        .arg(&input)
        .arg(dir.path().join("out.geojson"))
        .args(["geojson", "geojson", "--temp-dir"])
        .arg(dir.path())
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let events = parse_events(&output);
    assert_eq!(events.len(), 1, "Only the result event is expected");
    assert!(single_result(&events)["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid arguments"));
    assert!(!dir.path().join("out.geojson").exists());
}

#[test]
fn test_shapefile_without_sidecars_fails() {
    let dir = TempDir::new().unwrap();
    let shp = dir.path().join("roads.shp");
    std::fs::write(&shp, b"").unwrap();

    geoconvert()
        .arg(&shp)
        .arg(dir.path().join("roads.geojson"))
        .args(["shp", "geojson"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Missing required files: .shx, .dbf"));
}
