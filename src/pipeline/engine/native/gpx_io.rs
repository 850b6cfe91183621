//! GPX codec: waypoints, routes and tracks

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use geo_types::{Geometry, LineString, Point};
use gpx::{Gpx, GpxVersion, Route, Track, TrackSegment, Waypoint};
use log::{debug, warn};

use super::{field_position, geometry_name, layer_name};
use crate::error::EngineError;
use crate::pipeline::dataset::{AttributeValue, FeatureTable, RawRecord};

const CREATOR: &str = "geoconvert";

/// Read waypoints, routes and tracks from a GPX file, one feature each
pub fn read_gpx(path: &Path) -> Result<FeatureTable, EngineError> {
    let reader = BufReader::new(File::open(path)?);
    let gpx = gpx::read(reader)?;

    let mut records = Vec::new();
    for waypoint in &gpx.waypoints {
        records.push(RawRecord {
            geometry: Some(Geometry::Point(waypoint.point())),
            properties: vec![
                ("name".to_string(), waypoint.name.clone().map(AttributeValue::Text)),
                ("kind".to_string(), Some(AttributeValue::Text("waypoint".into()))),
                ("elevation".to_string(), waypoint.elevation.map(AttributeValue::Real)),
                (
                    "description".to_string(),
                    waypoint.description.clone().map(AttributeValue::Text),
                ),
            ],
        });
    }
    for route in &gpx.routes {
        records.push(RawRecord {
            geometry: Some(Geometry::LineString(route.linestring())),
            properties: vec![
                ("name".to_string(), route.name.clone().map(AttributeValue::Text)),
                ("kind".to_string(), Some(AttributeValue::Text("route".into()))),
                ("elevation".to_string(), None),
                (
                    "description".to_string(),
                    route.description.clone().map(AttributeValue::Text),
                ),
            ],
        });
    }
    for track in &gpx.tracks {
        records.push(RawRecord {
            geometry: Some(Geometry::MultiLineString(track.multilinestring())),
            properties: vec![
                ("name".to_string(), track.name.clone().map(AttributeValue::Text)),
                ("kind".to_string(), Some(AttributeValue::Text("track".into()))),
                ("elevation".to_string(), None),
                (
                    "description".to_string(),
                    track.description.clone().map(AttributeValue::Text),
                ),
            ],
        });
    }

    debug!("Read {} GPX features from {}", records.len(), path.display());
    Ok(FeatureTable::from_records(layer_name(path), records))
}

/// Per-feature GPX metadata pulled from the attribute columns
struct Labels {
    name: Option<String>,
    description: Option<String>,
    elevation: Option<f64>,
}

/// Write `table` as GPX 1.1.
///
/// Points become waypoints, lines become routes and multi-lines become
/// tracks with one segment per part. Polygons have no GPX form and fail the
/// write before the file is created.
pub fn write_gpx(table: &FeatureTable, path: &Path) -> Result<(), EngineError> {
    for (index, feature) in table.features.iter().enumerate() {
        match &feature.geometry {
            None
            | Some(Geometry::Point(_))
            | Some(Geometry::MultiPoint(_))
            | Some(Geometry::Line(_))
            | Some(Geometry::LineString(_))
            | Some(Geometry::MultiLineString(_)) => {}
            Some(other) => {
                return Err(EngineError::Geometry {
                    index,
                    message: format!("GPX holds points and lines only, got {}", geometry_name(other)),
                })
            }
        }
    }

    let name_idx = field_position(table, &["name"]);
    let desc_idx = field_position(table, &["desc", "description"]);
    let ele_idx = field_position(table, &["ele", "elevation"]);

    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some(CREATOR.to_string());

    let mut skipped = 0;
    for feature in &table.features {
        let text_at = |idx: Option<usize>| {
            idx.and_then(|i| feature.attributes.get(i).cloned().flatten())
                .map(|v| v.to_text())
        };
        let labels = Labels {
            name: text_at(name_idx),
            description: text_at(desc_idx),
            elevation: ele_idx
                .and_then(|i| feature.attributes.get(i).cloned().flatten())
                .and_then(|v| match v {
                    AttributeValue::Integer(v) => Some(v as f64),
                    AttributeValue::Real(v) => Some(v),
                    _ => None,
                }),
        };

        match &feature.geometry {
            Some(Geometry::Point(point)) => gpx.waypoints.push(waypoint(*point, &labels)),
            Some(Geometry::MultiPoint(points)) => {
                for point in points {
                    gpx.waypoints.push(waypoint(*point, &labels));
                }
            }
            Some(Geometry::Line(line)) => gpx.routes.push(route(&LineString::from(*line), labels)),
            Some(Geometry::LineString(line)) => gpx.routes.push(route(line, labels)),
            Some(Geometry::MultiLineString(lines)) => {
                let mut track = Track::new();
                track.name = labels.name;
                track.description = labels.description;
                for line in lines {
                    let mut segment = TrackSegment::new();
                    segment.points = line.points().map(Waypoint::new).collect();
                    track.segments.push(segment);
                }
                gpx.tracks.push(track);
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} features without geometry in GPX output", skipped);
    }

    let mut writer = BufWriter::new(File::create(path)?);
    gpx::write(&gpx, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn waypoint(point: Point<f64>, labels: &Labels) -> Waypoint {
    let mut waypoint = Waypoint::new(point);
    waypoint.name = labels.name.clone();
    waypoint.description = labels.description.clone();
    waypoint.elevation = labels.elevation;
    waypoint
}

fn route(line: &LineString<f64>, labels: Labels) -> Route {
    let mut route = Route::new();
    route.name = labels.name;
    route.description = labels.description;
    route.points = line.points().map(Waypoint::new).collect();
    route
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dataset::{Feature, FieldDef, FieldKind};
    use geo_types::{line_string, polygon};
    use tempfile::TempDir;

    fn table(geometries: Vec<Option<Geometry<f64>>>) -> FeatureTable {
        FeatureTable {
            layer_name: "trip".to_string(),
            fields: vec![
                FieldDef {
                    name: "name".to_string(),
                    kind: FieldKind::Text,
                },
                FieldDef {
                    name: "ele".to_string(),
                    kind: FieldKind::Real,
                },
            ],
            features: geometries
                .into_iter()
                .enumerate()
                .map(|(i, geometry)| Feature {
                    geometry,
                    attributes: vec![
                        Some(AttributeValue::Text(format!("f{}", i))),
                        Some(AttributeValue::Real(12.5)),
                    ],
                })
                .collect(),
            crs_wkt: None,
        }
    }

    #[test]
    fn test_read_gpx() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trip.gpx");
        std::fs::write(
            &path,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="52.0" lon="4.0"><ele>3.5</ele><name>Start</name></wpt>
  <trk><name>Morning</name><trkseg>
    <trkpt lat="52.0" lon="4.0"></trkpt>
    <trkpt lat="52.1" lon="4.1"></trkpt>
  </trkseg></trk>
</gpx>"#,
        )
        .unwrap();

        let table = read_gpx(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.features[0].geometry,
            Some(Geometry::Point(Point::new(4.0, 52.0)))
        );
        assert_eq!(
            table.features[0].attributes[0],
            Some(AttributeValue::Text("Start".into()))
        );
        assert_eq!(
            table.features[1].attributes[1],
            Some(AttributeValue::Text("track".into()))
        );
    }

    #[test]
    fn test_write_points_and_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.gpx");
        let source = table(vec![
            Some(Point::new(4.9, 52.37).into()),
            Some(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into()),
            None,
        ]);

        write_gpx(&source, &path).unwrap();

        let reread = read_gpx(&path).unwrap();
        assert_eq!(reread.len(), 2);
        assert_eq!(
            reread.features[0].geometry,
            Some(Geometry::Point(Point::new(4.9, 52.37)))
        );
        assert_eq!(
            reread.features[0].attributes[0],
            Some(AttributeValue::Text("f0".into()))
        );
        assert_eq!(reread.features[0].attributes[2], Some(AttributeValue::Real(12.5)));
        assert_eq!(
            reread.features[1].attributes[1],
            Some(AttributeValue::Text("route".into()))
        );
    }

    #[test]
    fn test_polygon_rejected_before_file_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.gpx");
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)];
        let source = table(vec![Some(Point::new(0.0, 0.0).into()), Some(square.into())]);

        let err = write_gpx(&source, &path).unwrap_err();
        assert!(matches!(err, EngineError::Geometry { index: 1, .. }));
        assert!(!path.exists());
    }
}
