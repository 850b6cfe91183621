//! GeoJSON codec

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use geo_types::Geometry;
use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};
use log::debug;

use super::layer_name;
use crate::error::EngineError;
use crate::pipeline::dataset::{AttributeValue, FeatureTable, RawRecord};

/// Read a GeoJSON FeatureCollection, single Feature, or bare Geometry
pub fn read_geojson(path: &Path) -> Result<FeatureTable, EngineError> {
    let reader = BufReader::new(File::open(path)?);
    let geojson = GeoJson::from_reader(reader)?;

    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![geojson::Feature {
            geometry: Some(geometry),
            ..Default::default()
        }],
    };

    let mut records = Vec::with_capacity(features.len());
    for (index, feature) in features.into_iter().enumerate() {
        let geometry = feature
            .geometry
            .map(Geometry::<f64>::try_from)
            .transpose()
            .map_err(|e| EngineError::Geometry {
                index,
                message: e.to_string(),
            })?;
        let properties = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, attribute_from_json(value)))
            .collect();
        records.push(RawRecord {
            geometry,
            properties,
        });
    }

    debug!("Read {} GeoJSON features from {}", records.len(), path.display());
    Ok(FeatureTable::from_records(layer_name(path), records))
}

fn attribute_from_json(value: JsonValue) -> Option<AttributeValue> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(AttributeValue::Boolean(b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Some(AttributeValue::Integer(i)),
            None => n.as_f64().map(AttributeValue::Real),
        },
        JsonValue::String(s) => Some(AttributeValue::Text(s)),
        other => Some(AttributeValue::Text(other.to_string())),
    }
}

fn attribute_to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Integer(v) => JsonValue::from(*v),
        AttributeValue::Real(v) => JsonValue::from(*v),
        AttributeValue::Text(v) => JsonValue::from(v.as_str()),
        AttributeValue::Boolean(v) => JsonValue::from(*v),
        AttributeValue::Date(_) | AttributeValue::DateTime(_) => JsonValue::from(value.to_text()),
    }
}

/// Write `table` as a GeoJSON FeatureCollection. Null attributes are kept as
/// JSON `null`, null geometries as `"geometry": null`.
pub fn write_geojson(table: &FeatureTable, path: &Path) -> Result<(), EngineError> {
    let features = table
        .features
        .iter()
        .map(|feature| {
            let properties: JsonObject = table
                .fields
                .iter()
                .zip(&feature.attributes)
                .map(|(field, value)| {
                    let json = value.as_ref().map(attribute_to_json).unwrap_or(JsonValue::Null);
                    (field.name.clone(), json)
                })
                .collect();
            geojson::Feature {
                geometry: feature
                    .geometry
                    .as_ref()
                    .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                properties: Some(properties),
                ..Default::default()
            }
        })
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &collection)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
