//! In-memory feature table exchanged between engines
//!
//! Every engine reads into a `FeatureTable` and writes from one, so a file read
//! by one engine can be written by another. Geometries use `geo_types`, the
//! common currency of the GeoRust crates.

use chrono::{DateTime, FixedOffset, NaiveDate};
use geo_types::Geometry;

/// Attribute column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    Boolean,
    Date,
    DateTime,
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
}

impl AttributeValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            AttributeValue::Integer(_) => FieldKind::Integer,
            AttributeValue::Real(_) => FieldKind::Real,
            AttributeValue::Text(_) => FieldKind::Text,
            AttributeValue::Boolean(_) => FieldKind::Boolean,
            AttributeValue::Date(_) => FieldKind::Date,
            AttributeValue::DateTime(_) => FieldKind::DateTime,
        }
    }

    /// Render the value as text, used when a column has mixed types
    pub fn to_text(&self) -> String {
        match self {
            AttributeValue::Integer(v) => v.to_string(),
            AttributeValue::Real(v) => v.to_string(),
            AttributeValue::Text(v) => v.clone(),
            AttributeValue::Boolean(v) => v.to_string(),
            AttributeValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            AttributeValue::DateTime(v) => v.to_rfc3339(),
        }
    }
}

/// Attribute column definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

/// One row: a geometry plus attribute values aligned with `FeatureTable::fields`
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub attributes: Vec<Option<AttributeValue>>,
}

/// A loaded vector layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub layer_name: String,
    pub fields: Vec<FieldDef>,
    pub features: Vec<Feature>,
    /// Coordinate reference system as WKT, when the source declares one
    pub crs_wkt: Option<String>,
}

/// A row as produced by a reader, before the schema is known
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    pub geometry: Option<Geometry<f64>>,
    pub properties: Vec<(String, Option<AttributeValue>)>,
}

impl FeatureTable {
    /// Build a table from schemaless records.
    ///
    /// Columns appear in first-seen order. A column's kind is the kind of its
    /// non-null values; Integer mixed with Real widens to Real, any other mix
    /// falls back to Text and the values are rendered as strings.
    pub fn from_records(layer_name: impl Into<String>, records: Vec<RawRecord>) -> Self {
        let mut fields: Vec<FieldDef> = Vec::new();
        let mut seen: Vec<Option<FieldKind>> = Vec::new();

        for record in &records {
            for (name, value) in &record.properties {
                let idx = match fields.iter().position(|f| &f.name == name) {
                    Some(idx) => idx,
                    None => {
                        fields.push(FieldDef {
                            name: name.clone(),
                            kind: FieldKind::Text,
                        });
                        seen.push(None);
                        fields.len() - 1
                    }
                };
                if let Some(value) = value {
                    seen[idx] = Some(merge_kinds(seen[idx], value.kind()));
                }
            }
        }

        for (field, kind) in fields.iter_mut().zip(&seen) {
            field.kind = kind.unwrap_or(FieldKind::Text);
        }

        let features = records
            .into_iter()
            .map(|record| {
                let mut attributes = vec![None; fields.len()];
                for (name, value) in record.properties {
                    if let Some(idx) = fields.iter().position(|f| f.name == name) {
                        attributes[idx] = value.map(|v| coerce(v, fields[idx].kind));
                    }
                }
                Feature {
                    geometry: record.geometry,
                    attributes,
                }
            })
            .collect();

        FeatureTable {
            layer_name: layer_name.into(),
            fields,
            features,
            crs_wkt: None,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of attribute columns (geometry excluded)
    pub fn attribute_count(&self) -> usize {
        self.fields.len()
    }
}

fn merge_kinds(current: Option<FieldKind>, next: FieldKind) -> FieldKind {
    match (current, next) {
        (None, next) => next,
        (Some(a), b) if a == b => a,
        (Some(FieldKind::Integer), FieldKind::Real) | (Some(FieldKind::Real), FieldKind::Integer) => {
            FieldKind::Real
        }
        _ => FieldKind::Text,
    }
}

fn coerce(value: AttributeValue, kind: FieldKind) -> AttributeValue {
    match (kind, value) {
        (FieldKind::Real, AttributeValue::Integer(v)) => AttributeValue::Real(v as f64),
        (FieldKind::Text, AttributeValue::Text(v)) => AttributeValue::Text(v),
        (FieldKind::Text, other) => AttributeValue::Text(other.to_text()),
        (_, other) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    fn record(props: Vec<(&str, Option<AttributeValue>)>) -> RawRecord {
        RawRecord {
            geometry: Some(Point::new(1.0, 2.0).into()),
            properties: props
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    #[test]
    fn test_columns_in_first_seen_order() {
        let table = FeatureTable::from_records(
            "layer",
            vec![
                record(vec![("b", Some(AttributeValue::Integer(1)))]),
                record(vec![
                    ("a", Some(AttributeValue::Text("x".into()))),
                    ("b", None),
                ]),
            ],
        );

        let names: Vec<&str> = table.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(table.features[0].attributes, vec![Some(AttributeValue::Integer(1)), None]);
        assert_eq!(
            table.features[1].attributes,
            vec![None, Some(AttributeValue::Text("x".into()))]
        );
    }

    #[test]
    fn test_integer_and_real_widen_to_real() {
        let table = FeatureTable::from_records(
            "layer",
            vec![
                record(vec![("v", Some(AttributeValue::Integer(2)))]),
                record(vec![("v", Some(AttributeValue::Real(2.5)))]),
            ],
        );

        assert_eq!(table.fields[0].kind, FieldKind::Real);
        assert_eq!(table.features[0].attributes[0], Some(AttributeValue::Real(2.0)));
    }

    #[test]
    fn test_mixed_kinds_fall_back_to_text() {
        let table = FeatureTable::from_records(
            "layer",
            vec![
                record(vec![("v", Some(AttributeValue::Boolean(true)))]),
                record(vec![("v", Some(AttributeValue::Integer(3)))]),
            ],
        );

        assert_eq!(table.fields[0].kind, FieldKind::Text);
        assert_eq!(
            table.features[0].attributes[0],
            Some(AttributeValue::Text("true".into()))
        );
        assert_eq!(
            table.features[1].attributes[0],
            Some(AttributeValue::Text("3".into()))
        );
    }

    #[test]
    fn test_all_null_column_is_text() {
        let table = FeatureTable::from_records("layer", vec![record(vec![("empty", None)])]);
        assert_eq!(table.fields[0].kind, FieldKind::Text);
        assert_eq!(table.attribute_count(), 1);
        assert_eq!(table.len(), 1);
    }
}
