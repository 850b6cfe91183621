//! ESRI Shapefile codec (`.shp` + `.shx` + `.dbf`, optional `.prj`)

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geo_types::{Geometry, LineString, MultiPoint};
use log::{debug, warn};
use shapefile::dbase::{self, FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::record::EsriShape;
use shapefile::Shape;

use super::{geometry_name, layer_name};
use crate::error::EngineError;
use crate::pipeline::dataset::{AttributeValue, FeatureTable, FieldKind, RawRecord};

const FORMAT: &str = "Shapefile";
/// dBase field names are limited to 10 bytes
const MAX_FIELD_NAME: usize = 10;
const MAX_CHARACTER_WIDTH: usize = 254;
/// Internal column some dBase readers expose for the record deletion marker
const DELETION_FLAG: &str = "DeletionFlag";

/// Geometry family a shapefile layer is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeClass {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

impl ShapeClass {
    fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) => Some(ShapeClass::Point),
            Geometry::MultiPoint(_) => Some(ShapeClass::Multipoint),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Some(ShapeClass::Polyline)
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Some(ShapeClass::Polygon),
            Geometry::GeometryCollection(_) => None,
        }
    }

    /// Combine two classes; points and multipoints share a multipoint layer
    fn merge(self, other: Self) -> Option<Self> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (ShapeClass::Point, ShapeClass::Multipoint) | (ShapeClass::Multipoint, ShapeClass::Point) => {
                Some(ShapeClass::Multipoint)
            }
            _ => None,
        }
    }
}

/// Single geometry class of the layer, `None` when every geometry is null
fn layer_class(table: &FeatureTable) -> Result<Option<ShapeClass>, EngineError> {
    let mut class: Option<ShapeClass> = None;
    for (index, feature) in table.features.iter().enumerate() {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let next = ShapeClass::of(geometry).ok_or_else(|| EngineError::Geometry {
            index,
            message: "shapefiles cannot hold a GeometryCollection".to_string(),
        })?;
        class = match class {
            None => Some(next),
            Some(current) => Some(current.merge(next).ok_or_else(|| EngineError::Geometry {
                index,
                message: format!(
                    "shapefile layers hold a single geometry type, found {} in a {:?} layer",
                    geometry_name(geometry),
                    current
                ),
            })?),
        };
    }
    Ok(class)
}

/// Sidecar path next to `shp`, accepting an upper-case extension
fn sidecar(shp: &Path, ext: &str) -> PathBuf {
    let lower = shp.with_extension(ext);
    if lower.exists() {
        return lower;
    }
    let upper = shp.with_extension(ext.to_uppercase());
    if upper.exists() {
        upper
    } else {
        lower
    }
}

/// Read shapes and their dBase records. Columns keep the `.dbf` order and the
/// `.prj` text, when present, becomes the layer CRS.
pub fn read_shapefile(path: &Path) -> Result<FeatureTable, EngineError> {
    let field_names: Vec<String> = dbase::Reader::from_path(sidecar(path, "dbf"))?
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .filter(|name| name != DELETION_FLAG)
        .collect();

    let mut reader = shapefile::Reader::from_path(path)?;
    let mut records = Vec::new();
    for (index, item) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = item?;
        let geometry = match shape {
            Shape::NullShape => None,
            shape => Some(
                Geometry::<f64>::try_from(shape).map_err(|e| EngineError::Geometry {
                    index,
                    message: e.to_string(),
                })?,
            ),
        };
        let properties = field_names
            .iter()
            .map(|name| (name.clone(), record.get(name).and_then(attribute_from_dbase)))
            .collect();
        records.push(RawRecord {
            geometry,
            properties,
        });
    }

    let mut table = FeatureTable::from_records(layer_name(path), records);
    let prj = sidecar(path, "prj");
    if prj.exists() {
        let wkt = std::fs::read_to_string(&prj)?;
        table.crs_wkt = Some(wkt.trim().to_string()).filter(|w| !w.is_empty());
    }

    debug!("Read {} shapes from {}", table.len(), path.display());
    Ok(table)
}

fn attribute_from_dbase(value: &FieldValue) -> Option<AttributeValue> {
    match value {
        FieldValue::Character(v) => v
            .as_ref()
            .map(|s| s.trim_end())
            .filter(|s| !s.is_empty())
            .map(|s| AttributeValue::Text(s.to_string())),
        FieldValue::Numeric(v) => v.map(number_value),
        FieldValue::Float(v) => v.map(|f| number_value(f as f64)),
        FieldValue::Integer(v) => Some(AttributeValue::Integer(*v as i64)),
        FieldValue::Double(v) | FieldValue::Currency(v) => Some(AttributeValue::Real(*v)),
        FieldValue::Logical(v) => v.map(AttributeValue::Boolean),
        FieldValue::Date(v) => v
            .as_ref()
            .and_then(|d| NaiveDate::from_ymd_opt(d.year() as i32, d.month(), d.day()))
            .map(AttributeValue::Date),
        FieldValue::Memo(s) => Some(AttributeValue::Text(s.clone())),
        _ => None,
    }
}

/// Whole numbers come back as integers, the rest as reals
fn number_value(v: f64) -> AttributeValue {
    if v.fract() == 0.0 && v.abs() < 9.0e15 {
        AttributeValue::Integer(v as i64)
    } else {
        AttributeValue::Real(v)
    }
}

/// dBase-safe column names: ASCII, at most 10 bytes, unique
fn dbf_names(table: &FeatureTable) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(table.fields.len());
    for field in &table.fields {
        let base: String = field
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .take(MAX_FIELD_NAME)
            .collect();
        let base = if base.is_empty() { "field".to_string() } else { base };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while names.iter().any(|n| n.eq_ignore_ascii_case(&candidate)) {
            let tail = suffix.to_string();
            let keep = MAX_FIELD_NAME.saturating_sub(tail.len()).min(base.len());
            candidate = format!("{}{}", &base[..keep], tail);
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}

fn character_width(table: &FeatureTable, column: usize) -> u8 {
    let widest = table
        .features
        .iter()
        .filter_map(|f| f.attributes.get(column).cloned().flatten())
        .map(|v| v.to_text().len())
        .max()
        .unwrap_or(1);
    widest.clamp(1, MAX_CHARACTER_WIDTH) as u8
}

fn truncate_text(mut text: String) -> String {
    if text.len() > MAX_CHARACTER_WIDTH {
        let mut cut = MAX_CHARACTER_WIDTH;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

fn table_builder(table: &FeatureTable, names: &[String]) -> Result<TableWriterBuilder, EngineError> {
    let mut builder = TableWriterBuilder::new();
    for (column, (field, name)) in table.fields.iter().zip(names).enumerate() {
        let field_name = FieldName::try_from(name.as_str()).map_err(|e| EngineError::Malformed {
            format: FORMAT,
            message: format!("invalid field name {}: {:?}", name, e),
        })?;
        builder = match field.kind {
            FieldKind::Integer => builder.add_numeric_field(field_name, 18, 0),
            FieldKind::Real => builder.add_numeric_field(field_name, 24, 15),
            FieldKind::Boolean => builder.add_logical_field(field_name),
            FieldKind::Text | FieldKind::Date | FieldKind::DateTime => {
                builder.add_character_field(field_name, character_width(table, column))
            }
        };
    }
    Ok(builder)
}

fn dbase_value(kind: FieldKind, value: Option<&AttributeValue>) -> FieldValue {
    match (kind, value) {
        (FieldKind::Integer | FieldKind::Real, Some(AttributeValue::Integer(v))) => {
            FieldValue::Numeric(Some(*v as f64))
        }
        (FieldKind::Integer | FieldKind::Real, Some(AttributeValue::Real(v))) => {
            FieldValue::Numeric(Some(*v))
        }
        (FieldKind::Integer | FieldKind::Real, _) => FieldValue::Numeric(None),
        (FieldKind::Boolean, Some(AttributeValue::Boolean(v))) => FieldValue::Logical(Some(*v)),
        (FieldKind::Boolean, _) => FieldValue::Logical(None),
        (_, Some(v)) => FieldValue::Character(Some(truncate_text(v.to_text()))),
        (_, None) => FieldValue::Character(None),
    }
}

/// Write `table` as a shapefile set next to `path`.
///
/// Every geometry must belong to one shape class (points may mix with
/// multipoints); anything else fails before a file is created. Features
/// without geometry are dropped with a warning.
pub fn write_shapefile(table: &FeatureTable, path: &Path) -> Result<(), EngineError> {
    let class = layer_class(table)?.unwrap_or(ShapeClass::Point);
    let names = dbf_names(table);
    let builder = table_builder(table, &names)?;

    let records: Vec<Record> = table
        .features
        .iter()
        .map(|feature| {
            let mut record = Record::default();
            for ((field, name), value) in table.fields.iter().zip(&names).zip(&feature.attributes) {
                record.insert(name.clone(), dbase_value(field.kind, value.as_ref()));
            }
            record
        })
        .collect();

    let skipped = table.features.iter().filter(|f| f.geometry.is_none()).count();
    if skipped > 0 {
        warn!("Dropped {} features without geometry from shapefile output", skipped);
    }

    match class {
        ShapeClass::Point => write_layer(path, builder, table, &records, |g| match g {
            Geometry::Point(p) => Some(shapefile::Point::from(*p)),
            _ => None,
        })?,
        ShapeClass::Multipoint => write_layer(path, builder, table, &records, |g| match g {
            Geometry::Point(p) => Some(shapefile::Multipoint::from(MultiPoint(vec![*p]))),
            Geometry::MultiPoint(mp) => Some(shapefile::Multipoint::from(mp.clone())),
            _ => None,
        })?,
        ShapeClass::Polyline => write_layer(path, builder, table, &records, |g| match g {
            Geometry::Line(l) => Some(shapefile::Polyline::from(LineString::from(*l))),
            Geometry::LineString(l) => Some(shapefile::Polyline::from(l.clone())),
            Geometry::MultiLineString(ml) => Some(shapefile::Polyline::from(ml.clone())),
            _ => None,
        })?,
        ShapeClass::Polygon => write_layer(path, builder, table, &records, |g| match g {
            Geometry::Polygon(p) => Some(shapefile::Polygon::from(p.clone())),
            Geometry::MultiPolygon(mp) => Some(shapefile::Polygon::from(mp.clone())),
            Geometry::Rect(r) => Some(shapefile::Polygon::from(r.to_polygon())),
            Geometry::Triangle(t) => Some(shapefile::Polygon::from(t.to_polygon())),
            _ => None,
        })?,
    }

    if let Some(wkt) = &table.crs_wkt {
        std::fs::write(path.with_extension("prj"), wkt)?;
    }
    Ok(())
}

fn write_layer<S: EsriShape>(
    path: &Path,
    builder: TableWriterBuilder,
    table: &FeatureTable,
    records: &[Record],
    convert: impl Fn(&Geometry<f64>) -> Option<S>,
) -> Result<(), EngineError> {
    let mut writer = shapefile::Writer::from_path(path, builder)?;
    for (feature, record) in table.features.iter().zip(records) {
        if let Some(shape) = feature.geometry.as_ref().and_then(&convert) {
            writer.write_shape_and_record(&shape, record)?;
        }
    }
    Ok(())
}
