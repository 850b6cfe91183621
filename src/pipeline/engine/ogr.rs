//! GDAL/OGR engine
//!
//! Covers every driver the linked libgdal was built with. Used as the
//! fallback engine, so it only runs when the native engine gives up.

use std::collections::BTreeSet;
use std::path::Path;

use gdal::spatial_ref::SpatialRef;
use gdal::vector::{
    Feature, FieldValue, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType, ToGdal,
};
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use geo_types::Geometry;
use log::debug;

use super::VectorEngine;
use crate::error::EngineError;
use crate::pipeline::dataset::{AttributeValue, FieldKind, FeatureTable, RawRecord};

const ENGINE_NAME: &str = "gdal";

#[derive(Debug, Default)]
pub struct GdalEngine;

impl GdalEngine {
    pub fn new() -> Self {
        Self
    }
}

impl VectorEngine for GdalEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn drivers(&self) -> BTreeSet<String> {
        (0..DriverManager::count())
            .filter_map(|idx| DriverManager::get_driver(idx).ok())
            .map(|driver| driver.short_name())
            .collect()
    }

    /// GDAL sniffs the driver from the file contents, so the declared format
    /// is not needed here.
    fn read(&self, path: &Path, _source_format: &str) -> Result<FeatureTable, EngineError> {
        let dataset = Dataset::open_ex(
            path,
            DatasetOptions {
                open_flags: GdalOpenFlags::GDAL_OF_VECTOR,
                ..Default::default()
            },
        )?;
        let mut layer = dataset.layer(0)?;
        let layer_name = layer.name();
        let crs_wkt = layer.spatial_ref().and_then(|srs| srs.to_wkt().ok());

        let mut records = Vec::new();
        for (index, feature) in layer.features().enumerate() {
            let geometry = feature
                .geometry()
                .map(|g| g.to_geo())
                .transpose()
                .map_err(|e| EngineError::Geometry {
                    index,
                    message: e.to_string(),
                })?;
            let properties = feature
                .fields()
                .map(|(name, value)| (name, value.and_then(attribute_from_gdal)))
                .collect();
            records.push(RawRecord {
                geometry,
                properties,
            });
        }

        debug!("Read {} features from layer {}", records.len(), layer_name);
        let mut table = FeatureTable::from_records(layer_name, records);
        table.crs_wkt = crs_wkt;
        Ok(table)
    }

    fn write(&self, table: &FeatureTable, path: &Path, driver: &str) -> Result<(), EngineError> {
        let driver = DriverManager::get_driver_by_name(driver)?;
        let mut dataset = driver.create_vector_only(path)?;

        let srs = table
            .crs_wkt
            .as_deref()
            .map(SpatialRef::from_wkt)
            .transpose()?;
        let layer_name = if table.layer_name.is_empty() {
            "layer"
        } else {
            table.layer_name.as_str()
        };
        let mut layer = dataset.create_layer(LayerOptions {
            name: layer_name,
            srs: srs.as_ref(),
            ty: layer_geometry_type(table),
            options: None,
        })?;

        let field_defs: Vec<(&str, OGRFieldType::Type)> = table
            .fields
            .iter()
            .map(|f| (f.name.as_str(), ogr_field_type(f.kind)))
            .collect();
        layer.create_defn_fields(&field_defs)?;

        for (index, feature) in table.features.iter().enumerate() {
            let (names, values): (Vec<&str>, Vec<FieldValue>) = table
                .fields
                .iter()
                .zip(&feature.attributes)
                .filter_map(|(field, value)| {
                    value
                        .as_ref()
                        .map(|v| (field.name.as_str(), attribute_to_gdal(v)))
                })
                .unzip();

            match &feature.geometry {
                Some(geometry) => {
                    let geometry = geometry.to_gdal().map_err(|e| EngineError::Geometry {
                        index,
                        message: e.to_string(),
                    })?;
                    layer.create_feature_fields(geometry, &names, &values)?;
                }
                None => {
                    let ogr_feature = Feature::new(layer.defn())?;
                    for (name, value) in names.iter().zip(&values) {
                        ogr_feature.set_field(name, value)?;
                    }
                    ogr_feature.create(&layer)?;
                }
            }
        }

        debug!(
            "Wrote {} features to {} with {}",
            table.len(),
            path.display(),
            driver.short_name()
        );
        Ok(())
    }
}

/// Layer geometry type: the common type of every non-null geometry, or
/// `wkbUnknown` when they differ. Drivers such as ESRI Shapefile need a
/// concrete type to pick the shape class.
fn layer_geometry_type(table: &FeatureTable) -> OGRwkbGeometryType::Type {
    let mut types = table
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .map(ogr_geometry_type);
    match types.next() {
        Some(first) if types.all(|t| t == first) => first,
        _ => OGRwkbGeometryType::wkbUnknown,
    }
}

fn ogr_geometry_type(geometry: &Geometry<f64>) -> OGRwkbGeometryType::Type {
    match geometry {
        Geometry::Point(_) => OGRwkbGeometryType::wkbPoint,
        Geometry::Line(_) | Geometry::LineString(_) => OGRwkbGeometryType::wkbLineString,
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
            OGRwkbGeometryType::wkbPolygon
        }
        Geometry::MultiPoint(_) => OGRwkbGeometryType::wkbMultiPoint,
        Geometry::MultiLineString(_) => OGRwkbGeometryType::wkbMultiLineString,
        Geometry::MultiPolygon(_) => OGRwkbGeometryType::wkbMultiPolygon,
        Geometry::GeometryCollection(_) => OGRwkbGeometryType::wkbGeometryCollection,
    }
}

fn attribute_from_gdal(value: FieldValue) -> Option<AttributeValue> {
    match value {
        FieldValue::IntegerValue(v) => Some(AttributeValue::Integer(v as i64)),
        FieldValue::Integer64Value(v) => Some(AttributeValue::Integer(v)),
        FieldValue::RealValue(v) => Some(AttributeValue::Real(v)),
        FieldValue::StringValue(v) => Some(AttributeValue::Text(v)),
        FieldValue::DateValue(v) => Some(AttributeValue::Date(v)),
        FieldValue::DateTimeValue(v) => Some(AttributeValue::DateTime(v)),
        other => other.into_string().map(AttributeValue::Text),
    }
}

fn attribute_to_gdal(value: &AttributeValue) -> FieldValue {
    match value {
        AttributeValue::Integer(v) => FieldValue::Integer64Value(*v),
        AttributeValue::Real(v) => FieldValue::RealValue(*v),
        AttributeValue::Text(v) => FieldValue::StringValue(v.clone()),
        AttributeValue::Boolean(v) => FieldValue::IntegerValue(i32::from(*v)),
        AttributeValue::Date(v) => FieldValue::DateValue(*v),
        AttributeValue::DateTime(v) => FieldValue::DateTimeValue(*v),
    }
}

fn ogr_field_type(kind: FieldKind) -> OGRFieldType::Type {
    match kind {
        FieldKind::Integer => OGRFieldType::OFTInteger64,
        FieldKind::Real => OGRFieldType::OFTReal,
        FieldKind::Text => OGRFieldType::OFTString,
        FieldKind::Boolean => OGRFieldType::OFTInteger,
        FieldKind::Date => OGRFieldType::OFTDate,
        FieldKind::DateTime => OGRFieldType::OFTDateTime,
    }
}
