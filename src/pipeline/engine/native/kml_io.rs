//! KML codec, with KMZ packaging on write

use std::fs::File;
use std::io::Write;
use std::path::Path;

use geo_types::{Geometry, LineString, Point, Polygon};
use log::{debug, warn};
use xmltree::Element;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::markup::{
    children, collect_descendants, element, find_descendant, parse_comma_tuples, push_child,
    read_document, text, text_element, write_document, write_document_to,
};
use super::{collect_parts, infer_text_value, layer_name};
use crate::error::EngineError;
use crate::pipeline::dataset::{AttributeValue, FeatureTable, RawRecord};

const FORMAT: &str = "KML";
const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";
/// Member name of the document inside a KMZ archive
const KMZ_DOCUMENT: &str = "doc.kml";

const NAME_FIELD: &str = "name";
const DESCRIPTION_FIELD: &str = "description";

/// Read every Placemark in document order.
///
/// `name` and `description` become text columns; `ExtendedData` values
/// (`Data` and `SimpleData`) become columns typed from their text.
pub fn read_kml(path: &Path) -> Result<FeatureTable, EngineError> {
    let root = read_document(path)?;

    let mut placemarks = Vec::new();
    collect_descendants(&root, "Placemark", &mut placemarks);

    let mut records = Vec::with_capacity(placemarks.len());
    for (index, placemark) in placemarks.into_iter().enumerate() {
        let geometry = match children(placemark).find(|c| is_geometry(&c.name)) {
            Some(elem) => Some(read_geometry(elem, index)?),
            None => None,
        };

        let mut properties = Vec::new();
        for field in [NAME_FIELD, DESCRIPTION_FIELD] {
            if let Some(value) = placemark.get_child(field) {
                properties.push((field.to_string(), Some(AttributeValue::Text(text(value)))));
            }
        }
        if let Some(extended) = placemark.get_child("ExtendedData") {
            read_extended_data(extended, &mut properties);
        }

        records.push(RawRecord {
            geometry,
            properties,
        });
    }

    let layer = find_descendant(&root, "Document")
        .and_then(|doc| doc.get_child(NAME_FIELD))
        .map(text)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| layer_name(path));

    debug!("Read {} KML placemarks from {}", records.len(), path.display());
    Ok(FeatureTable::from_records(layer, records))
}

fn read_extended_data(extended: &Element, properties: &mut Vec<(String, Option<AttributeValue>)>) {
    for data in children(extended) {
        match data.name.as_str() {
            "Data" => {
                if let Some(name) = data.attributes.get("name") {
                    let value = data.get_child("value").map(text).unwrap_or_default();
                    properties.push((name.clone(), value_from_text(&value)));
                }
            }
            "SchemaData" => {
                for simple in children(data).filter(|c| c.name == "SimpleData") {
                    if let Some(name) = simple.attributes.get("name") {
                        properties.push((name.clone(), value_from_text(&text(simple))));
                    }
                }
            }
            _ => {}
        }
    }
}

fn value_from_text(value: &str) -> Option<AttributeValue> {
    if value.is_empty() {
        None
    } else {
        Some(infer_text_value(value))
    }
}

fn is_geometry(name: &str) -> bool {
    matches!(
        name,
        "Point" | "LineString" | "LinearRing" | "Polygon" | "MultiGeometry"
    )
}

fn read_geometry(elem: &Element, index: usize) -> Result<Geometry<f64>, EngineError> {
    let malformed = |message: String| EngineError::Geometry { index, message };

    match elem.name.as_str() {
        "Point" => {
            let coords = coordinates(elem)?;
            coords
                .first()
                .map(|c| Geometry::Point(Point::from(*c)))
                .ok_or_else(|| malformed("Point without coordinates".to_string()))
        }
        "LineString" | "LinearRing" => Ok(Geometry::LineString(LineString::from(coordinates(elem)?))),
        "Polygon" => {
            let exterior = elem
                .get_child("outerBoundaryIs")
                .and_then(|b| b.get_child("LinearRing"))
                .ok_or_else(|| malformed("Polygon without outerBoundaryIs".to_string()))?;
            let interiors = children(elem)
                .filter(|c| c.name == "innerBoundaryIs")
                .filter_map(|b| b.get_child("LinearRing"))
                .map(|ring| coordinates(ring).map(LineString::from))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Geometry::Polygon(Polygon::new(
                LineString::from(coordinates(exterior)?),
                interiors,
            )))
        }
        "MultiGeometry" => {
            let parts = children(elem)
                .filter(|c| is_geometry(&c.name))
                .map(|c| read_geometry(c, index))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(collect_parts(parts))
        }
        other => Err(malformed(format!("unsupported KML geometry {}", other))),
    }
}

fn coordinates(elem: &Element) -> Result<Vec<geo_types::Coord<f64>>, EngineError> {
    let raw = elem.get_child("coordinates").map(text).unwrap_or_default();
    parse_comma_tuples(&raw, FORMAT)
}

/// Write `table` as a KML 2.2 document, one Placemark per feature.
///
/// A path ending in `.kmz` gets the document zipped as `doc.kml`.
pub fn write_kml(table: &FeatureTable, path: &Path) -> Result<(), EngineError> {
    let root = build_document(table);

    let is_kmz = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("kmz"))
        .unwrap_or(false);
    if !is_kmz {
        return write_document(&root, path);
    }

    let mut zip = ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(KMZ_DOCUMENT, options)?;
    let mut buffer = Vec::new();
    write_document_to(&root, &mut buffer)?;
    zip.write_all(&buffer)?;
    zip.finish()?;
    Ok(())
}

fn build_document(table: &FeatureTable) -> Element {
    let mut document = element("Document");
    push_child(&mut document, text_element("name", table.layer_name.as_str()));

    let mut empty = 0;
    for feature in &table.features {
        let mut placemark = element("Placemark");
        let mut extended = element("ExtendedData");

        for (field, value) in table.fields.iter().zip(&feature.attributes) {
            let Some(value) = value else { continue };
            if field.name == NAME_FIELD || field.name == DESCRIPTION_FIELD {
                push_child(&mut placemark, text_element(&field.name, value.to_text()));
            } else {
                let mut data = element("Data");
                data.attributes.insert("name".to_string(), field.name.clone());
                push_child(&mut data, text_element("value", value.to_text()));
                push_child(&mut extended, data);
            }
        }
        if !extended.children.is_empty() {
            push_child(&mut placemark, extended);
        }

        match &feature.geometry {
            Some(geometry) => push_child(&mut placemark, geometry_element(geometry)),
            None => empty += 1,
        }
        push_child(&mut document, placemark);
    }
    if empty > 0 {
        warn!("{} placemarks written without geometry", empty);
    }

    let mut root = element("kml");
    root.attributes
        .insert("xmlns".to_string(), KML_NAMESPACE.to_string());
    push_child(&mut root, document);
    root
}

fn geometry_element(geometry: &Geometry<f64>) -> Element {
    match geometry {
        Geometry::Point(p) => coordinates_element("Point", std::iter::once(p.0)),
        Geometry::Line(l) => coordinates_element("LineString", [l.start, l.end].into_iter()),
        Geometry::LineString(l) => coordinates_element("LineString", l.coords().copied()),
        Geometry::Polygon(p) => polygon_element(p),
        Geometry::Rect(r) => polygon_element(&r.to_polygon()),
        Geometry::Triangle(t) => polygon_element(&t.to_polygon()),
        Geometry::MultiPoint(mp) => multi_element(mp.iter().map(|p| Geometry::Point(*p))),
        Geometry::MultiLineString(ml) => {
            multi_element(ml.iter().map(|l| Geometry::LineString(l.clone())))
        }
        Geometry::MultiPolygon(mp) => multi_element(mp.iter().map(|p| Geometry::Polygon(p.clone()))),
        Geometry::GeometryCollection(gc) => multi_element(gc.iter().cloned()),
    }
}

fn coordinates_element(name: &str, coords: impl Iterator<Item = geo_types::Coord<f64>>) -> Element {
    let tuples: Vec<String> = coords.map(|c| format!("{},{}", c.x, c.y)).collect();
    let mut elem = element(name);
    push_child(&mut elem, text_element("coordinates", tuples.join(" ")));
    elem
}

fn polygon_element(polygon: &Polygon<f64>) -> Element {
    let ring = |boundary: &str, ring: &LineString<f64>| {
        let mut wrapper = element(boundary);
        push_child(
            &mut wrapper,
            coordinates_element("LinearRing", ring.coords().copied()),
        );
        wrapper
    };

    let mut elem = element("Polygon");
    push_child(&mut elem, ring("outerBoundaryIs", polygon.exterior()));
    for interior in polygon.interiors() {
        push_child(&mut elem, ring("innerBoundaryIs", interior));
    }
    elem
}

fn multi_element(parts: impl Iterator<Item = Geometry<f64>>) -> Element {
    let mut elem = element("MultiGeometry");
    for part in parts {
        push_child(&mut elem, geometry_element(&part));
    }
    elem
}
