//! GML feature collections
//!
//! Writes a GML3 collection in the `ogr:` application schema layout. Reads
//! `featureMember`/`featureMembers`/`member` collections with either GML2
//! (`coordinates`) or GML3 (`pos`/`posList`) geometry encodings.

use std::path::Path;

use geo_types::{Coord, Geometry, LineString, Point, Polygon};
use log::debug;
use xmltree::Element;

use super::markup::{
    children, element, is_leaf, parse_comma_tuples, parse_number_list, push_child, read_document,
    text, text_element, write_document,
};
use super::{collect_parts, infer_text_value, layer_name};
use crate::error::EngineError;
use crate::pipeline::dataset::{AttributeValue, FeatureTable, RawRecord};

const FORMAT: &str = "GML";
const GML_NAMESPACE: &str = "http://www.opengis.net/gml";
const OGR_NAMESPACE: &str = "http://ogr.maptools.org/";
const GEOMETRY_PROPERTY: &str = "geometryProperty";

/// Read the features of a GML collection
pub fn read_gml(path: &Path) -> Result<FeatureTable, EngineError> {
    let root = read_document(path)?;

    let mut members = Vec::new();
    for child in children(&root) {
        match child.name.as_str() {
            "featureMember" | "member" | "featureMembers" => members.extend(children(child)),
            _ => {}
        }
    }

    let mut records = Vec::with_capacity(members.len());
    for (index, member) in members.iter().enumerate() {
        let mut geometry = None;
        let mut properties = Vec::new();
        for child in children(member) {
            if child.name == "boundedBy" {
                continue;
            }
            if is_leaf(child) {
                let value = text(child);
                let value = (!value.is_empty()).then(|| infer_text_value(&value));
                properties.push((child.name.clone(), value));
            } else if geometry.is_none() {
                if let Some(shape) = children(child).find(|c| is_geometry(&c.name)) {
                    geometry = Some(read_geometry(shape, index)?);
                }
            }
        }
        records.push(RawRecord {
            geometry,
            properties,
        });
    }

    let layer = members
        .first()
        .map(|m| m.name.clone())
        .unwrap_or_else(|| layer_name(path));

    debug!("Read {} GML features from {}", records.len(), path.display());
    Ok(FeatureTable::from_records(layer, records))
}

fn is_geometry(name: &str) -> bool {
    matches!(
        name,
        "Point"
            | "LineString"
            | "LinearRing"
            | "Polygon"
            | "MultiPoint"
            | "MultiLineString"
            | "MultiCurve"
            | "MultiPolygon"
            | "MultiSurface"
            | "MultiGeometry"
    )
}

fn read_geometry(elem: &Element, index: usize) -> Result<Geometry<f64>, EngineError> {
    let malformed = |message: String| EngineError::Geometry { index, message };

    match elem.name.as_str() {
        "Point" => read_coords(elem)?
            .first()
            .map(|c| Geometry::Point(Point::from(*c)))
            .ok_or_else(|| malformed("Point without a position".to_string())),
        "LineString" | "LinearRing" => Ok(Geometry::LineString(LineString::from(read_coords(elem)?))),
        "Polygon" => {
            let mut exterior = None;
            let mut interiors = Vec::new();
            for boundary in children(elem) {
                let Some(ring) = boundary.get_child("LinearRing") else {
                    continue;
                };
                let ring = LineString::from(read_coords(ring)?);
                match boundary.name.as_str() {
                    "exterior" | "outerBoundaryIs" => exterior = Some(ring),
                    "interior" | "innerBoundaryIs" => interiors.push(ring),
                    _ => {}
                }
            }
            let exterior = exterior.ok_or_else(|| malformed("Polygon without an exterior ring".to_string()))?;
            Ok(Geometry::Polygon(Polygon::new(exterior, interiors)))
        }
        _ => {
            let mut parts = Vec::new();
            for member in children(elem) {
                for shape in children(member).filter(|c| is_geometry(&c.name)) {
                    parts.push(read_geometry(shape, index)?);
                }
            }
            Ok(collect_parts(parts))
        }
    }
}

/// Positions of a simple geometry in any of the GML encodings
fn read_coords(elem: &Element) -> Result<Vec<Coord<f64>>, EngineError> {
    let dimension = |e: &Element| {
        e.attributes
            .get("srsDimension")
            .or_else(|| elem.attributes.get("srsDimension"))
            .and_then(|d| d.parse::<usize>().ok())
            .unwrap_or(2)
    };

    let mut coords = Vec::new();
    for child in children(elem) {
        match child.name.as_str() {
            "pos" | "posList" => {
                coords.extend(parse_number_list(&text(child), dimension(child), FORMAT)?)
            }
            "coordinates" => coords.extend(parse_comma_tuples(&text(child), FORMAT)?),
            "coord" => {
                let ordinate = |name: &str| child.get_child(name).map(text).and_then(|v| v.parse::<f64>().ok());
                match (ordinate("X"), ordinate("Y")) {
                    (Some(x), Some(y)) => coords.push(Coord { x, y }),
                    _ => {
                        return Err(EngineError::Malformed {
                            format: FORMAT,
                            message: "coord without X and Y".to_string(),
                        })
                    }
                }
            }
            _ => {}
        }
    }
    Ok(coords)
}

/// Write `table` as a GML3 feature collection. Null attributes are omitted,
/// null geometries leave out the geometry property.
pub fn write_gml(table: &FeatureTable, path: &Path) -> Result<(), EngineError> {
    let layer = xml_name(&table.layer_name);
    let field_names: Vec<String> = table.fields.iter().map(|f| xml_name(&f.name)).collect();

    let mut root = element("ogr:FeatureCollection");
    root.attributes
        .insert("xmlns:ogr".to_string(), OGR_NAMESPACE.to_string());
    root.attributes
        .insert("xmlns:gml".to_string(), GML_NAMESPACE.to_string());

    for (index, feature) in table.features.iter().enumerate() {
        let mut item = element(&format!("ogr:{}", layer));
        item.attributes
            .insert("gml:id".to_string(), format!("{}.{}", layer, index));

        if let Some(geometry) = &feature.geometry {
            let mut property = element(&format!("ogr:{}", GEOMETRY_PROPERTY));
            push_child(&mut property, geometry_element(geometry));
            push_child(&mut item, property);
        }
        for (name, value) in field_names.iter().zip(&feature.attributes) {
            if let Some(value) = value {
                push_child(&mut item, text_element(&format!("ogr:{}", name), value_text(value)));
            }
        }

        let mut member = element("gml:featureMember");
        push_child(&mut member, item);
        push_child(&mut root, member);
    }

    write_document(&root, path)
}

fn value_text(value: &AttributeValue) -> String {
    match value {
        AttributeValue::DateTime(v) => v.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
        other => other.to_text(),
    }
}

/// Make a column or layer name usable as an XML element name
fn xml_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !out.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        out.insert(0, '_');
    }
    out
}

fn positions(coords: impl Iterator<Item = Coord<f64>>) -> String {
    coords
        .map(|c| format!("{} {}", c.x, c.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn geometry_element(geometry: &Geometry<f64>) -> Element {
    match geometry {
        Geometry::Point(p) => {
            let mut elem = element("gml:Point");
            push_child(&mut elem, text_element("gml:pos", positions(std::iter::once(p.0))));
            elem
        }
        Geometry::Line(l) => line_element([l.start, l.end].into_iter()),
        Geometry::LineString(l) => line_element(l.coords().copied()),
        Geometry::Polygon(p) => polygon_element(p),
        Geometry::Rect(r) => polygon_element(&r.to_polygon()),
        Geometry::Triangle(t) => polygon_element(&t.to_polygon()),
        Geometry::MultiPoint(mp) => multi_element(
            "gml:MultiPoint",
            "gml:pointMember",
            mp.iter().map(|p| Geometry::Point(*p)),
        ),
        Geometry::MultiLineString(ml) => multi_element(
            "gml:MultiCurve",
            "gml:curveMember",
            ml.iter().map(|l| Geometry::LineString(l.clone())),
        ),
        Geometry::MultiPolygon(mp) => multi_element(
            "gml:MultiSurface",
            "gml:surfaceMember",
            mp.iter().map(|p| Geometry::Polygon(p.clone())),
        ),
        Geometry::GeometryCollection(gc) => {
            multi_element("gml:MultiGeometry", "gml:geometryMember", gc.iter().cloned())
        }
    }
}

fn line_element(coords: impl Iterator<Item = Coord<f64>>) -> Element {
    let mut elem = element("gml:LineString");
    push_child(&mut elem, text_element("gml:posList", positions(coords)));
    elem
}

fn polygon_element(polygon: &Polygon<f64>) -> Element {
    let ring = |boundary: &str, ring: &LineString<f64>| {
        let mut linear = element("gml:LinearRing");
        push_child(&mut linear, text_element("gml:posList", positions(ring.coords().copied())));
        let mut wrapper = element(boundary);
        push_child(&mut wrapper, linear);
        wrapper
    };

    let mut elem = element("gml:Polygon");
    push_child(&mut elem, ring("gml:exterior", polygon.exterior()));
    for interior in polygon.interiors() {
        push_child(&mut elem, ring("gml:interior", interior));
    }
    elem
}

fn multi_element(name: &str, member: &str, parts: impl Iterator<Item = Geometry<f64>>) -> Element {
    let mut elem = element(name);
    for part in parts {
        let mut wrapper = element(member);
        push_child(&mut wrapper, geometry_element(&part));
        push_child(&mut elem, wrapper);
    }
    elem
}
