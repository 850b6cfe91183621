//! XML helpers shared by the KML and GML codecs
//!
//! Parsed element names are local names (namespace prefixes stripped).
//! Written names are emitted as given, so `gml:Point` keeps its prefix as long
//! as the root declares it.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use geo_types::Coord;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::EngineError;

pub fn read_document(path: &Path) -> Result<Element, EngineError> {
    read_document_from(BufReader::new(File::open(path)?))
}

pub fn read_document_from<R: Read>(reader: R) -> Result<Element, EngineError> {
    Ok(Element::parse(reader)?)
}

pub fn write_document(root: &Element, path: &Path) -> Result<(), EngineError> {
    write_document_to(root, File::create(path)?)
}

/// Write `root` as an indented UTF-8 document
pub fn write_document_to<W: Write>(root: &Element, writer: W) -> Result<(), EngineError> {
    let mut writer = BufWriter::new(writer);
    root.write_with_config(&mut writer, EmitterConfig::new().perform_indent(true))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub fn element(name: &str) -> Element {
    Element::new(name)
}

pub fn text_element(name: &str, text: impl Into<String>) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.into()));
    elem
}

pub fn push_child(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}

/// Direct child elements, skipping text, comments and processing instructions
pub fn children(elem: &Element) -> impl Iterator<Item = &Element> {
    elem.children.iter().filter_map(|node| match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    })
}

/// Every element named `name` below `root`, in document order. Matches are
/// not searched further, so nested placemarks inside a match are not repeated.
pub fn collect_descendants<'a>(root: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for child in children(root) {
        if child.name == name {
            out.push(child);
        } else {
            collect_descendants(child, name, out);
        }
    }
}

/// First descendant named `name`, depth first
pub fn find_descendant<'a>(root: &'a Element, name: &str) -> Option<&'a Element> {
    for child in children(root) {
        if child.name == name {
            return Some(child);
        }
        if let Some(found) = find_descendant(child, name) {
            return Some(found);
        }
    }
    None
}

/// Trimmed text content, empty when the element has none
pub fn text(elem: &Element) -> String {
    elem.get_text()
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

/// Whether an element has no child elements (a plain value)
pub fn is_leaf(elem: &Element) -> bool {
    children(elem).next().is_none()
}

/// Parse whitespace-separated `x,y[,z]` tuples as used by KML and GML2
/// `coordinates`. The third ordinate is dropped.
pub fn parse_comma_tuples(text: &str, format: &'static str) -> Result<Vec<Coord<f64>>, EngineError> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let x = parts.next().and_then(|v| v.parse::<f64>().ok());
            let y = parts.next().and_then(|v| v.parse::<f64>().ok());
            match (x, y) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(EngineError::Malformed {
                    format,
                    message: format!("bad coordinate tuple \"{}\"", tuple),
                }),
            }
        })
        .collect()
}

/// Parse a flat list of numbers in groups of `dimension` as used by GML3
/// `pos` and `posList`
pub fn parse_number_list(
    text: &str,
    dimension: usize,
    format: &'static str,
) -> Result<Vec<Coord<f64>>, EngineError> {
    let numbers = text
        .split_whitespace()
        .map(|v| {
            v.parse::<f64>().map_err(|_| EngineError::Malformed {
                format,
                message: format!("bad number \"{}\"", v),
            })
        })
        .collect::<Result<Vec<f64>, EngineError>>()?;

    let dimension = dimension.max(2);
    if numbers.len() % dimension != 0 {
        return Err(EngineError::Malformed {
            format,
            message: format!(
                "{} numbers do not split into {}-dimensional positions",
                numbers.len(),
                dimension
            ),
        });
    }
    Ok(numbers
        .chunks(dimension)
        .map(|c| Coord { x: c[0], y: c[1] })
        .collect())
}
