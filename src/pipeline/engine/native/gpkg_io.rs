//! GeoPackage codec on SQLite
//!
//! Writes a single feature table with the minimal GeoPackage metadata tables
//! and GeoPackage binary geometries. Reads the first feature table listed in
//! `gpkg_contents`.

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use geo_types::Geometry;
use geozero::wkb::GpkgWkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};
use log::debug;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};

use super::geometry_name;
use crate::error::EngineError;
use crate::pipeline::dataset::{AttributeValue, Feature, FeatureTable, FieldDef, FieldKind};

const FORMAT: &str = "GeoPackage";
/// "GPKG" in ASCII
const APPLICATION_ID: i32 = 0x4750_4B47;
/// GeoPackage 1.4.0
const USER_VERSION: i32 = 10400;

const GEOMETRY_COLUMN: &str = "geom";
const FID_COLUMN: &str = "fid";
const WGS84_SRS_ID: i32 = 4326;
const CUSTOM_SRS_ID: i32 = 100_000;

const WGS84_WKT: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AXIS[\"Latitude\",NORTH],AXIS[\"Longitude\",EAST],AUTHORITY[\"EPSG\",\"4326\"]]";

const METADATA_SCHEMA: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT uk_gc_table_name UNIQUE (table_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
INSERT INTO gpkg_spatial_ref_sys VALUES
    ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
    ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system');
";

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Geometry type recorded in `gpkg_geometry_columns`
fn geometry_type_name(table: &FeatureTable) -> &'static str {
    let mut names = table.features.iter().filter_map(|f| f.geometry.as_ref()).map(|g| {
        match g {
            Geometry::Line(_) => "LineString",
            Geometry::Rect(_) | Geometry::Triangle(_) => "Polygon",
            other => geometry_name(other),
        }
    });
    let Some(first) = names.next() else {
        return "GEOMETRY";
    };
    if !names.all(|n| n == first) {
        return "GEOMETRY";
    }
    match first {
        "Point" => "POINT",
        "LineString" => "LINESTRING",
        "Polygon" => "POLYGON",
        "MultiPoint" => "MULTIPOINT",
        "MultiLineString" => "MULTILINESTRING",
        "MultiPolygon" => "MULTIPOLYGON",
        "GeometryCollection" => "GEOMETRYCOLLECTION",
        _ => "GEOMETRY",
    }
}

fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Integer => "INTEGER",
        FieldKind::Real => "REAL",
        FieldKind::Text => "TEXT",
        FieldKind::Boolean => "BOOLEAN",
        FieldKind::Date => "DATE",
        FieldKind::DateTime => "DATETIME",
    }
}

/// Column names that do not collide with the key or geometry columns
fn column_names(table: &FeatureTable) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(table.fields.len());
    for field in &table.fields {
        let taken = |candidate: &str| {
            candidate.eq_ignore_ascii_case(FID_COLUMN)
                || candidate.eq_ignore_ascii_case(GEOMETRY_COLUMN)
                || names.iter().any(|n| n.eq_ignore_ascii_case(candidate))
        };
        let mut candidate = field.name.clone();
        let mut suffix = 1;
        while taken(&candidate) {
            candidate = format!("{}_{}", field.name, suffix);
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}

fn sql_value(value: Option<&AttributeValue>) -> Value {
    match value {
        None => Value::Null,
        Some(AttributeValue::Integer(v)) => Value::Integer(*v),
        Some(AttributeValue::Real(v)) => Value::Real(*v),
        Some(AttributeValue::Text(v)) => Value::Text(v.clone()),
        Some(AttributeValue::Boolean(v)) => Value::Integer(i64::from(*v)),
        Some(AttributeValue::Date(v)) => Value::Text(v.format("%Y-%m-%d").to_string()),
        Some(AttributeValue::DateTime(v)) => Value::Text(
            v.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
    }
}

/// Write `table` as a new GeoPackage, replacing any file at `path`
pub fn write_gpkg(table: &FeatureTable, path: &Path) -> Result<(), EngineError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let layer = if table.layer_name.is_empty() {
        "layer".to_string()
    } else {
        table.layer_name.clone()
    };
    let columns = column_names(table);
    let geometry_type = geometry_type_name(table);

    let mut conn = Connection::open(path)?;
    conn.pragma_update(None, "application_id", APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", USER_VERSION)?;

    let tx = conn.transaction()?;
    tx.execute_batch(METADATA_SCHEMA)?;
    tx.execute(
        "INSERT INTO gpkg_spatial_ref_sys VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params!["WGS 84 geodetic", WGS84_SRS_ID, "EPSG", 4326, WGS84_WKT, "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid"],
    )?;

    let srs_id = match &table.crs_wkt {
        Some(wkt) => {
            tx.execute(
                "INSERT INTO gpkg_spatial_ref_sys VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                params![layer, CUSTOM_SRS_ID, "NONE", CUSTOM_SRS_ID, wkt],
            )?;
            CUSTOM_SRS_ID
        }
        None => WGS84_SRS_ID,
    };

    let mut definition = vec![
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL", quote(FID_COLUMN)),
        format!("{} {}", quote(GEOMETRY_COLUMN), geometry_type),
    ];
    definition.extend(
        table
            .fields
            .iter()
            .zip(&columns)
            .map(|(field, name)| format!("{} {}", quote(name), sql_type(field.kind))),
    );
    tx.execute_batch(&format!("CREATE TABLE {} ({});", quote(&layer), definition.join(", ")))?;

    tx.execute(
        "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) VALUES (?1, 'features', ?1, ?2)",
        params![layer, srs_id],
    )?;
    tx.execute(
        "INSERT INTO gpkg_geometry_columns VALUES (?1, ?2, ?3, ?4, 0, 0)",
        params![layer, GEOMETRY_COLUMN, geometry_type, srs_id],
    )?;

    {
        let mut names = vec![quote(GEOMETRY_COLUMN)];
        names.extend(columns.iter().map(|c| quote(c)));
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&layer),
            names.join(", "),
            placeholders.join(", ")
        ))?;

        for feature in &table.features {
            let geometry = match &feature.geometry {
                Some(g) => Value::Blob(g.to_gpkg_wkb(CoordDimensions::xy(), Some(srs_id), Vec::new())?),
                None => Value::Null,
            };
            let mut values = vec![geometry];
            values.extend(
                feature
                    .attributes
                    .iter()
                    .map(|v| sql_value(v.as_ref())),
            );
            insert.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    debug!("Wrote {} features to GeoPackage table {}", table.len(), layer);
    Ok(())
}

/// Read the first feature table of a GeoPackage
pub fn read_gpkg(path: &Path) -> Result<FeatureTable, EngineError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let layer: String = conn
        .query_row(
            "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY rowid LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| EngineError::Malformed {
            format: FORMAT,
            message: "no feature table in gpkg_contents".to_string(),
        })?;

    let (geometry_column, srs_id): (String, i64) = conn.query_row(
        "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
        [&layer],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let crs_wkt: Option<String> = conn
        .query_row(
            "SELECT definition FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            [srs_id],
            |row| row.get(0),
        )
        .optional()?
        .filter(|definition: &String| definition != "undefined");

    // (name, declared type) of every attribute column
    let mut columns: Vec<(String, String)> = Vec::new();
    {
        let mut info = conn.prepare(&format!("PRAGMA table_info({})", quote(&layer)))?;
        let mut rows = info.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            let declared: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
            let pk: i64 = row.get(5)?;
            if pk > 0 || name.eq_ignore_ascii_case(&geometry_column) {
                continue;
            }
            columns.push((name, declared.to_uppercase()));
        }
    }

    let mut selected = vec![quote(&geometry_column)];
    selected.extend(columns.iter().map(|(name, _)| quote(name)));
    let mut query = conn.prepare(&format!(
        "SELECT {} FROM {} ORDER BY rowid",
        selected.join(", "),
        quote(&layer)
    ))?;

    let mut features = Vec::new();
    let mut rows = query.query([])?;
    while let Some(row) = rows.next()? {
        let geometry: Option<Geometry<f64>> = match row.get_ref(0)? {
            ValueRef::Blob(blob) => Some(GpkgWkb(blob.to_vec()).to_geo()?),
            _ => None,
        };
        let mut attributes = Vec::with_capacity(columns.len());
        for (i, (_, declared)) in columns.iter().enumerate() {
            attributes.push(attribute_from_sql(row.get_ref(i + 1)?, declared));
        }
        features.push(Feature {
            geometry,
            attributes,
        });
    }

    let fields = columns
        .iter()
        .enumerate()
        .map(|(i, (name, declared))| FieldDef {
            name: name.clone(),
            kind: field_kind(declared, features.iter().filter_map(|f: &Feature| f.attributes[i].as_ref())),
        })
        .collect();

    debug!("Read {} features from GeoPackage table {}", features.len(), layer);
    Ok(FeatureTable {
        layer_name: layer,
        fields,
        features,
        crs_wkt,
    })
}

fn attribute_from_sql(value: ValueRef<'_>, declared: &str) -> Option<AttributeValue> {
    let text = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
    match (declared, value) {
        (_, ValueRef::Null) => None,
        ("BOOLEAN", ValueRef::Integer(v)) => Some(AttributeValue::Boolean(v != 0)),
        ("DATE", ValueRef::Text(t)) => NaiveDate::parse_from_str(&text(t), "%Y-%m-%d")
            .ok()
            .map(AttributeValue::Date),
        ("DATETIME", ValueRef::Text(t)) => DateTime::parse_from_rfc3339(&text(t))
            .ok()
            .map(AttributeValue::DateTime),
        (_, ValueRef::Integer(v)) => Some(AttributeValue::Integer(v)),
        (_, ValueRef::Real(v)) => Some(AttributeValue::Real(v)),
        (_, ValueRef::Text(t)) => Some(AttributeValue::Text(text(t))),
        (_, ValueRef::Blob(_)) => None,
    }
}

fn field_kind<'a>(declared: &str, mut values: impl Iterator<Item = &'a AttributeValue>) -> FieldKind {
    match declared {
        "BOOLEAN" => FieldKind::Boolean,
        "DATE" => FieldKind::Date,
        "DATETIME" => FieldKind::DateTime,
        "TEXT" => FieldKind::Text,
        d if d.contains("INT") => FieldKind::Integer,
        "REAL" | "DOUBLE" | "FLOAT" => FieldKind::Real,
        _ => values.next().map(|v| v.kind()).unwrap_or(FieldKind::Text),
    }
}
