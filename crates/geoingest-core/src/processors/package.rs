//! GeoPackage processor.
//!
//! Reads the first feature table listed in `gpkg_contents`. Attribute columns
//! come from the table definition, the geometry column and its type from
//! `gpkg_geometry_columns`, and geometry blobs are decoded as GeoPackage WKB.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use geojson::{Feature, FeatureCollection, JsonObject};
use geozero::ToJson;
use geozero::wkb::GpkgWkb;
use log::debug;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Connection, Row};

use super::{FormatHandle, FormatProcessor, number_value};
use crate::encoding::EncodingSetting;
use crate::error::{FormatError, ReadContextExt, Result};
use crate::types::{DatasetType, FieldKind, GeometryKind, SchemaField};

const FORMAT: &str = "GeoPackage";

/// Processor for single-file GeoPackage databases.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageProcessor;

#[derive(Debug)]
pub struct PackageHandle {
    path: PathBuf,
    conn: SqliteConnection,
    table: String,
    geometry: Option<(String, GeometryKind)>,
}

#[async_trait]
impl FormatProcessor for PackageProcessor {
    type Handle = PackageHandle;

    async fn open(
        &self,
        path: &Path,
        _encoding: EncodingSetting,
    ) -> Result<FormatHandle<PackageHandle>> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .with_read_context(FORMAT, path)?;

        let table: Option<String> = sqlx::query_scalar(
            "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' \
             ORDER BY table_name LIMIT 1",
        )
        .fetch_optional(&mut conn)
        .await
        .with_read_context(FORMAT, path)?;
        let table = table.ok_or_else(|| FormatError::Invalid {
            format: FORMAT.to_string(),
            path: path.to_path_buf(),
            message: "no feature table in gpkg_contents".to_string(),
        })?;

        let geometry: Option<(String, String)> = sqlx::query_as(
            "SELECT column_name, geometry_type_name FROM gpkg_geometry_columns \
             WHERE table_name = ?",
        )
        .bind(table.as_str())
        .fetch_optional(&mut conn)
        .await
        .with_read_context(FORMAT, path)?;
        debug!("Reading feature table '{table}' of {}", path.display());

        Ok(FormatHandle {
            primary: path.to_path_buf(),
            handle: PackageHandle {
                path: path.to_path_buf(),
                conn,
                table,
                geometry: geometry
                    .map(|(column, kind)| (column, GeometryKind::from_type_name(&kind))),
            },
        })
    }

    async fn schema_fields(&self, handle: &mut PackageHandle) -> Result<Vec<SchemaField>> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(&handle.table)))
            .fetch_all(&mut handle.conn)
            .await
            .with_read_context(FORMAT, &handle.path)?;

        let mut fields = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name").with_read_context(FORMAT, &handle.path)?;
            let declared: String = row.try_get("type").with_read_context(FORMAT, &handle.path)?;
            let field = match &handle.geometry {
                Some((column, kind)) if *column == name => SchemaField::geometry(name, *kind),
                _ => SchemaField::new(name, column_kind(&declared), declared_width(&declared)),
            };
            fields.push(field);
        }
        Ok(fields)
    }

    async fn geographic_info(&self, handle: &mut PackageHandle) -> Result<Option<FeatureCollection>> {
        let columns = self.schema_fields(handle).await?;
        let select = columns
            .iter()
            .map(|field| match field.kind {
                FieldKind::Number => format!("CAST({} AS REAL)", quote_ident(&field.name)),
                FieldKind::Text => format!("CAST({} AS TEXT)", quote_ident(&field.name)),
                FieldKind::Geometry(_) => quote_ident(&field.name),
            })
            .collect::<Vec<_>>()
            .join(", ");
        if select.is_empty() {
            return Ok(Some(empty_collection(Vec::new())));
        }

        let rows = sqlx::query(&format!("SELECT {select} FROM {}", quote_ident(&handle.table)))
            .fetch_all(&mut handle.conn)
            .await
            .with_read_context(FORMAT, &handle.path)?;

        let features = rows
            .iter()
            .map(|row| row_feature(row, &columns))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(empty_collection(features)))
    }

    fn file_type(&self) -> DatasetType {
        DatasetType::Package
    }

    fn should_repackage(&self) -> bool {
        false
    }
}

fn empty_collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn row_feature(row: &SqliteRow, columns: &[SchemaField]) -> Result<Feature> {
    let mut properties = JsonObject::new();
    let mut geometry = None;

    for (idx, field) in columns.iter().enumerate() {
        match field.kind {
            FieldKind::Number => {
                let value: Option<f64> = row.try_get_unchecked(idx).ok().flatten();
                properties.insert(
                    field.name.clone(),
                    value.map_or(JsonValue::Null, number_value),
                );
            },
            FieldKind::Text => {
                let value: Option<String> = row.try_get_unchecked(idx).ok().flatten();
                properties.insert(
                    field.name.clone(),
                    value.map_or(JsonValue::Null, JsonValue::String),
                );
            },
            FieldKind::Geometry(_) => {
                let blob: Option<Vec<u8>> = row.try_get_unchecked(idx).ok().flatten();
                if let Some(blob) = blob.filter(|b| !b.is_empty()) {
                    geometry = Some(decode_geometry(blob)?);
                }
            },
        }
    }

    Ok(Feature {
        bbox: None,
        geometry,
        id: None,
        properties: Some(properties),
        foreign_members: None,
    })
}

fn decode_geometry(blob: Vec<u8>) -> Result<geojson::Geometry> {
    let invalid = |message: String| FormatError::InvalidGeometry {
        format: FORMAT.to_string(),
        message,
    };
    let json = GpkgWkb(blob).to_json().map_err(|e| invalid(e.to_string()))?;
    Ok(serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))?)
}

/// Numeric SQL affinities map to numbers, everything else to text.
fn column_kind(declared: &str) -> FieldKind {
    let upper = declared.to_ascii_uppercase();
    let numeric = ["INT", "REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL", "BOOLEAN"]
        .iter()
        .any(|marker| upper.contains(marker));
    if numeric {
        FieldKind::Number
    } else {
        FieldKind::Text
    }
}

/// Parses the width of declarations such as `TEXT(40)`.
fn declared_width(declared: &str) -> Option<u32> {
    let open = declared.find('(')?;
    let close = declared[open..].find(')')? + open;
    declared[open + 1..close].trim().parse().ok()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
