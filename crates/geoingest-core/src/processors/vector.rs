//! Shapefile processor.

use std::fmt::Display;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dbase::{FieldType, FieldValue};
use encoding_rs::Encoding;
use geojson::{Feature, FeatureCollection, JsonObject};
use log::{debug, warn};
use serde_json::Value as JsonValue;
use shapefile::Shape;

use super::{FormatHandle, FormatProcessor, GEOMETRY_FIELD, number_value};
use crate::encoding::{self, EncodingSetting};
use crate::error::{FormatError, GeoIngestError, ReadContextExt, Result};
use crate::types::{DatasetType, FieldKind, GeometryKind, SchemaField};
use crate::utils::run_blocking;

const FORMAT: &str = "Shapefile";
const SHP_FILE_CODE: i32 = 9994;
const SHP_HEADER_LEN: usize = 100;
/// Name the `dbase` reader gives the record deletion marker.
const DELETION_FLAG: &str = "DeletionFlag";

/// Processor for `.shp` datasets with their `.dbf` attribute table.
#[derive(Debug, Default, Clone, Copy)]
pub struct VectorProcessor;

#[derive(Debug)]
pub struct VectorHandle {
    shp: PathBuf,
    dbf: PathBuf,
    encoding: &'static Encoding,
    geometry: GeometryKind,
}

#[async_trait]
impl FormatProcessor for VectorProcessor {
    type Handle = VectorHandle;

    async fn open(
        &self,
        path: &Path,
        encoding: EncodingSetting,
    ) -> Result<FormatHandle<VectorHandle>> {
        let shp = path.to_path_buf();
        run_blocking(move || {
            let dbf = sibling(&shp, "dbf").ok_or_else(|| FormatError::MissingComponent {
                format: FORMAT.to_string(),
                path: shp.clone(),
                component: "dbf".to_string(),
            })?;
            let geometry = read_geometry_kind(&shp)?;
            let encoding = encoding.resolve(|| sniff_encoding(&shp, &dbf));
            debug!("Reading {} as {}", shp.display(), encoding.name());

            Ok(FormatHandle {
                primary: shp.clone(),
                handle: VectorHandle {
                    shp,
                    dbf,
                    encoding,
                    geometry,
                },
            })
        })
        .await
    }

    async fn schema_fields(&self, handle: &mut VectorHandle) -> Result<Vec<SchemaField>> {
        let dbf = handle.dbf.clone();
        let encoding = handle.encoding;
        let geometry = handle.geometry;
        run_blocking(move || {
            let reader = open_dbf(&dbf, encoding)?;
            let mut fields: Vec<SchemaField> = reader
                .fields()
                .iter()
                .filter(|field| field.name() != DELETION_FLAG)
                .map(|field| {
                    SchemaField::new(
                        field.name(),
                        field_kind(field.field_type()),
                        Some(u32::from(field.length())),
                    )
                })
                .collect();
            fields.push(SchemaField::geometry(GEOMETRY_FIELD, geometry));
            Ok(fields)
        })
        .await
    }

    async fn geographic_info(&self, handle: &mut VectorHandle) -> Result<Option<FeatureCollection>> {
        let shp = handle.shp.clone();
        let dbf = handle.dbf.clone();
        let encoding = handle.encoding;
        run_blocking(move || {
            let shapes = shapefile::read_shapes(&shp).map_err(|e| invalid(&shp, &e))?;
            let mut reader = open_dbf(&dbf, encoding)?;
            let names: Vec<String> = reader
                .fields()
                .iter()
                .filter(|field| field.name() != DELETION_FLAG)
                .map(|field| field.name().to_string())
                .collect();
            let records = reader.read().map_err(|e| invalid(&dbf, &e))?;
            if shapes.len() != records.len() {
                warn!(
                    "{} holds {} shape(s) but {} record(s); extra entries are dropped",
                    shp.display(),
                    shapes.len(),
                    records.len()
                );
            }

            let features = shapes
                .into_iter()
                .zip(records)
                .map(|(shape, record)| -> Result<Feature> {
                    let properties: JsonObject = names
                        .iter()
                        .map(|name| {
                            let value = record.get(name).map_or(JsonValue::Null, field_value);
                            (name.clone(), value)
                        })
                        .collect();
                    Ok(Feature {
                        bbox: None,
                        geometry: shape_geometry(shape)?,
                        id: None,
                        properties: Some(properties),
                        foreign_members: None,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(Some(FeatureCollection {
                bbox: None,
                features,
                foreign_members: None,
            }))
        })
        .await
    }

    fn file_type(&self) -> DatasetType {
        DatasetType::Vector
    }

    fn should_repackage(&self) -> bool {
        true
    }
}

/// Finds the same-stem file with extension `ext`, in lower or upper case.
fn sibling(path: &Path, ext: &str) -> Option<PathBuf> {
    [ext.to_ascii_lowercase(), ext.to_ascii_uppercase()]
        .iter()
        .map(|candidate| path.with_extension(candidate))
        .find(|candidate| candidate.is_file())
}

/// Reads the shape type from the main file header.
fn read_geometry_kind(shp: &Path) -> Result<GeometryKind> {
    let mut header = [0u8; SHP_HEADER_LEN];
    fs_err::File::open(shp)
        .and_then(|mut file| file.read_exact(&mut header))
        .with_read_context(FORMAT, shp)?;

    let file_code = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if file_code != SHP_FILE_CODE {
        return Err(invalid(shp, &format!("unexpected file code {file_code}")));
    }
    let shape_type = i32::from_le_bytes([header[32], header[33], header[34], header[35]]);
    Ok(GeometryKind::from_type_name(shape_type_name(shape_type)))
}

fn shape_type_name(shape_type: i32) -> &'static str {
    match shape_type {
        1 | 11 | 21 => "Point",
        3 | 13 | 23 => "LineString",
        5 | 15 | 25 => "Polygon",
        8 | 18 | 28 => "MultiPoint",
        _ => "Geometry",
    }
}

/// Picks the attribute encoding from the `.cpg` sidecar or the record bytes.
fn sniff_encoding(shp: &Path, dbf: &Path) -> &'static Encoding {
    if let Some(cpg) = sibling(shp, "cpg") {
        match fs_err::read_to_string(&cpg) {
            Ok(label) => match encoding::for_label(&label) {
                Some(encoding) => return encoding,
                None => warn!("Ignoring unknown code page '{}' in {}", label.trim(), cpg.display()),
            },
            Err(e) => warn!("{e}"),
        }
    }
    match fs_err::read(dbf) {
        Ok(bytes) => encoding::detect(dbf_records(&bytes)),
        Err(e) => {
            warn!("{e}; assuming UTF-8");
            encoding_rs::UTF_8
        },
    }
}

/// Skips the table header, whose length is stored at bytes 8..10.
fn dbf_records(bytes: &[u8]) -> &[u8] {
    if bytes.len() < 10 {
        return bytes;
    }
    let header_len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    &bytes[header_len.min(bytes.len())..]
}

fn open_dbf(dbf: &Path, encoding: &'static Encoding) -> Result<dbase::Reader<impl Read + Seek>> {
    dbase::Reader::from_path_with_encoding(dbf, dbase::encoding::EncodingRs::from(encoding))
        .map_err(|e| invalid(dbf, &e))
}

fn field_kind(field_type: FieldType) -> FieldKind {
    match field_type {
        FieldType::Numeric
        | FieldType::Float
        | FieldType::Double
        | FieldType::Integer
        | FieldType::Currency => FieldKind::Number,
        _ => FieldKind::Text,
    }
}

fn field_value(value: &FieldValue) -> JsonValue {
    match value {
        FieldValue::Character(text) => text.clone().map_or(JsonValue::Null, JsonValue::String),
        FieldValue::Numeric(number) => number.map_or(JsonValue::Null, number_value),
        FieldValue::Float(number) => {
            number.map_or(JsonValue::Null, |n| number_value(f64::from(n)))
        },
        FieldValue::Integer(number) => JsonValue::from(*number),
        FieldValue::Double(number) | FieldValue::Currency(number) => number_value(*number),
        FieldValue::Logical(flag) => flag.map_or(JsonValue::Null, JsonValue::Bool),
        FieldValue::Memo(text) => JsonValue::String(text.clone()),
        FieldValue::Date(date) => date.as_ref().map_or(JsonValue::Null, |d| {
            JsonValue::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }),
        other => JsonValue::String(format!("{other:?}")),
    }
}

fn shape_geometry(shape: Shape) -> Result<Option<geojson::Geometry>> {
    if matches!(shape, Shape::NullShape) {
        return Ok(None);
    }
    let geometry = geo_types::Geometry::<f64>::try_from(shape).map_err(|e| {
        FormatError::InvalidGeometry {
            format: FORMAT.to_string(),
            message: e.to_string(),
        }
    })?;
    Ok(Some(geojson::Geometry::new(geojson::Value::from(&geometry))))
}

fn invalid(path: &Path, err: &dyn Display) -> GeoIngestError {
    FormatError::Invalid {
        format: FORMAT.to_string(),
        path: path.to_path_buf(),
        message: err.to_string(),
    }
    .into()
}
