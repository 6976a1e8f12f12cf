//! Data types describing ingested datasets.
//!
//! This module defines the records returned by the folder pipeline: one
//! [`DatasetRecord`] per processed file, each carrying its attribute schema
//! and, on request, its features as a `GeoJSON` feature collection.

use std::collections::HashSet;
use std::fmt;

use geojson::FeatureCollection;
use serde::{Serialize, Serializer};

/// Kind of dataset, set by the processor that handled the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DatasetType {
    /// Multi-file vector dataset (shapefile family)
    Vector,
    /// Single-file embedded database container (GeoPackage)
    Package,
    /// Opaque imagery container (GeoTIFF)
    Raster,
}

impl DatasetType {
    /// Returns the label used in serialized records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "Vector",
            Self::Package => "Package",
            Self::Raster => "Raster",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized geometry label of a dataset's geometry field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    /// Fallback when the discovered shape is not in the mapping table
    Geometry,
}

/// Single-feature geometry names and their "multi" counterparts.
static GEOMETRY_TYPE_MAPPING: &[(&str, GeometryKind)] = &[
    ("Point", GeometryKind::MultiPoint),
    ("MultiPoint", GeometryKind::MultiPoint),
    ("LineString", GeometryKind::MultiLineString),
    ("MultiLineString", GeometryKind::MultiLineString),
    ("Polygon", GeometryKind::MultiPolygon),
    ("MultiPolygon", GeometryKind::MultiPolygon),
];

impl GeometryKind {
    /// Maps a `GeoJSON`-style geometry type name to its normalized kind.
    ///
    /// Matching ignores ASCII case so that upper-case SQL names such as
    /// `MULTIPOLYGON` resolve as well. Unknown names yield [`GeometryKind::Geometry`].
    ///
    /// # Examples
    ///
    /// ```
    /// use geoingest_core::types::GeometryKind;
    ///
    /// assert_eq!(GeometryKind::from_type_name("Point"), GeometryKind::MultiPoint);
    /// assert_eq!(GeometryKind::from_type_name("POLYGON"), GeometryKind::MultiPolygon);
    /// assert_eq!(GeometryKind::from_type_name("GeometryCollection"), GeometryKind::Geometry);
    /// ```
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        GEOMETRY_TYPE_MAPPING
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map_or(Self::Geometry, |(_, kind)| *kind)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultiPoint => "MultiPoint",
            Self::MultiLineString => "MultiLineString",
            Self::MultiPolygon => "MultiPolygon",
            Self::Geometry => "Geometry",
        }
    }
}

/// Kind of a schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Number,
    Text,
    Geometry(GeometryKind),
}

impl FieldKind {
    /// Returns the label used in serialized records.
    ///
    /// Geometry columns serialize their normalized geometry label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "Number",
            Self::Text => "Text",
            Self::Geometry(kind) => kind.as_str(),
        }
    }

    #[must_use]
    pub fn is_geometry(&self) -> bool {
        matches!(self, Self::Geometry(_))
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One column of a dataset's attribute schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    /// Column identifier
    pub name: String,
    /// Column kind
    pub kind: FieldKind,
    /// Declared maximum width, absent for geometry fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

impl SchemaField {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind, length: Option<u32>) -> Self {
        Self {
            name: name.into(),
            kind,
            length,
        }
    }

    /// Creates the geometry field appended at the end of a schema.
    #[must_use]
    pub fn geometry(name: impl Into<String>, kind: GeometryKind) -> Self {
        Self::new(name, FieldKind::Geometry(kind), None)
    }
}

/// Normalizes a discovered column list into a schema.
///
/// Columns repeating an earlier `(name, kind)` pair are dropped, discovery
/// order is kept otherwise, and geometry fields are moved behind every
/// attribute field.
#[must_use]
pub fn normalize_schema(fields: Vec<SchemaField>) -> Vec<SchemaField> {
    let mut seen = HashSet::new();
    let (geometry, attributes): (Vec<_>, Vec<_>) = fields
        .into_iter()
        .filter(|field| seen.insert((field.name.clone(), field.kind)))
        .partition(|field| field.kind.is_geometry());

    attributes.into_iter().chain(geometry).collect()
}

/// Descriptive record for one processed file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRecord {
    /// File stem
    pub name: String,
    /// File name as seen by the dispatcher
    pub file_name: String,
    /// Dataset kind
    #[serde(rename = "type")]
    pub dataset_type: DatasetType,
    /// Whether a same-stem style file sits next to the dataset
    pub has_style_sidecar: bool,
    /// Attribute schema, geometry field last
    pub schema: Vec<SchemaField>,
    /// Feature payload, only present when requested and available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<FeatureCollection>,
}

/// Entry that was skipped because of a local failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEntry {
    /// File name of the skipped entry
    pub file_name: String,
    /// Why the entry was skipped
    pub reason: String,
}

/// Full outcome of a folder run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FolderReport {
    /// Records in processing order
    pub records: Vec<DatasetRecord>,
    /// Entries skipped because of local failures
    pub skipped: Vec<SkippedEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str, length: u32) -> SchemaField {
        SchemaField::new(name, FieldKind::Text, Some(length))
    }

    #[test]
    fn test_geometry_mapping() {
        assert_eq!(GeometryKind::from_type_name("Point"), GeometryKind::MultiPoint);
        assert_eq!(
            GeometryKind::from_type_name("LineString"),
            GeometryKind::MultiLineString
        );
        assert_eq!(
            GeometryKind::from_type_name("MultiPolygon"),
            GeometryKind::MultiPolygon
        );
        assert_eq!(GeometryKind::from_type_name("Tin"), GeometryKind::Geometry);
    }

    #[test]
    fn test_normalize_schema_drops_duplicates() {
        let fields = vec![
            text("NAME", 20),
            SchemaField::new("POP", FieldKind::Number, Some(10)),
            text("NAME", 40),
            SchemaField::new("NAME", FieldKind::Number, Some(5)),
        ];

        let schema = normalize_schema(fields);
        assert_eq!(schema.len(), 3);
        assert_eq!(schema[0], text("NAME", 20));
        assert_eq!(schema[1].name, "POP");
        assert_eq!(schema[2].kind, FieldKind::Number);
    }

    #[test]
    fn test_normalize_schema_moves_geometry_last() {
        let fields = vec![
            SchemaField::geometry("geom", GeometryKind::MultiPolygon),
            text("NAME", 20),
            SchemaField::new("AREA", FieldKind::Number, None),
        ];

        let schema = normalize_schema(fields);
        let names: Vec<_> = schema.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["NAME", "AREA", "geom"]);
    }

    #[test]
    fn test_record_serialization() {
        let record = DatasetRecord {
            name: "parcels".to_string(),
            file_name: "parcels.shp".to_string(),
            dataset_type: DatasetType::Vector,
            has_style_sidecar: false,
            schema: vec![
                text("NAME", 20),
                SchemaField::geometry("geometry", GeometryKind::MultiPolygon),
            ],
            geometry: None,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["fileName"], "parcels.shp");
        assert_eq!(value["type"], "Vector");
        assert_eq!(value["hasStyleSidecar"], false);
        assert_eq!(value["schema"][0]["kind"], "Text");
        assert_eq!(value["schema"][0]["length"], 20);
        assert_eq!(value["schema"][1]["kind"], "MultiPolygon");
        assert!(value["schema"][1].get("length").is_none());
        assert!(value.get("geometry").is_none());
    }
}
