//! Format processors.
//!
//! A processor turns one dataset file into a [`DatasetRecord`]. Every
//! processor implements [`FormatProcessor`]; the shared [`process`] driver
//! calls its hooks in a fixed order and fills in the generic parts of the
//! record (name, style sidecar, schema normalization).

mod package;
mod raster;
mod vector;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use geojson::FeatureCollection;
use log::debug;
use serde_json::Value as JsonValue;

use crate::config::Config;
use crate::encoding::EncodingSetting;
use crate::error::Result;
use crate::types::{DatasetRecord, DatasetType, SchemaField, normalize_schema};
use crate::utils::{file_name_of, stem_of};

pub use package::PackageProcessor;
pub use raster::RasterProcessor;
pub use vector::VectorProcessor;

/// Extension of style sidecar files.
pub const STYLE_EXTENSION: &str = "sld";

/// Name given to geometry fields that have no column name of their own.
pub const GEOMETRY_FIELD: &str = "geometry";

/// An opened dataset.
#[derive(Debug)]
pub struct FormatHandle<H> {
    /// Processor-specific state
    pub handle: H,
    /// File the processor actually reads, used for sidecar lookup
    pub primary: PathBuf,
}

/// Hooks every format processor provides.
#[async_trait]
pub trait FormatProcessor: Send + Sync {
    /// Processor state kept between hooks.
    type Handle: Send;

    /// Opens the dataset at `path`.
    ///
    /// # Errors
    ///
    /// Returns a format error if the file is not a valid dataset.
    async fn open(
        &self,
        path: &Path,
        encoding: EncodingSetting,
    ) -> Result<FormatHandle<Self::Handle>>;

    /// Lists attribute and geometry columns in discovery order.
    ///
    /// # Errors
    ///
    /// Returns a format error if the schema cannot be read.
    async fn schema_fields(&self, handle: &mut Self::Handle) -> Result<Vec<SchemaField>>;

    /// Reads every feature of the dataset.
    ///
    /// # Errors
    ///
    /// Returns a format error if a feature cannot be decoded.
    async fn geographic_info(&self, handle: &mut Self::Handle) -> Result<Option<FeatureCollection>>;

    /// Dataset type reported in records.
    fn file_type(&self) -> DatasetType;

    /// Whether the output folder has to be regrouped after processing.
    fn should_repackage(&self) -> bool;
}

/// Runs `processor` over `path` and assembles the record.
///
/// # Errors
///
/// Propagates any error raised by the processor hooks.
pub async fn process<P: FormatProcessor>(
    processor: &P,
    path: &Path,
    config: &Config,
) -> Result<DatasetRecord> {
    let file_name = file_name_of(path);
    debug!("Processing {file_name} as {}", processor.file_type());

    let FormatHandle {
        mut handle,
        primary,
    } = processor.open(path, config.encoding).await?;

    let schema = normalize_schema(processor.schema_fields(&mut handle).await?);
    let geometry = if config.geographic_info {
        processor.geographic_info(&mut handle).await?
    } else {
        None
    };

    Ok(DatasetRecord {
        name: stem_of(&file_name).to_string(),
        has_style_sidecar: has_style_sidecar(&primary) || has_style_sidecar(path),
        file_name,
        dataset_type: processor.file_type(),
        schema,
        geometry,
    })
}

/// Whether a same-stem `.sld` file sits next to `path`.
#[must_use]
pub fn has_style_sidecar(path: &Path) -> bool {
    let file_name = file_name_of(path);
    let stem = stem_of(&file_name);
    let Some(dir) = path.parent() else {
        return false;
    };
    [
        STYLE_EXTENSION.to_string(),
        STYLE_EXTENSION.to_ascii_uppercase(),
    ]
    .iter()
    .any(|ext| dir.join(format!("{stem}.{ext}")).is_file())
}

/// Processor selected by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessorKind {
    Vector,
    Package,
    Raster,
}

impl ProcessorKind {
    /// Processes `path` with the processor of this kind.
    ///
    /// # Errors
    ///
    /// Propagates the processor's error.
    pub async fn process(self, path: &Path, config: &Config) -> Result<DatasetRecord> {
        match self {
            Self::Vector => process(&VectorProcessor, path, config).await,
            Self::Package => process(&PackageProcessor, path, config).await,
            Self::Raster => process(&RasterProcessor, path, config).await,
        }
    }

    #[must_use]
    pub fn dataset_type(self) -> DatasetType {
        match self {
            Self::Vector => VectorProcessor.file_type(),
            Self::Package => PackageProcessor.file_type(),
            Self::Raster => RasterProcessor.file_type(),
        }
    }

    #[must_use]
    pub fn should_repackage(self) -> bool {
        match self {
            Self::Vector => VectorProcessor.should_repackage(),
            Self::Package => PackageProcessor.should_repackage(),
            Self::Raster => RasterProcessor.should_repackage(),
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dataset_type().as_str())
    }
}

/// Converts a number to JSON, keeping whole values integral.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn number_value(value: f64) -> JsonValue {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return JsonValue::from(value as i64);
    }
    serde_json::Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_number_value() {
        assert_eq!(number_value(3.0), JsonValue::from(3));
        assert_eq!(number_value(2.5), JsonValue::from(2.5));
        assert_eq!(number_value(f64::NAN), JsonValue::Null);
    }

    #[test]
    fn test_has_style_sidecar() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("roads.shp"), b"").unwrap();
        std::fs::write(dir.path().join("roads.sld"), b"<sld/>").unwrap();
        std::fs::write(dir.path().join("rivers.shp"), b"").unwrap();

        assert!(has_style_sidecar(&dir.path().join("roads.shp")));
        assert!(!has_style_sidecar(&dir.path().join("rivers.shp")));
    }

    #[test]
    fn test_kind_metadata() {
        assert!(ProcessorKind::Vector.should_repackage());
        assert!(!ProcessorKind::Package.should_repackage());
        assert!(!ProcessorKind::Raster.should_repackage());
        assert_eq!(ProcessorKind::Package.to_string(), "Package");
    }
}
