//! GeoTIFF processor.
//!
//! Rasters are opaque: only the TIFF signature is checked and records carry
//! no schema and no features.

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use geojson::FeatureCollection;
use tempfile::TempDir;

use super::{FormatHandle, FormatProcessor};
use crate::archive::{expand_one, is_zip};
use crate::encoding::EncodingSetting;
use crate::error::{DispatchError, FormatError, ReadContextExt, Result};
use crate::types::{DatasetType, SchemaField};
use crate::utils::{extension_lower, file_name_of, run_blocking};

const FORMAT: &str = "GeoTIFF";

/// Classic and BigTIFF byte-order signatures.
static TIFF_SIGNATURES: &[[u8; 4]] = &[
    *b"II*\0",
    *b"MM\0*",
    *b"II+\0",
    *b"MM\0+",
];

/// Processor for `.tif`/`.tiff` files and raster archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterProcessor;

#[derive(Debug)]
pub struct RasterHandle {
    /// Scratch directory of an unpacked archive, removed on drop
    _scratch: Option<TempDir>,
}

#[async_trait]
impl FormatProcessor for RasterProcessor {
    type Handle = RasterHandle;

    async fn open(
        &self,
        path: &Path,
        _encoding: EncodingSetting,
    ) -> Result<FormatHandle<RasterHandle>> {
        let path = path.to_path_buf();
        run_blocking(move || {
            let (scratch, primary) = if is_zip(&path) {
                let scratch = TempDir::new()?;
                let primary = find_raster_member(&path, scratch.path())?;
                (Some(scratch), primary)
            } else {
                (None, path)
            };
            check_signature(&primary)?;

            Ok(FormatHandle {
                handle: RasterHandle { _scratch: scratch },
                primary,
            })
        })
        .await
    }

    async fn schema_fields(&self, _handle: &mut RasterHandle) -> Result<Vec<SchemaField>> {
        Ok(Vec::new())
    }

    async fn geographic_info(&self, _handle: &mut RasterHandle) -> Result<Option<FeatureCollection>> {
        Ok(None)
    }

    fn file_type(&self) -> DatasetType {
        DatasetType::Raster
    }

    fn should_repackage(&self) -> bool {
        false
    }
}

fn find_raster_member(archive: &Path, scratch: &Path) -> Result<PathBuf> {
    let mut members = expand_one(archive, scratch)?;
    members.sort();
    members
        .into_iter()
        .find(|member| matches!(extension_lower(member).as_deref(), Some("tif" | "tiff")))
        .ok_or_else(|| {
            DispatchError::MissingPrimary {
                file: file_name_of(archive),
                family: DatasetType::Raster.to_string(),
            }
            .into()
        })
}

fn check_signature(path: &Path) -> Result<()> {
    let mut magic = [0u8; 4];
    fs_err::File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .with_read_context(FORMAT, path)?;
    if TIFF_SIGNATURES.contains(&magic) {
        Ok(())
    } else {
        Err(FormatError::Invalid {
            format: FORMAT.to_string(),
            path: path.to_path_buf(),
            message: "missing TIFF byte-order signature".to_string(),
        }
        .into())
    }
}
