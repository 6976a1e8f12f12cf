//! Driver registry and format dispatch.
//!
//! Every supported dataset family is described by a static [`Driver`] entry
//! listing the extensions it owns. The dispatcher looks files up in this
//! registry to decide which processor handles them. Zip archives are peeked
//! into a scratch directory and classified by their members.
//!
//! # Examples
//!
//! ```
//! use std::path::Path;
//! use geoingest_core::drivers::{EntryRole, find_driver, role_of};
//! use geoingest_core::processors::ProcessorKind;
//!
//! let shapefile = find_driver("esri shapefile").expect("Shapefile driver should exist");
//! assert_eq!(shapefile.kind, ProcessorKind::Vector);
//!
//! assert_eq!(role_of(Path::new("roads.DBF")), Some(EntryRole::Fragment(ProcessorKind::Vector)));
//! assert_eq!(role_of(Path::new("notes.txt")), None);
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use log::debug;

use crate::archive::{ArchiveScreen, Screening, expand_one};
use crate::error::{DispatchError, GeoIngestError, Result};
use crate::processors::ProcessorKind;
use crate::utils::{extension_lower, file_name_of};

/// Dataset format driver definition.
#[derive(Debug, Clone, Copy)]
pub struct Driver {
    /// Short name used in the CLI (e.g., `"GPKG"`)
    pub short_name: &'static str,
    /// Long descriptive name for display purposes
    pub long_name: &'static str,
    /// Processor that handles the family
    pub kind: ProcessorKind,
    /// Extensions of files a processor opens directly
    pub primary: &'static [&'static str],
    /// Extensions of files that only travel with a primary file
    pub fragments: &'static [&'static str],
}

static DRIVERS: &[Driver] = &[
    Driver {
        short_name: "ESRI Shapefile",
        long_name: "ESRI Shapefile / DBF",
        kind: ProcessorKind::Vector,
        primary: &["shp"],
        fragments: &[
            "shx", "dbf", "prj", "cpg", "sbn", "sbx", "qix", "fix", "qpj",
        ],
    },
    Driver {
        short_name: "GPKG",
        long_name: "GeoPackage vector",
        kind: ProcessorKind::Package,
        primary: &["gpkg"],
        fragments: &[],
    },
    Driver {
        short_name: "GTiff",
        long_name: "GeoTIFF raster",
        kind: ProcessorKind::Raster,
        primary: &["tif", "tiff"],
        fragments: &["tfw", "tifw", "ovr"],
    },
];

/// Style and metadata files that may accompany any family.
pub static SIDECAR_EXTENSIONS: &[&str] = &["sld", "xml"];

/// Archive extension.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Role of a file according to its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRole {
    /// Opened directly by the family's processor
    Primary(ProcessorKind),
    /// Belongs to a dataset of the family but is never opened on its own
    Fragment(ProcessorKind),
    /// Style or metadata file, family-neutral
    Sidecar,
    /// Zip archive
    Archive,
}

/// What a peeked archive holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveContent {
    /// Members belong to a single family
    Family(ProcessorKind),
    /// Only nested archives and sidecars, or nothing at all
    Container,
}

/// Returns every driver in the registry.
#[must_use]
pub fn get_drivers() -> &'static [Driver] {
    DRIVERS
}

/// Finds a driver by short name, ignoring case.
#[must_use]
pub fn find_driver(name: &str) -> Option<&'static Driver> {
    DRIVERS
        .iter()
        .find(|driver| driver.short_name.eq_ignore_ascii_case(name))
}

/// Looks up the role of `path` in the extension table.
#[must_use]
pub fn role_of(path: &Path) -> Option<EntryRole> {
    let ext = extension_lower(path)?;
    if ext == ARCHIVE_EXTENSION {
        return Some(EntryRole::Archive);
    }
    if SIDECAR_EXTENSIONS.contains(&ext.as_str()) {
        return Some(EntryRole::Sidecar);
    }
    DRIVERS.iter().find_map(|driver| {
        if driver.primary.contains(&ext.as_str()) {
            Some(EntryRole::Primary(driver.kind))
        } else if driver.fragments.contains(&ext.as_str()) {
            Some(EntryRole::Fragment(driver.kind))
        } else {
            None
        }
    })
}

/// Selects the processor for `path`.
///
/// Files with a primary extension map to their family's processor. An archive
/// maps to the raster processor when it holds a raster dataset; any other
/// archive, and every other file, yields `None`.
///
/// # Errors
///
/// Returns a [`DispatchError`] for archives with mixed or unsupported members,
/// and an archive error if the archive cannot be read.
pub fn classify(path: &Path) -> Result<Option<ProcessorKind>> {
    match role_of(path) {
        Some(EntryRole::Primary(kind)) => Ok(Some(kind)),
        Some(EntryRole::Archive) => match classify_archive(path)? {
            ArchiveContent::Family(ProcessorKind::Raster) => Ok(Some(ProcessorKind::Raster)),
            ArchiveContent::Family(_) | ArchiveContent::Container => Ok(None),
        },
        Some(EntryRole::Fragment(_) | EntryRole::Sidecar) | None => Ok(None),
    }
}

/// Peeks into an archive and reports which family its members belong to.
///
/// # Errors
///
/// Returns [`DispatchError::MixedContent`] when members span families,
/// [`DispatchError::UnsupportedMember`] for a member with an unknown
/// extension, and an archive error if the archive cannot be read.
pub fn classify_archive(path: &Path) -> Result<ArchiveContent> {
    let scratch = tempfile::TempDir::new()?;
    let members = expand_one(path, scratch.path())?;
    let file = file_name_of(path);

    let mut families = BTreeSet::new();
    for member in &members {
        match role_of(member) {
            Some(EntryRole::Primary(kind) | EntryRole::Fragment(kind)) => {
                families.insert(kind);
            },
            Some(EntryRole::Sidecar | EntryRole::Archive) => {},
            None => {
                let member = member
                    .strip_prefix(scratch.path())
                    .unwrap_or(member)
                    .to_string_lossy()
                    .into_owned();
                return Err(DispatchError::UnsupportedMember { file, member }.into());
            },
        }
    }

    let mut iter = families.iter();
    match (iter.next(), iter.next()) {
        (None, _) => {
            debug!("{file} is a container archive");
            Ok(ArchiveContent::Container)
        },
        (Some(kind), None) => {
            debug!("{file} holds a {kind} dataset");
            Ok(ArchiveContent::Family(*kind))
        },
        _ => {
            let families = families
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            Err(DispatchError::MixedContent { file, families }.into())
        },
    }
}

/// Archive screen backed by the dispatcher.
///
/// Raster archives are kept whole, archives the dispatcher refuses are
/// withheld, and every other archive is expanded.
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchScreen;

impl ArchiveScreen for DispatchScreen {
    fn screen(&self, archive: &Path) -> Result<Screening> {
        match classify_archive(archive) {
            Ok(ArchiveContent::Family(ProcessorKind::Raster)) => Ok(Screening::KeepVerbatim),
            Ok(_) => Ok(Screening::Expand),
            Err(GeoIngestError::Dispatch(reason)) => Ok(Screening::Withhold(reason)),
            Err(e) => Err(e),
        }
    }
}
