//! Output folder reconciliation.
//!
//! After processing, the fragments of each dataset are bundled back into one
//! `<stem>.zip` per stem. Style sidecars, archives, and the files of families
//! that are not repackaged stay as they are; everything else is removed.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::archive::write_archive;
use crate::drivers::{ARCHIVE_EXTENSION, EntryRole, get_drivers, role_of};
use crate::error::Result;
use crate::processors::STYLE_EXTENSION;
use crate::utils::{extension_lower, file_name_of, list_sorted, remove_best_effort, stem_of, walk_files_sorted};

/// Extensions kept whatever the family.
static ALWAYS_KEPT: &[&str] = &[STYLE_EXTENSION, ARCHIVE_EXTENSION];

/// Whether files with extension `ext` are never bundled.
///
/// Besides style files and archives, this covers every primary and fragment
/// extension of a family whose processor does not repackage, so a raster
/// keeps its world file next to it.
///
/// # Examples
///
/// ```
/// use geoingest_core::reconcile::is_kept_extension;
///
/// assert!(is_kept_extension("tif"));
/// assert!(is_kept_extension("tfw"));
/// assert!(is_kept_extension("gpkg"));
/// assert!(!is_kept_extension("dbf"));
/// ```
#[must_use]
pub fn is_kept_extension(ext: &str) -> bool {
    ALWAYS_KEPT.contains(&ext)
        || get_drivers().iter().any(|driver| {
            !driver.kind.should_repackage()
                && (driver.primary.contains(&ext) || driver.fragments.contains(&ext))
        })
}

fn is_kept(path: &Path) -> bool {
    let Some(ext) = extension_lower(path) else {
        return false;
    };
    if is_kept_extension(&ext) {
        return true;
    }
    // `ortho.tif.xml` stays with `ortho.tif`
    role_of(path) == Some(EntryRole::Sidecar)
        && extension_lower(Path::new(stem_of(&file_name_of(path))))
            .is_some_and(|inner| is_kept_extension(&inner))
}

/// Stem a file is bundled under: `parcels.shp.xml` belongs to `parcels`.
fn dataset_stem(name: &str) -> &str {
    let stem = stem_of(name);
    let describes_dataset_file = matches!(
        role_of(Path::new(stem)),
        Some(EntryRole::Primary(_) | EntryRole::Fragment(_))
    );
    if role_of(Path::new(name)) == Some(EntryRole::Sidecar) && describes_dataset_file {
        stem_of(stem)
    } else {
        stem
    }
}

/// Regroups the fragments in `output` into one archive per stem.
///
/// Returns the archives written, sorted by stem. Running it again on a
/// regrouped folder writes nothing.
///
/// # Errors
///
/// Returns an archive or I/O error if an archive cannot be written. Failing
/// deletions are logged and skipped.
pub fn regroup(output: &Path) -> Result<Vec<PathBuf>> {
    let files = walk_files_sorted(output);
    lift_kept_files(output, &files);

    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for file in files.into_iter().filter(|f| f.exists() && !is_kept(f)) {
        let name = file_name_of(&file);
        groups
            .entry(dataset_stem(&name).to_string())
            .or_default()
            .push(file);
    }

    let mut written = Vec::with_capacity(groups.len());
    for (stem, members) in groups {
        let members = unique_names(members);
        let archive = free_archive_path(output, &stem);
        write_archive(&archive, &members)?;
        info!("Bundled {} file(s) into {}", members.len(), archive.display());
        for member in &members {
            remove_best_effort(member);
        }
        written.push(archive);
    }

    sweep(output)?;
    Ok(written)
}

/// `<stem>.zip`, or the first free `<stem>_<n>.zip` when a kept archive holds the name.
fn free_archive_path(output: &Path, stem: &str) -> PathBuf {
    let preferred = output.join(format!("{stem}.{ARCHIVE_EXTENSION}"));
    if !preferred.exists() {
        return preferred;
    }
    let archive = (1u32..)
        .map(|n| output.join(format!("{stem}_{n}.{ARCHIVE_EXTENSION}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| preferred.clone());
    warn!(
        "{} is kept as is; bundling {stem} into {}",
        preferred.display(),
        archive.display()
    );
    archive
}

/// Moves kept files found in subdirectories up to `output` so the sweep spares them.
fn lift_kept_files(output: &Path, files: &[PathBuf]) {
    for file in files {
        if !is_kept(file) || file.parent() == Some(output) {
            continue;
        }
        let target = output.join(file_name_of(file));
        if target.exists() {
            warn!(
                "Not moving {} over existing {}",
                file.display(),
                target.display()
            );
            continue;
        }
        debug!("Moving {} to {}", file.display(), target.display());
        if let Err(e) = fs_err::rename(file, &target) {
            warn!("{e}");
        }
    }
}

/// Drops members whose file name repeats an earlier one; archives are flat.
fn unique_names(members: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    members
        .into_iter()
        .filter(|member| {
            let fresh = seen.insert(file_name_of(member));
            if !fresh {
                warn!("Leaving out duplicate {}", member.display());
            }
            fresh
        })
        .collect()
}

/// Removes everything at the top of `output` that is not kept.
fn sweep(output: &Path) -> Result<()> {
    for entry in list_sorted(output)? {
        if entry.is_dir() || !is_kept(&entry) {
            debug!("Removing {}", entry.display());
            remove_best_effort(&entry);
        }
    }
    Ok(())
}
