//! Path and filesystem helpers shared by the pipeline stages.

use std::path::{Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

use crate::error::Result;

/// Returns the file name without its final extension.
///
/// # Examples
///
/// ```
/// use geoingest_core::utils::stem_of;
///
/// assert_eq!(stem_of("parcels.shp"), "parcels");
/// assert_eq!(stem_of("parcels.shp.xml"), "parcels.shp");
/// assert_eq!(stem_of("README"), "README");
/// ```
#[must_use]
pub fn stem_of(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(idx) => &file_name[..idx],
    }
}

/// Returns the final extension of `path`, lower-cased.
#[must_use]
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Returns the final path component as an owned string, lossily decoded.
#[must_use]
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Resolves `path` against the current directory without touching the filesystem.
///
/// # Errors
///
/// Returns an I/O error if the current directory cannot be determined.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// Lists the entries of `dir`, sorted by path.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read.
pub fn list_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs_err::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Lists the regular files directly inside `dir`, sorted by path.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read.
pub fn list_files_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_sorted(dir)?
        .into_iter()
        .filter(|path| path.is_file())
        .collect())
}

/// Lists the regular files under `dir` at any depth, sorted by path.
///
/// Unreadable entries are skipped.
#[must_use]
pub fn walk_files_sorted(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Removes a file or directory tree, logging instead of failing.
pub fn remove_best_effort(path: &Path) {
    let outcome = if path.is_dir() {
        fs_err::remove_dir_all(path)
    } else {
        fs_err::remove_file(path)
    };
    if let Err(e) = outcome {
        warn!("Could not remove {}: {e}", path.display());
    }
}

/// Runs blocking filesystem work off the async executor.
///
/// # Errors
///
/// Returns the closure's error, or an I/O task error if the worker panicked.
pub async fn run_blocking<F, T>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stem_of() {
        assert_eq!(stem_of("ortho.TIF"), "ortho");
        assert_eq!(stem_of(".hidden"), ".hidden");
        assert_eq!(stem_of("a.b.c"), "a.b");
    }

    #[test]
    fn test_extension_lower() {
        assert_eq!(extension_lower(Path::new("x/PARCELS.SHP")).as_deref(), Some("shp"));
        assert_eq!(extension_lower(Path::new("x/README")), None);
    }

    #[test]
    fn test_list_and_remove() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();
        std::fs::write(dir.path().join("c").join("inner.txt"), b"c").unwrap();

        let names: Vec<_> = list_sorted(dir.path())
            .unwrap()
            .iter()
            .map(|p| file_name_of(p))
            .collect();
        assert_eq!(names, ["a.txt", "b.txt", "c"]);
        assert_eq!(list_files_sorted(dir.path()).unwrap().len(), 2);

        let walked: Vec<_> = walk_files_sorted(dir.path())
            .iter()
            .map(|p| file_name_of(p))
            .collect();
        assert_eq!(walked, ["a.txt", "b.txt", "inner.txt"]);

        remove_best_effort(&dir.path().join("c"));
        remove_best_effort(&dir.path().join("missing.txt"));
        assert!(!dir.path().join("c").exists());
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let value = run_blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
    }
}
