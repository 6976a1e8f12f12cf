//! Zip archive expansion and bundling.
//!
//! The [`Expander`] unpacks every archive found at the top level of a source
//! folder into an output folder, then keeps unpacking archives revealed in the
//! output folder until none are left. The source folder is never written to;
//! anything that shows up there during a run is swept away afterwards.

use std::collections::{BTreeSet, HashSet};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ArchiveError, DispatchError, IoError, Result};
use crate::types::SkippedEntry;
use crate::utils::{extension_lower, file_name_of, list_files_sorted, list_sorted, remove_best_effort};

/// Decision taken for one archive before it is expanded.
#[derive(Debug)]
pub enum Screening {
    /// Unpack the archive into the output folder
    Expand,
    /// Copy the archive into the output folder as is
    KeepVerbatim,
    /// Leave the archive out of the output folder entirely
    Withhold(DispatchError),
}

/// Decides what happens to each archive met during expansion.
pub trait ArchiveScreen {
    /// Screens the archive at `archive`.
    ///
    /// # Errors
    ///
    /// Errors abort the expansion; use [`Screening::Withhold`] to refuse a
    /// single archive instead.
    fn screen(&self, archive: &Path) -> Result<Screening>;
}

/// Screen that expands every archive.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpandAll;

impl ArchiveScreen for ExpandAll {
    fn screen(&self, _archive: &Path) -> Result<Screening> {
        Ok(Screening::Expand)
    }
}

/// Bookkeeping for one expansion run.
#[derive(Debug, Default)]
pub struct ExtractionState {
    /// Archive file names already handled
    handled: HashSet<String>,
    /// Entry names present in the source folder before the run
    snapshot: BTreeSet<String>,
}

impl ExtractionState {
    fn capture(source: &Path) -> Result<Self> {
        let snapshot = list_sorted(source)?
            .iter()
            .map(|path| file_name_of(path))
            .collect();
        Ok(Self {
            handled: HashSet::new(),
            snapshot,
        })
    }

    /// Marks `name` as handled, returning false if it already was.
    fn claim(&mut self, name: &str) -> bool {
        self.handled.insert(name.to_string())
    }
}

/// Archives refused by the screen during an expansion run.
#[derive(Debug, Default)]
pub struct ExpansionOutcome {
    /// One entry per withheld archive
    pub withheld: Vec<SkippedEntry>,
}

/// Builder for configuring an [`Expander`].
pub struct ExpanderBuilder<S: ArchiveScreen = ExpandAll> {
    screen: S,
}

impl ExpanderBuilder<ExpandAll> {
    /// Creates a builder whose expander unpacks every archive.
    #[must_use]
    pub fn new() -> Self {
        Self { screen: ExpandAll }
    }
}

impl Default for ExpanderBuilder<ExpandAll> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ArchiveScreen> ExpanderBuilder<S> {
    /// Sets the screen consulted before each archive is expanded.
    #[must_use]
    pub fn with_screen<T: ArchiveScreen>(self, screen: T) -> ExpanderBuilder<T> {
        ExpanderBuilder { screen }
    }

    /// Builds the expander.
    #[must_use]
    pub fn build(self) -> Expander<S> {
        Expander {
            screen: self.screen,
        }
    }
}

/// Fixed-point archive expander.
pub struct Expander<S: ArchiveScreen = ExpandAll> {
    screen: S,
}

impl<S: ArchiveScreen> Expander<S> {
    /// Expands the archives of `source` into `output`.
    ///
    /// `output` is created, or emptied if it already holds entries. Once no
    /// unhandled archive remains, the loose top-level files of `source` are
    /// copied alongside the extracted content.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `source` is missing or a copy fails, and an
    /// archive error if an archive cannot be read. Files extracted before the
    /// failure are left in place.
    pub fn expand(&self, source: &Path, output: &Path) -> Result<ExpansionOutcome> {
        if !source.exists() {
            return Err(IoError::NotFound {
                path: source.to_path_buf(),
            }
            .into());
        }
        if !source.is_dir() {
            return Err(IoError::NotADirectory {
                path: source.to_path_buf(),
            }
            .into());
        }

        prepare_output(output)?;
        let mut state = ExtractionState::capture(source)?;
        let result = self.expand_with_state(source, output, &mut state);
        restore_source(source, &state.snapshot, output);
        result
    }

    fn expand_with_state(
        &self,
        source: &Path,
        output: &Path,
        state: &mut ExtractionState,
    ) -> Result<ExpansionOutcome> {
        let mut outcome = ExpansionOutcome::default();

        loop {
            let pending = pending_archives(source, output, state)?;
            if pending.is_empty() {
                break;
            }
            for archive in pending {
                let name = file_name_of(&archive);
                if !state.claim(&name) {
                    continue;
                }
                let revealed = archive.starts_with(output);

                match self.screen.screen(&archive)? {
                    Screening::Expand => {
                        info!("Expanding {}", archive.display());
                        let extracted = expand_one(&archive, output)?;
                        debug!("Extracted {} file(s) from {name}", extracted.len());
                        if revealed {
                            remove_best_effort(&archive);
                        }
                    },
                    Screening::KeepVerbatim => {
                        debug!("Keeping {name} unexpanded");
                        if !revealed {
                            fs_err::copy(&archive, output.join(&name))?;
                        }
                    },
                    Screening::Withhold(reason) => {
                        warn!("Skipping archive {name}: {reason}");
                        if revealed {
                            remove_best_effort(&archive);
                        }
                        outcome.withheld.push(SkippedEntry {
                            file_name: name,
                            reason: reason.to_string(),
                        });
                    },
                }
            }
        }

        for file in list_files_sorted(source)? {
            if is_zip(&file) {
                continue;
            }
            let target = output.join(file_name_of(&file));
            debug!("Copying {} to {}", file.display(), target.display());
            fs_err::copy(&file, &target)?;
        }

        Ok(outcome)
    }
}

/// Expands the archives of `source` into `output`, unpacking all of them.
///
/// # Errors
///
/// See [`Expander::expand`].
pub fn expand(source: &Path, output: &Path) -> Result<()> {
    ExpanderBuilder::new().build().expand(source, output)?;
    Ok(())
}

/// Extracts one archive into `output`, recreating its directory structure.
///
/// `output` is created if absent and never cleared. Members whose path would
/// escape `output` are skipped.
///
/// # Errors
///
/// Returns an archive error if the archive cannot be opened or a member
/// cannot be decoded, and an I/O error if writing fails.
pub fn expand_one(archive_path: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    fs_err::create_dir_all(output)?;
    let file = fs_err::File::open(archive_path)?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| read_error(archive_path, &e))?;

    let mut extracted = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| read_error(archive_path, &e))?;

        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                warn!(
                    "Skipping member '{}' of {}: path escapes the destination",
                    entry.name(),
                    archive_path.display()
                );
                continue;
            },
        };

        let target = output.join(&relative);
        if entry.is_dir() {
            fs_err::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let mut out = fs_err::File::create(&target)?;
        io::copy(&mut entry, &mut out).map_err(|e| read_error(archive_path, &e))?;
        extracted.push(target);
    }

    Ok(extracted)
}

/// Writes `files` into a new deflate archive at `archive_path`, flat by file name.
///
/// # Errors
///
/// Returns an archive error if the archive cannot be written, and an I/O
/// error if a member cannot be read.
pub fn write_archive(archive_path: &Path, files: &[PathBuf]) -> Result<()> {
    let file = fs_err::File::create(archive_path)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        writer
            .start_file(file_name_of(path), options)
            .map_err(|e| write_error(archive_path, &e))?;
        let mut input = fs_err::File::open(path)?;
        io::copy(&mut input, &mut writer)?;
    }
    writer.finish().map_err(|e| write_error(archive_path, &e))?;

    Ok(())
}

/// Removes entries of `source` that were not in `snapshot`.
///
/// `protect` is never removed, so an output folder nested in the source
/// survives the sweep.
pub fn restore_source(source: &Path, snapshot: &BTreeSet<String>, protect: &Path) {
    let entries = match list_sorted(source) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not list {} for restore: {e}", source.display());
            return;
        },
    };
    for entry in entries {
        if entry == protect || snapshot.contains(&file_name_of(&entry)) {
            continue;
        }
        warn!("Removing unexpected entry {} from source folder", entry.display());
        remove_best_effort(&entry);
    }
}

fn prepare_output(output: &Path) -> Result<()> {
    if output.is_dir() {
        for entry in list_sorted(output)? {
            if entry.is_dir() {
                fs_err::remove_dir_all(&entry)?;
            } else {
                fs_err::remove_file(&entry)?;
            }
        }
    } else {
        fs_err::create_dir_all(output)?;
    }
    Ok(())
}

fn pending_archives(source: &Path, output: &Path, state: &ExtractionState) -> Result<Vec<PathBuf>> {
    let mut pending = Vec::new();
    for dir in [source, output] {
        pending.extend(
            list_files_sorted(dir)?
                .into_iter()
                .filter(|path| is_zip(path) && !state.handled.contains(&file_name_of(path))),
        );
    }
    Ok(pending)
}

pub(crate) fn is_zip(path: &Path) -> bool {
    extension_lower(path).as_deref() == Some("zip")
}

fn read_error(path: &Path, err: &dyn std::fmt::Display) -> ArchiveError {
    ArchiveError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn write_error(path: &Path, err: &dyn std::fmt::Display) -> ArchiveError {
    ArchiveError::Write {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn make_zip(path: &Path, members: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, content) in members {
            writer.start_file(name.to_string(), options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    fn names(dir: &Path) -> Vec<String> {
        list_sorted(dir).unwrap().iter().map(|p| file_name_of(p)).collect()
    }

    #[test]
    fn test_expand_one_keeps_structure() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("data.zip");
        make_zip(&zip_path, &[("a.txt", b"a"), ("nested/b.txt", b"b")]);

        let out = dir.path().join("out");
        let extracted = expand_one(&zip_path, &out).unwrap();
        assert_eq!(extracted.len(), 2);
        assert_eq!(std::fs::read(out.join("nested").join("b.txt")).unwrap(), b"b");
    }

    #[test]
    fn test_expand_one_skips_escaping_members() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("evil.zip");
        make_zip(&zip_path, &[("../escape.txt", b"x"), ("ok.txt", b"y")]);

        let out = dir.path().join("out");
        let extracted = expand_one(&zip_path, &out).unwrap();
        assert_eq!(extracted, vec![out.join("ok.txt")]);
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_expand_nested_archives() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in");
        std::fs::create_dir(&source).unwrap();

        let inner = dir.path().join("inner.zip");
        make_zip(&inner, &[("deep.txt", b"deep")]);
        let inner_bytes = std::fs::read(&inner).unwrap();
        make_zip(
            &source.join("outer.zip"),
            &[("inner.zip", &inner_bytes), ("top.txt", b"top")],
        );
        std::fs::write(source.join("notes.txt"), b"notes").unwrap();

        let output = dir.path().join("out");
        expand(&source, &output).unwrap();

        assert_eq!(names(&output), ["deep.txt", "notes.txt", "top.txt"]);
        assert_eq!(names(&source), ["notes.txt", "outer.zip"]);
    }

    #[test]
    fn test_expand_clears_output() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::create_dir(&source).unwrap();
        std::fs::create_dir(&output).unwrap();
        std::fs::write(output.join("stale.txt"), b"old").unwrap();

        expand(&source, &output).unwrap();
        assert!(names(&output).is_empty());
    }

    #[test]
    fn test_expand_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = expand(&dir.path().join("nope"), &dir.path().join("out")).unwrap_err();
        assert!(err.to_string().contains("Path not found"));
    }

    #[test]
    fn test_corrupt_archive_is_an_archive_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in");
        std::fs::create_dir(&source).unwrap();
        std::fs::write(source.join("broken.zip"), b"not a zip").unwrap();

        let err = expand(&source, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, crate::error::GeoIngestError::Archive(_)));
        assert_eq!(names(&source), ["broken.zip"]);
    }

    struct Screen;

    impl ArchiveScreen for Screen {
        fn screen(&self, archive: &Path) -> Result<Screening> {
            Ok(match file_name_of(archive).as_str() {
                "keep.zip" => Screening::KeepVerbatim,
                "bad.zip" => Screening::Withhold(DispatchError::UnsupportedMember {
                    file: "bad.zip".to_string(),
                    member: "x.exe".to_string(),
                }),
                _ => Screening::Expand,
            })
        }
    }

    #[test]
    fn test_screen_decisions() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in");
        std::fs::create_dir(&source).unwrap();
        make_zip(&source.join("keep.zip"), &[("k.txt", b"k")]);
        make_zip(&source.join("bad.zip"), &[("x.exe", b"x")]);
        make_zip(&source.join("open.zip"), &[("o.txt", b"o")]);

        let output = dir.path().join("out");
        let outcome = ExpanderBuilder::new()
            .with_screen(Screen)
            .build()
            .expand(&source, &output)
            .unwrap();

        assert_eq!(names(&output), ["keep.zip", "o.txt"]);
        assert_eq!(outcome.withheld.len(), 1);
        assert_eq!(outcome.withheld[0].file_name, "bad.zip");
    }

    #[test]
    fn test_restore_source_removes_strays() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"k").unwrap();
        let snapshot = BTreeSet::from(["keep.txt".to_string()]);
        std::fs::write(dir.path().join("stray.txt"), b"s").unwrap();
        std::fs::create_dir(dir.path().join("output")).unwrap();

        restore_source(dir.path(), &snapshot, &dir.path().join("output"));
        assert_eq!(names(dir.path()), ["keep.txt", "output"]);
    }

    #[test]
    fn test_write_archive_flat() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("a.shp"), b"shp").unwrap();
        std::fs::write(dir.path().join("a.dbf"), b"dbf").unwrap();

        let zip_path = dir.path().join("a.zip");
        write_archive(&zip_path, &[sub.join("a.shp"), dir.path().join("a.dbf")]).unwrap();

        let out = dir.path().join("check");
        let extracted = expand_one(&zip_path, &out).unwrap();
        assert_eq!(extracted, vec![out.join("a.shp"), out.join("a.dbf")]);
        assert_eq!(std::fs::read(out.join("a.shp")).unwrap(), b"shp");
    }
}
