//! Folder ingestion pipeline.
//!
//! This module sequences the pipeline stages over one input folder: archive
//! expansion into the output folder, per-file dispatch and processing, and
//! the final regrouping of dataset fragments.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::archive::ExpanderBuilder;
use crate::config::Config;
use crate::drivers::{DispatchScreen, classify};
use crate::error::Result;
use crate::processors::ProcessorKind;
use crate::reconcile::regroup;
use crate::types::{DatasetRecord, FolderReport, SkippedEntry};
use crate::utils::{absolute_path, file_name_of, run_blocking, walk_files_sorted};

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Expanding,
    Processing,
    Reconciling,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Expanding => "EXPANDING",
            Self::Processing => "PROCESSING",
            Self::Reconciling => "RECONCILING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// One run of the ingestion pipeline over an input folder.
#[derive(Debug)]
pub struct FolderPipeline {
    input: PathBuf,
    output: PathBuf,
    config: Config,
    phase: Phase,
}

impl FolderPipeline {
    /// Resolves and validates the folders of a run.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the output folder would overwrite the
    /// input folder.
    pub fn new(input: &Path, config: Config) -> Result<Self> {
        config.validate(input)?;
        let input = absolute_path(input)?;
        let output = config.output_dir(&input)?;
        Ok(Self {
            input,
            output,
            config,
            phase: Phase::Pending,
        })
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn input_dir(&self) -> &Path {
        &self.input
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    /// Runs every phase and returns the report.
    ///
    /// The pipeline ends in [`Phase::Done`], or in [`Phase::Failed`] when an
    /// error aborts the run.
    ///
    /// # Errors
    ///
    /// Returns I/O, archive and configuration errors. Per-file dispatch and
    /// format errors are recorded in [`FolderReport::skipped`] instead.
    pub async fn run(&mut self) -> Result<FolderReport> {
        match self.run_phases().await {
            Ok(report) => {
                self.enter(Phase::Done);
                info!(
                    "Produced {} record(s), skipped {} entries",
                    report.records.len(),
                    report.skipped.len()
                );
                Ok(report)
            },
            Err(e) => {
                warn!("Run aborted: {e}");
                self.enter(Phase::Failed);
                Err(e)
            },
        }
    }

    fn enter(&mut self, phase: Phase) {
        info!("Phase {} -> {phase}", self.phase);
        self.phase = phase;
    }

    async fn run_phases(&mut self) -> Result<FolderReport> {
        self.enter(Phase::Expanding);
        let input = self.input.clone();
        let output = self.output.clone();
        let outcome = run_blocking(move || {
            ExpanderBuilder::new()
                .with_screen(DispatchScreen)
                .build()
                .expand(&input, &output)
        })
        .await?;

        let mut report = FolderReport {
            records: Vec::new(),
            skipped: outcome.withheld,
        };

        self.enter(Phase::Processing);
        let output = self.output.clone();
        let files = run_blocking(move || Ok(walk_files_sorted(&output))).await?;

        let mut repackage = false;
        for file in files {
            match self.process_entry(&file).await {
                Ok(Some((kind, record))) => {
                    repackage |= kind.should_repackage();
                    report.records.push(record);
                },
                Ok(None) => debug!("Ignoring {}", file.display()),
                Err(e) if e.is_local() => {
                    warn!("Skipping {}: {e}", file.display());
                    report.skipped.push(SkippedEntry {
                        file_name: file_name_of(&file),
                        reason: e.to_string(),
                    });
                },
                Err(e) => return Err(e),
            }
        }

        if repackage {
            self.enter(Phase::Reconciling);
            let output = self.output.clone();
            let written = run_blocking(move || regroup(&output)).await?;
            debug!("Wrote {} archive(s)", written.len());
        }

        Ok(report)
    }

    async fn process_entry(&self, file: &Path) -> Result<Option<(ProcessorKind, DatasetRecord)>> {
        let path = file.to_path_buf();
        let Some(kind) = run_blocking(move || classify(&path)).await? else {
            return Ok(None);
        };
        info!("Processing {} with the {kind} processor", file.display());
        let record = kind.process(file, &self.config).await?;
        Ok(Some((kind, record)))
    }
}

/// Runs the pipeline over `input` and returns the full report.
///
/// # Errors
///
/// See [`FolderPipeline::run`].
pub async fn run(input: &Path, config: &Config) -> Result<FolderReport> {
    FolderPipeline::new(input, config.clone())?.run().await
}

/// Runs the pipeline over `input` and returns one record per processed file.
///
/// # Errors
///
/// See [`FolderPipeline::run`].
pub async fn process_folder(input: &Path, config: &Config) -> Result<Vec<DatasetRecord>> {
    Ok(run(input, config).await?.records)
}
