//! Display utilities for formatting CLI output.
//!
//! This module provides table row structures and formatting functions
//! for presenting folder reports and the format registry.

use tabled::{Table, Tabled};

use geoingest_core::drivers::{ARCHIVE_EXTENSION, Driver, SIDECAR_EXTENSIONS};
use geoingest_core::types::{DatasetRecord, FolderReport, SkippedEntry};

/// Table row representation for one processed dataset.
#[derive(Tabled)]
pub struct RecordRow {
    /// Dataset stem.
    #[tabled(rename = "Name")]
    pub name: String,
    /// File the record was built from.
    #[tabled(rename = "File")]
    pub file_name: String,
    /// Dataset kind.
    #[tabled(rename = "Type")]
    pub dataset_type: String,
    /// Attribute schema as `name:kind` pairs.
    #[tabled(rename = "Schema")]
    pub schema: String,
    /// Number of features, or `-` when geometry was not read.
    #[tabled(rename = "Features")]
    pub features: String,
    /// Whether a style file sits next to the dataset.
    #[tabled(rename = "Style")]
    pub style: String,
}

impl From<&DatasetRecord> for RecordRow {
    fn from(record: &DatasetRecord) -> Self {
        let schema = record
            .schema
            .iter()
            .map(|f| match f.length {
                Some(length) => format!("{}:{}({length})", f.name, f.kind),
                None => format!("{}:{}", f.name, f.kind),
            })
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            name: record.name.clone(),
            file_name: record.file_name.clone(),
            dataset_type: record.dataset_type.to_string(),
            schema,
            features: record
                .geometry
                .as_ref()
                .map_or_else(|| "-".to_string(), |g| g.features.len().to_string()),
            style: if record.has_style_sidecar { "Yes" } else { "No" }.to_string(),
        }
    }
}

/// Table row representation for an entry that was left out.
#[derive(Tabled)]
pub struct SkippedRow {
    #[tabled(rename = "File")]
    pub file_name: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

impl From<&SkippedEntry> for SkippedRow {
    fn from(entry: &SkippedEntry) -> Self {
        Self {
            file_name: entry.file_name.clone(),
            reason: entry.reason.clone(),
        }
    }
}

/// Table row representation for displaying driver information.
#[derive(Tabled)]
pub struct DriverRow {
    /// Short identifier for the driver (e.g., `GPKG`).
    #[tabled(rename = "Short Name")]
    pub short_name: String,
    /// Full descriptive name of the driver format.
    #[tabled(rename = "Long Name")]
    pub long_name: String,
    /// Processor that handles the family.
    #[tabled(rename = "Type")]
    pub kind: String,
    /// Extensions opened directly.
    #[tabled(rename = "Primary")]
    pub primary: String,
    /// Extensions that travel with a primary file.
    #[tabled(rename = "Fragments")]
    pub fragments: String,
}

impl From<&Driver> for DriverRow {
    fn from(driver: &Driver) -> Self {
        Self {
            short_name: driver.short_name.to_string(),
            long_name: driver.long_name.to_string(),
            kind: driver.kind.to_string(),
            primary: driver.primary.join(", "),
            fragments: driver.fragments.join(", "),
        }
    }
}

/// Display a folder report as two tables: records, then skipped entries.
pub fn display_report(report: &FolderReport) {
    println!("\nProcessed {} dataset(s)", report.records.len());
    if !report.records.is_empty() {
        let rows: Vec<RecordRow> = report.records.iter().map(RecordRow::from).collect();
        println!("{}", Table::new(rows));
    }

    if !report.skipped.is_empty() {
        println!("\n=== Skipped ({}) ===", report.skipped.len());
        let rows: Vec<SkippedRow> = report.skipped.iter().map(SkippedRow::from).collect();
        println!("{}", Table::new(rows));
    }
}

/// Display the format registry.
pub fn display_drivers(drivers: &[Driver]) {
    println!("\nSupported Formats ({} total):\n", drivers.len());
    let rows: Vec<DriverRow> = drivers.iter().map(DriverRow::from).collect();
    println!("{}", Table::new(rows));
    println!("\nSidecars: {}", SIDECAR_EXTENSIONS.join(", "));
    println!("Archives: {ARCHIVE_EXTENSION}");
}
