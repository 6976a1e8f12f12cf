//! `geoingest-core` is the core library for the `GeoIngest` project: it turns a folder of
//! geospatial datasets into descriptive records and leaves one archive per dataset behind.
//!
//! This crate includes:
//! - **Archive Expander** (`archive`): fixed-point unpacking of nested zip archives.
//! - **Driver Registry** (`drivers`): the static extension table and the format dispatcher.
//! - **Format Processors** (`processors`): Shapefile, GeoPackage and GeoTIFF readers.
//! - **Output Reconciler** (`reconcile`): regrouping of dataset fragments into archives.
//! - **Folder Pipeline** (`operations`): the phases of a run, from expansion to regrouping.
//!
//! # Examples
//!
//! ```no_run
//! use std::path::Path;
//! use geoingest_core::config::Config;
//! use geoingest_core::operations::process_folder;
//!
//! # async fn example() -> geoingest_core::error::Result<()> {
//! let config = Config {
//!     geographic_info: false,
//!     ..Config::default()
//! };
//! for record in process_folder(Path::new("data"), &config).await? {
//!     println!("{} ({}): {} field(s)", record.name, record.dataset_type, record.schema.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod drivers;
pub mod encoding;
pub mod error;
pub mod operations;
pub mod processors;
pub mod reconcile;
pub mod types;
pub mod utils;
