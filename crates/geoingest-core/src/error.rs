//! Custom error types for `GeoIngest` operations.
//!
//! Errors are split by how far they reach. I/O, archive and configuration
//! errors abort the whole folder run. Dispatch and format errors are local to
//! one file: the orchestrator records them and moves on to the next entry.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for `GeoIngest` operations.
///
/// This is the root error type that encompasses all domain-specific errors.
/// It uses `#[error(transparent)]` to delegate display formatting to the
/// underlying error variants.
#[derive(Debug, Error)]
pub enum GeoIngestError {
    /// I/O errors (missing folders, read/write failures, permissions)
    #[error(transparent)]
    Io(#[from] IoError),

    /// Zip archive errors (corrupt or unreadable archives)
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The dispatcher refused a file (mixed or unsupported archive content)
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Format parsing errors raised by a processor
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic errors from dependencies
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// I/O related errors.
#[derive(Debug, Error)]
pub enum IoError {
    /// A filesystem call failed. `fs-err` already puts the path in the message.
    #[error("{0}")]
    Filesystem(#[from] std::io::Error),

    /// Folder or file was not found
    #[error("Path not found: '{path}'")]
    NotFound {
        /// The missing path
        path: PathBuf,
    },

    /// A directory was expected
    #[error("Not a directory: '{path}'")]
    NotADirectory {
        /// The offending path
        path: PathBuf,
    },

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {message}")]
    Task {
        /// Description from the join error
        message: String,
    },
}

/// Zip archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive could not be opened or one of its members could not be read
    #[error("Failed to read zip archive '{path}': {message}")]
    Read {
        /// The archive path
        path: PathBuf,
        /// Description from the zip codec
        message: String,
    },

    /// Writing a new archive failed
    #[error("Failed to write zip archive '{path}': {message}")]
    Write {
        /// The archive path
        path: PathBuf,
        /// Description from the zip codec
        message: String,
    },
}

/// Errors raised while deciding which processor owns a file.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Archive members belong to more than one format family
    #[error("Archive '{file}' mixes format families: {families}")]
    MixedContent {
        /// The archive file name
        file: String,
        /// Comma-separated family names found
        families: String,
    },

    /// Archive contains a member whose extension is not recognized
    #[error("Archive '{file}' contains unsupported member '{member}'")]
    UnsupportedMember {
        /// The archive file name
        file: String,
        /// The member that could not be classified
        member: String,
    },

    /// Archive holds no member the raster processor can open
    #[error("Archive '{file}' has no primary {family} member")]
    MissingPrimary {
        /// The archive file name
        file: String,
        /// The family that was expected
        family: String,
    },
}

/// Format parsing and validation errors.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Reading a dataset through its parser failed
    #[error("Failed to read {format} file '{path}': {source}")]
    Read {
        /// The format being read (e.g., "Shapefile", "GeoPackage")
        format: String,
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// File content did not match what the format requires
    #[error("Invalid {format} file '{path}': {message}")]
    Invalid {
        /// The format
        format: String,
        /// The file path
        path: PathBuf,
        /// Description of the problem
        message: String,
    },

    /// A required sibling file is absent (e.g., the `.dbf` next to a `.shp`)
    #[error("{format} dataset '{path}' is missing its '.{component}' file")]
    MissingComponent {
        /// The format
        format: String,
        /// The primary file path
        path: PathBuf,
        /// Extension of the missing component
        component: String,
    },

    /// Geometry could not be converted to `GeoJSON`
    #[error("Invalid geometry in {format}: {message}")]
    InvalidGeometry {
        /// The format
        format: String,
        /// Description of the geometry problem
        message: String,
    },
}

/// Configuration errors.
///
/// These errors occur when options or configuration are invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },

    /// Options conflict with each other
    #[error("Conflicting options: {options}")]
    ConflictingOptions {
        /// Description of the conflicting options
        options: String,
    },
}

/// Type alias for Results using `GeoIngestError`.
pub type Result<T> = std::result::Result<T, GeoIngestError>;

impl From<std::io::Error> for GeoIngestError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Filesystem(err))
    }
}

impl From<tokio::task::JoinError> for GeoIngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Io(IoError::Task {
            message: err.to_string(),
        })
    }
}

impl GeoIngestError {
    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Io(e) => format!("I/O error: {e}"),
            Self::Archive(e) => format!("Archive error: {e}"),
            Self::Dispatch(e) => format!("Unsupported content: {e}"),
            Self::Format(e) => e.user_message(),
            Self::Config(e) => format!("Configuration error: {e}"),
            Self::Other(e) => format!("Error: {e}"),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Io(IoError::NotFound { .. } | IoError::NotADirectory { .. }) => {
                Some("Check that the input path points to an existing folder.".to_string())
            },
            Self::Archive(_) => {
                Some("Re-create the zip archive; it may be truncated or corrupt.".to_string())
            },
            Self::Dispatch(DispatchError::MixedContent { .. }) => Some(
                "Split the archive so each zip holds a single dataset family.".to_string(),
            ),
            Self::Dispatch(DispatchError::UnsupportedMember { .. }) => {
                Some("Remove files that are not part of the dataset from the archive.".to_string())
            },
            Self::Format(FormatError::MissingComponent { component, .. }) => {
                Some(format!("Add the '.{component}' file next to the dataset."))
            },
            Self::Config(_) => Some("Run 'geoingest process --help' for valid options.".to_string()),
            _ => None,
        }
    }

    /// Whether the error only concerns the file being processed.
    ///
    /// Local errors are recorded and the folder run continues; every other
    /// error aborts the run.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Dispatch(_) | Self::Format(_))
    }
}

impl FormatError {
    fn user_message(&self) -> String {
        match self {
            Self::Read { format, path, .. } => {
                format!("Failed to read {} file: {}", format, path.display())
            },
            _ => self.to_string(),
        }
    }
}

/// Extension trait for adding read context to parser errors.
pub trait ReadContextExt<T> {
    /// Wrap the error as a [`FormatError::Read`] for `format` at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError::Read`] if the underlying operation fails.
    fn with_read_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T, E> ReadContextExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_read_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            GeoIngestError::Format(FormatError::Read {
                format: format.to_string(),
                path: path.into(),
                source: Box::new(e),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_errors_are_local() {
        let err = GeoIngestError::from(DispatchError::MixedContent {
            file: "mixed.zip".to_string(),
            families: "Vector, Raster".to_string(),
        });
        assert!(err.is_local());
        assert_eq!(
            err.to_string(),
            "Archive 'mixed.zip' mixes format families: Vector, Raster"
        );
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_io_errors_are_fatal() {
        let err = GeoIngestError::from(IoError::NotFound {
            path: PathBuf::from("/nope"),
        });
        assert!(!err.is_local());
        assert_eq!(err.to_string(), "Path not found: '/nope'");
    }

    #[test]
    fn test_read_context() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("bad header"));
        let err = res.with_read_context("Shapefile", "a.shp").unwrap_err();
        assert!(err.is_local());
        assert_eq!(err.to_string(), "Failed to read Shapefile file 'a.shp': bad header");
        assert_eq!(err.user_message(), "Failed to read Shapefile file: a.shp");
    }
}
