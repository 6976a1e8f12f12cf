//! Pipeline configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::encoding::EncodingSetting;
use crate::error::{ConfigError, Result};
use crate::utils::absolute_path;

/// Name of the output folder created inside the input folder by default.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Options recognized by [`crate::operations::process_folder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Attribute text encoding, `"auto"` by default
    pub encoding: EncodingSetting,
    /// Whether records carry their feature payload
    pub geographic_info: bool,
    /// Output folder, `<input>/output` when unset
    pub output_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encoding: EncodingSetting::Auto,
            geographic_info: true,
            output_path: None,
        }
    }
}

impl Config {
    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] when the document is malformed
    /// or names an unknown encoding.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoingest_core::config::Config;
    ///
    /// let config = Config::from_json(r#"{"encoding": "latin1", "geographicInfo": false}"#)?;
    /// assert!(!config.geographic_info);
    /// assert_eq!(config.encoding.to_string(), "windows-1252");
    /// # Ok::<(), geoingest_core::error::GeoIngestError>(())
    /// ```
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            ConfigError::InvalidOption {
                option: "config".to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a configuration
    /// error if it does not parse.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs_err::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Resolves the absolute output folder for `input`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the current directory cannot be determined.
    pub fn output_dir(&self, input: &Path) -> Result<PathBuf> {
        match &self.output_path {
            Some(path) => absolute_path(path),
            None => Ok(absolute_path(input)?.join(DEFAULT_OUTPUT_DIR)),
        }
    }

    /// Checks that `input` and the output folder can be owned safely.
    ///
    /// The output folder is cleared at the start of every run, so it may not
    /// be the input folder or one of its ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConflictingOptions`] on overlap.
    pub fn validate(&self, input: &Path) -> Result<()> {
        let input = absolute_path(input)?;
        let output = self.output_dir(&input)?;
        if input.starts_with(&output) {
            return Err(ConfigError::ConflictingOptions {
                options: format!(
                    "output folder '{}' would overwrite input folder '{}'",
                    output.display(),
                    input.display()
                ),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.encoding, EncodingSetting::Auto);
        assert!(config.geographic_info);
        assert!(config.output_path.is_none());

        let parsed = Config::from_json("{}").unwrap();
        assert!(parsed.geographic_info);
    }

    #[test]
    fn test_rejects_unknown_encoding() {
        let err = Config::from_json(r#"{"encoding": "martian"}"#).unwrap_err();
        assert!(err.to_string().contains("martian"));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(Config::from_json(r#"{"records": false}"#).is_err());
    }

    #[test]
    fn test_default_output_dir() {
        let config = Config::default();
        let output = config.output_dir(Path::new("/data/in")).unwrap();
        assert_eq!(output, PathBuf::from("/data/in/output"));
    }

    #[test]
    fn test_validate_overlap() {
        let config = Config {
            output_path: Some(PathBuf::from("/data")),
            ..Config::default()
        };
        assert!(config.validate(Path::new("/data/in")).is_err());
        assert!(config.validate(Path::new("/data")).is_err());

        let config = Config {
            output_path: Some(PathBuf::from("/out")),
            ..Config::default()
        };
        assert!(config.validate(Path::new("/data/in")).is_ok());
        assert!(Config::default().validate(Path::new("/data/in")).is_ok());
    }
}
