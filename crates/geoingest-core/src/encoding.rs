//! Text encoding detection for attribute tables.

use std::fmt;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Best-effort guess of the encoding of `bytes`.
///
/// Deterministic for a given input. Ambiguous byte sequences may be guessed
/// wrong; callers that know better pass a fixed label instead.
///
/// # Examples
///
/// ```
/// use geoingest_core::encoding::detect;
///
/// assert_eq!(detect("Zaragoza, Córdoba".as_bytes()).name(), "UTF-8");
/// ```
#[must_use]
pub fn detect(bytes: &[u8]) -> &'static Encoding {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

/// Resolves an encoding label, including bare Windows code page numbers.
///
/// Code page sidecars (`.cpg`) commonly hold values such as `1252` or
/// `UTF-8`; the former maps to `windows-1252`.
#[must_use]
pub fn for_label(label: &str) -> Option<&'static Encoding> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    if label.bytes().all(|b| b.is_ascii_digit()) {
        return Encoding::for_label(format!("windows-{label}").as_bytes())
            .or_else(|| Encoding::for_label(format!("cp{label}").as_bytes()));
    }
    Encoding::for_label(label.as_bytes())
}

/// How attribute text is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EncodingSetting {
    /// Sniff the encoding from the data
    #[default]
    Auto,
    /// Always use this encoding
    Fixed(&'static Encoding),
}

impl EncodingSetting {
    /// Parses `"auto"` or an encoding label.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for labels `encoding_rs` does not know.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        if value.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        for_label(value)
            .map(Self::Fixed)
            .ok_or_else(|| ConfigError::InvalidOption {
                option: "encoding".to_string(),
                message: format!("unknown encoding label '{value}'"),
            })
    }

    /// Returns the fixed encoding, or runs `sniff` in auto mode.
    pub fn resolve(self, sniff: impl FnOnce() -> &'static Encoding) -> &'static Encoding {
        match self {
            Self::Auto => sniff(),
            Self::Fixed(encoding) => encoding,
        }
    }
}

impl fmt::Display for EncodingSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Fixed(encoding) => f.write_str(encoding.name()),
        }
    }
}

impl TryFrom<String> for EncodingSetting {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EncodingSetting> for String {
    fn from(value: EncodingSetting) -> Self {
        value.to_string()
    }
}
