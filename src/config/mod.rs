//! Optional user config file.
//!
//! ```toml
//! page-size = "4KiB"   # or an integer byte count
//! threads = 8
//! single-table = false
//! legacy-format = false
//! ```
//!
//! Command-line flags override every key.

mod path;

pub use path::{config_path_from, get_config_path};

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::UsageError;
use crate::path::format_path_for_display;
use crate::utils::parse_size;

/// Page size used when neither the flag nor the config file sets one.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// A size given either as a byte count or a size string like `"2MiB"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    pub fn to_bytes(&self) -> Result<u64, UsageError> {
        match self {
            SizeValue::Bytes(bytes) => Ok(*bytes),
            SizeValue::Text(text) => parse_size(text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConverterConfig {
    pub page_size: Option<SizeValue>,
    pub threads: Option<usize>,
    pub single_table: Option<bool>,
    pub legacy_format: Option<bool>,
}

impl ConverterConfig {
    /// Load the config at `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            log::debug!(
                "No config at {}, using defaults",
                format_path_for_display(path)
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).with_context(|| {
            format!("Failed to read config file {}", format_path_for_display(path))
        })?;
        let config = Self::parse(&content).with_context(|| {
            format!("Failed to parse config file {}", format_path_for_display(path))
        })?;
        log::debug!("Loaded config from {}", format_path_for_display(path));
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Page size in bytes, validated.
    pub fn page_size(&self) -> Result<Option<u64>, UsageError> {
        self.page_size.as_ref().map(SizeValue::to_bytes).transpose()
    }
}

/// Validate a page size from any source.
pub fn validate_page_size(bytes: u64) -> Result<u64, UsageError> {
    if bytes == 0 || !bytes.is_power_of_two() {
        return Err(UsageError(format!(
            "page size must be a non-zero power of two, got {bytes}"
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_key() {
        let config = ConverterConfig::parse(
            r#"
page-size = "2MiB"
threads = 4
single-table = true
legacy-format = false
"#,
        )
        .unwrap();

        assert_eq!(config.page_size().unwrap(), Some(2 * 1024 * 1024));
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.single_table, Some(true));
        assert_eq!(config.legacy_format, Some(false));
    }

    #[test]
    fn integer_page_size() {
        let config = ConverterConfig::parse("page-size = 16384").unwrap();
        assert_eq!(config.page_size().unwrap(), Some(16384));
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(ConverterConfig::parse("").unwrap(), ConverterConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ConverterConfig::parse("page_size = 4096").unwrap_err();
        assert!(err.to_string().contains("page_size"), "{err}");
    }

    #[test]
    fn bad_page_size_is_a_usage_error() {
        let config = ConverterConfig::parse("page-size = \"lots\"").unwrap();
        assert!(config.page_size().is_err());
        assert!(validate_page_size(3000).is_err());
        assert!(validate_page_size(0).is_err());
        assert_eq!(validate_page_size(4096).unwrap(), 4096);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConverterConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ConverterConfig::default());
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "threads = \"many\"").unwrap();

        let err = ConverterConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }
}
