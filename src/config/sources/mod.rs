//! Concrete [`ConfigSource`](super::ConfigSource) implementations.
//!
//! Provides the generic [`FileSource`](file_source::FileSource) plus one
//! deserializer per file format (YAML, JSON, TOML), each gated by its
//! feature flag. [`for_path`] picks the format from the file extension.

pub mod file_source;

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::model::Config;
use crate::error::GatewayError;
use file_source::{DeserializeError, FileSource};

/// File names tried, in order, when no config path is given.
pub const DEFAULT_CONFIG_FILES: [&str; 4] = [
    "portico.yaml",
    "portico.yml",
    "portico.json",
    "portico.toml",
];

/// Pick a [`FileSource`] by file extension.
pub fn for_path(path: &Path) -> Result<FileSource, GatewayError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => Ok(FileSource::new(path.to_path_buf(), "yaml", from_yaml)),

        #[cfg(feature = "json")]
        "json" => Ok(FileSource::new(path.to_path_buf(), "json", from_json)),

        #[cfg(feature = "toml")]
        "toml" => Ok(FileSource::new(path.to_path_buf(), "toml", from_toml)),

        other => Err(GatewayError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(feature = "yaml")]
fn from_yaml(content: &str) -> Result<Config, DeserializeError> {
    serde_yml::from_str(content).map_err(Into::into)
}

#[cfg(feature = "json")]
fn from_json(content: &str) -> Result<Config, DeserializeError> {
    serde_json::from_str(content).map_err(Into::into)
}

#[cfg(feature = "toml")]
fn from_toml(content: &str) -> Result<Config, DeserializeError> {
    toml::from_str(content).map_err(Into::into)
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
