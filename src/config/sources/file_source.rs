//! Async file-based config source with SHA256 change detection.
//!
//! [`FileSource`] reads the gateway config file through a format-specific
//! deserializer, decodes the label file it points to (if any) and appends
//! the decoded routers, middlewares and services before validating the
//! result. The version hash covers both files, so editing either one
//! triggers a reload.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::sha256_hex;
use crate::config::model::Config;
use crate::config::validation::validate;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::GatewayError;
use crate::labels;

pub type DeserializeError = Box<dyn std::error::Error + Send + Sync>;

pub struct FileSource {
    path: PathBuf,
    name: &'static str,
    deserialize: fn(&str) -> Result<Config, DeserializeError>,
}

/// Raw file contents plus what was parsed out of them.
struct Snapshot {
    config: Config,
    labels: Option<(PathBuf, String)>,
    hash: String,
}

impl FileSource {
    #[must_use]
    pub fn new(
        path: PathBuf,
        name: &'static str,
        deserialize: fn(&str) -> Result<Config, DeserializeError>,
    ) -> Self {
        Self {
            path,
            name,
            deserialize,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(path: &Path) -> Result<String, GatewayError> {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GatewayError::ConfigFileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                GatewayError::Io(e)
            }
        })
    }

    /// Label paths are relative to the directory of the config file.
    fn resolve_label_path(&self, label_path: &Path) -> PathBuf {
        if label_path.is_absolute() {
            return label_path.to_path_buf();
        }
        self.path
            .parent()
            .map_or_else(|| label_path.to_path_buf(), |dir| dir.join(label_path))
    }

    async fn snapshot(&self) -> Result<Snapshot, GatewayError> {
        let content = Self::read(&self.path).await?;
        let config = (self.deserialize)(&content).map_err(|e| GatewayError::ConfigParse {
            path: self.path.display().to_string(),
            source: e,
        })?;

        let mut hashed = content.into_bytes();
        let labels = match config.labels {
            Some(ref provider) => {
                let path = self.resolve_label_path(&provider.path);
                let label_content = Self::read(&path).await?;
                hashed.push(0);
                hashed.extend_from_slice(label_content.as_bytes());
                Some((path, label_content))
            }
            None => None,
        };

        Ok(Snapshot {
            config,
            labels,
            hash: sha256_hex(&hashed),
        })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), GatewayError> {
        let Snapshot {
            mut config,
            labels,
            hash,
        } = self.snapshot().await?;

        if let (Some(provider), Some((path, content))) = (config.labels.clone(), labels) {
            let map: Map<String, Value> =
                serde_json::from_str(&content).map_err(|e| GatewayError::ConfigParse {
                    path: path.display().to_string(),
                    source: Box::new(e),
                })?;
            let decoded = labels::decode(&map, &provider.root, &provider.filters)?;
            tracing::debug!(
                path = %path.display(),
                routers = decoded.routers.len(),
                middlewares = decoded.middlewares.len(),
                services = decoded.services.len(),
                "decoded labels"
            );
            config.merge(decoded);
        }

        if let Err(errors) = validate(&config) {
            return Err(GatewayError::ConfigValidation { errors });
        }

        Ok((config, ConfigVersion::Hash(hash)))
    }

    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, GatewayError> {
        let snapshot = self.snapshot().await?;
        Ok(*current != ConfigVersion::Hash(snapshot.hash))
    }
}
