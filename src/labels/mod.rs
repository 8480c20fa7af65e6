//! Orchestrator label decoding.
//!
//! Container orchestrators attach flat `key=value` metadata to workloads.
//! [`decode`] turns such a map into a [`DynamicConfiguration`]: keys are
//! filtered and sorted, split on `.` into path segments (`servers[0]`
//! becomes `servers` + `[0]`), folded into a [`LabelNode`] tree rooted at
//! the configured name, and the tree is projected onto the configuration
//! schema by [`project`]. A single malformed key fails the whole decode.
//!
//! ```text
//! portico.routers.api.rule        = PathPrefix('/api')
//! portico.routers.api.middlewares = strip,auth
//! portico.routers.api.service     = backend
//! portico.services.backend.servers[0].host = 10.0.0.5
//! portico.services.backend.servers[0].port = 8080
//! ```

pub mod project;

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::config::model::DynamicConfiguration;
use crate::error::DecodeError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelNode {
    pub name: String,
    pub value: Option<String>,
    pub children: BTreeMap<String, LabelNode>,
}

impl LabelNode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            children: BTreeMap::new(),
        }
    }

    fn insert(&mut self, path: &[String], value: &str, key: &str) -> Result<(), DecodeError> {
        let Some((head, rest)) = path.split_first() else {
            if !self.children.is_empty() || self.value.is_some() {
                return Err(DecodeError::ValueAndChildren {
                    path: key.to_string(),
                });
            }
            self.value = Some(value.to_string());
            return Ok(());
        };

        if self.value.is_some() {
            return Err(DecodeError::ValueAndChildren {
                path: key.to_string(),
            });
        }

        self.children
            .entry(head.clone())
            .or_insert_with(|| Self::new(head.clone()))
            .insert(rest, value, key)
    }
}

/// Split a label key into path segments, expanding `name[i]` into
/// `name` and `[i]`.
pub fn split_key(key: &str) -> Result<Vec<String>, DecodeError> {
    let mut parts = Vec::new();

    for segment in key.split('.') {
        if segment.is_empty() {
            return Err(DecodeError::EmptySegment {
                key: key.to_string(),
            });
        }
        if segment.starts_with('[') {
            return Err(DecodeError::LeadingBracket {
                key: key.to_string(),
                segment: segment.to_string(),
            });
        }

        if !segment.contains(['[', ']']) {
            parts.push(segment.to_string());
            continue;
        }

        let bad_index = || DecodeError::BadIndex {
            key: key.to_string(),
            segment: segment.to_string(),
        };

        let inner = segment.strip_suffix(']').ok_or_else(bad_index)?;
        let (name, index) = inner.split_once('[').ok_or_else(bad_index)?;
        if name.contains(']') {
            return Err(bad_index());
        }
        let index: usize = index.parse().map_err(|_| bad_index())?;

        parts.push(name.to_string());
        parts.push(format!("[{index}]"));
    }

    Ok(parts)
}

/// Build the label tree. Non-string values are ignored, and so are keys
/// matching none of `filters` (when any are given).
pub fn build_tree(
    labels: &Map<String, Value>,
    root: &str,
    filters: &[String],
) -> Result<LabelNode, DecodeError> {
    let mut entries: Vec<(&str, &str)> = labels
        .iter()
        .filter_map(|(key, value)| value.as_str().map(|v| (key.as_str(), v)))
        .filter(|(key, _)| filters.is_empty() || filters.iter().any(|f| key.starts_with(f)))
        .collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let mut tree = LabelNode::new(root);
    for (key, value) in entries {
        let path = split_key(key)?;
        if path.first().map(String::as_str) != Some(root) {
            return Err(DecodeError::RootMismatch {
                key: key.to_string(),
                root: root.to_string(),
            });
        }
        tree.insert(&path[1..], value, key)?;
    }

    Ok(tree)
}

/// Decode a flat label map into a dynamic configuration.
pub fn decode(
    labels: &Map<String, Value>,
    root: &str,
    filters: &[String],
) -> Result<DynamicConfiguration, DecodeError> {
    let tree = build_tree(labels, root, filters)?;
    let projected = project::project(&tree)?;
    serde_json::from_value(projected).map_err(|e| DecodeError::InvalidValue {
        path: root.to_string(),
        message: e.to_string(),
    })
}

/// Decode and render as canonical JSON. Identical input always yields
/// byte-identical output.
pub fn decode_to_json(
    labels: &Map<String, Value>,
    root: &str,
    filters: &[String],
) -> Result<String, DecodeError> {
    let config = decode(labels, root, filters)?;
    serde_json::to_string_pretty(&config).map_err(|e| DecodeError::InvalidValue {
        path: root.to_string(),
        message: e.to_string(),
    })
}
