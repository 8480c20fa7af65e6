//! Serde data structures for the Portico configuration file.
//!
//! [`Config`] is the root of the file: the static entrypoint list, an
//! optional label provider, and the dynamic routers/middlewares/services.
//! [`DynamicConfiguration`] is the hot-reloadable part the chain builder
//! compiles. Field names are camelCase on the wire.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_label_root() -> String {
    "portico".to_string()
}

fn is_default_label_root(v: &str) -> bool {
    v == "portico"
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_null(v: &serde_json::Value) -> bool {
    v.is_null()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    pub entrypoints: Vec<EntrypointSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelProvider>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routers: Vec<RouterSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<MiddlewareSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceSpec>,
}

impl Config {
    /// Snapshot of the routers, middlewares and services.
    #[must_use]
    pub fn dynamic(&self) -> DynamicConfiguration {
        DynamicConfiguration {
            routers: self.routers.clone(),
            middlewares: self.middlewares.clone(),
            services: self.services.clone(),
        }
    }

    /// Append a decoded configuration (e.g. from labels) to this one.
    pub fn merge(&mut self, other: DynamicConfiguration) {
        self.routers.extend(other.routers);
        self.middlewares.extend(other.middlewares);
        self.services.extend(other.services);
    }

    #[must_use]
    pub fn entrypoint(&self, name: &str) -> Option<&EntrypointSpec> {
        self.entrypoints.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct EntrypointSpec {
    pub name: String,

    /// Listen address, e.g. `0.0.0.0:8080`.
    pub address: String,

    /// Entry middlewares, run for every request before rule matching.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LabelProvider {
    /// JSON object file holding the flat label map.
    pub path: PathBuf,

    #[serde(
        default = "default_label_root",
        skip_serializing_if = "is_default_label_root"
    )]
    pub root: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct DynamicConfiguration {
    #[serde(default)]
    pub routers: Vec<RouterSpec>,

    #[serde(default)]
    pub middlewares: Vec<MiddlewareSpec>,

    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

impl DynamicConfiguration {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routers.is_empty() && self.middlewares.is_empty() && self.services.is_empty()
    }

    #[must_use]
    pub fn middleware(&self, name: &str) -> Option<&MiddlewareSpec> {
        self.middlewares.iter().find(|m| m.name == name)
    }

    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn total_servers(&self) -> usize {
        self.services.iter().map(|s| s.servers.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RouterSpec {
    pub name: String,

    pub rule: String,

    /// Entrypoints this router is mounted on. Empty means all of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoints: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<String>,

    pub service: String,

    /// Higher wins. Defaults to the length of the rule string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl RouterSpec {
    #[must_use]
    pub fn effective_priority(&self) -> i64 {
        self.priority
            .unwrap_or_else(|| i64::try_from(self.rule.len()).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn serves_entrypoint(&self, entrypoint: &str) -> bool {
        self.entrypoints.is_empty() || self.entrypoints.iter().any(|e| e == entrypoint)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MiddlewareSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque here; validated against the type's schema by the registry.
    #[serde(default, skip_serializing_if = "is_null")]
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ServiceSpec {
    pub name: String,

    pub servers: Vec<ServerSpec>,

    /// Log every forwarded request at `info` instead of `debug`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub verbose: bool,

    #[serde(default, skip_serializing_if = "LoadBalancerKind::is_default")]
    pub load_balancer: LoadBalancerKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ServerSpec {
    pub host: String,

    pub port: u16,

    #[serde(default)]
    pub protocol: Protocol,

    /// Name of a TLS options profile owned by the transport layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_options: Option<String>,
}

impl ServerSpec {
    /// Scheme + authority, e.g. `http://127.0.0.1:8080`.
    #[must_use]
    pub fn origin(&self) -> String {
        format!("{}://{}:{}", self.protocol.as_str(), self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadBalancerKind {
    #[default]
    First,
    RoundRobin,
}

impl LoadBalancerKind {
    fn is_default(&self) -> bool {
        *self == Self::First
    }
}
