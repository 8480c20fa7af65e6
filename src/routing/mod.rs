//! Rule matching, chain building and per-entrypoint dispatch.
//!
//! A [`Gateway`] is one compiled configuration generation: an
//! [`EntrypointTable`](entrypoint::EntrypointTable) per configured
//! entrypoint. It is immutable once compiled; a reload compiles a new one
//! next to it and swaps it in as a whole.

pub mod balancer;
pub mod builder;
pub mod entrypoint;
pub mod route;
pub mod rule;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::model::Config;
use crate::error::GatewayError;
use crate::middleware::registry::Registry;
use builder::{BuildContext, BuildReport, ChainBuilder};
use entrypoint::EntrypointTable;

pub struct Gateway {
    entrypoints: HashMap<String, Arc<EntrypointTable>>,
    reports: Vec<BuildReport>,
}

impl Gateway {
    /// Compile every entrypoint of `config`. Entrypoints build
    /// concurrently; any entry chain failure fails the whole generation.
    pub async fn compile(
        config: &Config,
        registry: &Registry,
        context: &BuildContext,
    ) -> Result<Self, GatewayError> {
        let dynamic = config.dynamic();

        for router in &dynamic.routers {
            for name in &router.entrypoints {
                if config.entrypoint(name).is_none() {
                    tracing::warn!(
                        router = %router.name,
                        entrypoint = %name,
                        "router references an unknown entrypoint"
                    );
                }
            }
        }

        let builder = ChainBuilder::new(registry, &dynamic, context);
        let built = futures::future::try_join_all(
            config
                .entrypoints
                .iter()
                .map(|entrypoint| builder.build_entrypoint(entrypoint)),
        )
        .await?;

        let mut entrypoints = HashMap::with_capacity(built.len());
        let mut reports = Vec::with_capacity(built.len());
        for (table, report) in built {
            entrypoints.insert(table.name().to_string(), Arc::new(table));
            reports.push(report);
        }

        Ok(Self {
            entrypoints,
            reports,
        })
    }

    #[must_use]
    pub fn entrypoint(&self, name: &str) -> Option<Arc<EntrypointTable>> {
        self.entrypoints.get(name).cloned()
    }

    /// One report per entrypoint, in configuration order.
    #[must_use]
    pub fn reports(&self) -> &[BuildReport] {
        &self.reports
    }

    #[must_use]
    pub fn mounted_count(&self) -> usize {
        self.reports.iter().map(|r| r.mounted.len()).sum()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.reports.iter().map(|r| r.failed.len()).sum()
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("reports", &self.reports)
            .finish_non_exhaustive()
    }
}
