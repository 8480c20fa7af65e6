//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding the current
//! configuration generation, the middleware registry, stats, and uptime),
//! [`build_entrypoint_router`] and [`build_health_router`] for the Axum
//! routers of each listener, [`build_http_client`] for the
//! connection-pooled hyper client, and [`shutdown_signal`] for
//! SIGTERM / Ctrl+C handling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::model::Config;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::GatewayError;
use crate::health::health_handler;
use crate::middleware::registry::Registry;
use crate::proxy;
use crate::routing::builder::BuildContext;
use crate::routing::Gateway;

/// One configuration generation: the parsed config and what was compiled
/// from it. Replaced as a whole on reload.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Arc<Config>,
    pub gateway: Arc<Gateway>,
    pub version: ConfigVersion,
    pub source_name: String,
    pub loaded_at: Instant,
}

#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
    pub not_found: AtomicU64,
    pub config_reloads: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            config_reloads: AtomicU64::new(0),
        }
    }

    /// Count a response by its status class.
    pub fn record(&self, status: axum::http::StatusCode) {
        let counter = if status == axum::http::StatusCode::NOT_FOUND {
            &self.not_found
        } else if status.is_server_error() {
            &self.failed
        } else {
            &self.forwarded
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub config: RwLock<LoadedConfig>,
    pub registry: Registry,
    pub build: BuildContext,
    pub start_time: Instant,
    pub stats: Stats,
}

impl AppState {
    /// The generation current at call time. Requests hold on to it until
    /// they finish, even if a reload swaps in a new one meanwhile.
    pub async fn gateway(&self) -> Arc<Gateway> {
        Arc::clone(&self.config.read().await.gateway)
    }

    /// Compile `config` and swap it in. On error nothing changes.
    pub async fn reload(
        &self,
        config: Config,
        version: ConfigVersion,
        source_name: &str,
    ) -> Result<(), GatewayError> {
        let gateway = Gateway::compile(&config, &self.registry, &self.build).await?;
        let mut loaded = self.config.write().await;
        *loaded = LoadedConfig {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            version,
            source_name: source_name.to_string(),
            loaded_at: Instant::now(),
        };
        Ok(())
    }

    /// Reload from `source` when it changed since the current generation.
    /// Returns whether a new generation was swapped in; on error the
    /// current one keeps serving.
    pub async fn refresh(&self, source: &dyn ConfigSource) -> Result<bool, GatewayError> {
        let (current_version, current_config) = {
            let loaded = self.config.read().await;
            (loaded.version.clone(), Arc::clone(&loaded.config))
        };
        if !source.has_changed(&current_version).await? {
            return Ok(false);
        }

        tracing::info!(source = source.name(), "config change detected, reloading");
        let (config, version) = source.load().await?;
        if entrypoints_changed(&current_config, &config) {
            tracing::warn!("entrypoint changes take effect after a restart");
        }
        self.reload(config, version, source.name()).await?;
        self.stats.config_reloads.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}

/// Listeners are bound once; a reload can change routing but not them.
fn entrypoints_changed(current: &Config, next: &Config) -> bool {
    current.entrypoints.len() != next.entrypoints.len()
        || current
            .entrypoints
            .iter()
            .zip(&next.entrypoints)
            .any(|(a, b)| a.name != b.name || a.address != b.address)
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

/// State of one entrypoint listener.
#[derive(Clone)]
pub struct ListenerState {
    pub app: Arc<AppState>,
    pub entrypoint: Arc<str>,
}

pub fn build_entrypoint_router(state: Arc<AppState>, entrypoint: &str, max_body: usize) -> Router {
    Router::new()
        .fallback(proxy::entrypoint_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(ListenerState {
            app: state,
            entrypoint: Arc::from(entrypoint),
        })
}

pub fn build_health_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::config::model::EntrypointSpec;

    fn config(entrypoints: &[(&str, &str)]) -> Config {
        Config {
            entrypoints: entrypoints
                .iter()
                .map(|(name, address)| EntrypointSpec {
                    name: (*name).into(),
                    address: (*address).into(),
                    middlewares: Vec::new(),
                })
                .collect(),
            labels: None,
            routers: Vec::new(),
            middlewares: Vec::new(),
            services: Vec::new(),
        }
    }

    #[test]
    fn detects_entrypoint_changes() {
        let current = config(&[("web", "0.0.0.0:80")]);
        assert!(!entrypoints_changed(&current, &config(&[("web", "0.0.0.0:80")])));
        assert!(entrypoints_changed(&current, &config(&[("web", "0.0.0.0:81")])));
        assert!(entrypoints_changed(
            &current,
            &config(&[("web", "0.0.0.0:80"), ("admin", "0.0.0.0:82")])
        ));
    }

    #[test]
    fn stats_count_by_status_class() {
        let stats = Stats::new();
        stats.record(StatusCode::OK);
        stats.record(StatusCode::UNAUTHORIZED);
        stats.record(StatusCode::NOT_FOUND);
        stats.record(StatusCode::BAD_GATEWAY);

        assert_eq!(stats.forwarded.load(Ordering::Relaxed), 2);
        assert_eq!(stats.not_found.load(Ordering::Relaxed), 1);
        assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
    }
}
