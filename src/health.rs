//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version, uptime, config source metadata, mounted and failed router
//! counts, and cumulative request statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::config::ConfigVersion;
use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub entrypoints: usize,
    pub routers_mounted: usize,
    pub routers_failed: usize,
    pub services: usize,
    pub servers: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
    pub requests_not_found: u64,
    pub config_reloads: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = {
        let loaded = state.config.read().await;
        let version = match &loaded.version {
            ConfigVersion::Hash(h) => h.get(..8).unwrap_or(h).to_string(),
        };
        ConfigHealth {
            source: loaded.source_name.clone(),
            version,
            loaded_ago_seconds: loaded.loaded_at.elapsed().as_secs(),
            entrypoints: loaded.config.entrypoints.len(),
            routers_mounted: loaded.gateway.mounted_count(),
            routers_failed: loaded.gateway.failed_count(),
            services: loaded.config.services.len(),
            servers: loaded.config.dynamic().total_servers(),
        }
    };

    // Any failed router makes the instance degraded, not unhealthy: the
    // rest of the generation is serving.
    let status = if config.routers_failed == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config,
        stats: StatsResponse {
            requests_forwarded: state.stats.forwarded.load(Ordering::Relaxed),
            requests_failed: state.stats.failed.load(Ordering::Relaxed),
            requests_not_found: state.stats.not_found.load(Ordering::Relaxed),
            config_reloads: state.stats.config_reloads.load(Ordering::Relaxed),
        },
    })
}
