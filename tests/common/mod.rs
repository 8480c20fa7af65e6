//! Shared harness: loopback echo backends and a gateway served on
//! ephemeral ports.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tokio::sync::watch;

use portico::config::model::Config;
use portico::config::ConfigVersion;
use portico::middleware::registry::Registry;
use portico::routing::builder::BuildContext;
use portico::routing::Gateway;
use portico::server::{self, AppState, LoadedConfig, Stats};

async fn echo(State(name): State<&'static str>, uri: Uri, headers: HeaderMap) -> Json<Value> {
    let mut seen = Map::new();
    for key in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(key)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        seen.insert(key.to_string(), Value::String(values.join(", ")));
    }
    Json(json!({
        "backend": name,
        "path": uri.path_and_query().map_or("/", |p| p.as_str()),
        "headers": seen,
    }))
}

/// Start a backend answering every request with what it received.
pub async fn spawn_backend(name: &'static str) -> SocketAddr {
    let app = Router::new().fallback(echo).with_state(name);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn slow_echo(
    State((name, delay)): State<(&'static str, Duration)>,
    uri: Uri,
    headers: HeaderMap,
) -> Json<Value> {
    tokio::time::sleep(delay).await;
    echo(State(name), uri, headers).await
}

/// Like [`spawn_backend`], but every answer is held back for `delay`.
pub async fn spawn_slow_backend(name: &'static str, delay: Duration) -> SocketAddr {
    let app = Router::new().fallback(slow_echo).with_state((name, delay));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn config(value: Value) -> Config {
    serde_json::from_value(value).unwrap()
}

pub fn service(name: &str, addr: SocketAddr) -> Value {
    json!({
        "name": name,
        "servers": [{ "host": addr.ip().to_string(), "port": addr.port() }],
    })
}

pub struct TestGateway {
    pub state: Arc<AppState>,
    pub listeners: HashMap<String, SocketAddr>,
    pub health: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl TestGateway {
    pub async fn start(config: Config) -> Self {
        Self::start_with(config, Registry::with_builtins()).await
    }

    pub async fn start_with(config: Config, registry: Registry) -> Self {
        Self::start_versioned(config, ConfigVersion::Hash("test-hash".into()), registry).await
    }

    pub async fn start_versioned(config: Config, version: ConfigVersion, registry: Registry) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let build = BuildContext::new(
            server::build_http_client(),
            Duration::from_secs(2),
            shutdown_rx.clone(),
        );
        let gateway = Gateway::compile(&config, &registry, &build).await.unwrap();

        let names: Vec<String> = config.entrypoints.iter().map(|e| e.name.clone()).collect();
        let state = Arc::new(AppState {
            config: tokio::sync::RwLock::new(LoadedConfig {
                config: Arc::new(config),
                gateway: Arc::new(gateway),
                version,
                source_name: "test".into(),
                loaded_at: Instant::now(),
            }),
            registry,
            build,
            start_time: Instant::now(),
            stats: Stats::new(),
        });

        let mut listeners = HashMap::new();
        for name in names {
            let router = server::build_entrypoint_router(Arc::clone(&state), &name, 1_048_576);
            let addr = serve(router, shutdown_rx.clone()).await;
            listeners.insert(name, addr);
        }
        let health = serve(server::build_health_router(Arc::clone(&state)), shutdown_rx).await;

        Self {
            state,
            listeners,
            health,
            shutdown,
        }
    }

    pub fn url(&self, entrypoint: &str, path: &str) -> String {
        format!("http://{}{path}", self.listeners[entrypoint])
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn serve(router: Router, mut shutdown: watch::Receiver<bool>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stopped| *stopped).await;
        })
        .await
        .unwrap();
    });
    addr
}

pub async fn get_json(url: &str) -> (u16, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = resp.status().as_u16();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}
