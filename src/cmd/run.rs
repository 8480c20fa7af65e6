//! `portico run`: start the gateway.
//!
//! Loads the configuration, compiles the first generation (an entry
//! chain that cannot be built is fatal here), binds one Axum listener per
//! entrypoint plus the optional health listener, and spawns the refresh
//! loop that hot-swaps new generations.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cli::RunArgs;
use crate::config::sources::{self, DEFAULT_CONFIG_FILES};
use crate::config::{ConfigResolver, ConfigSource};
use crate::error::GatewayError;
use crate::logging;
use crate::middleware::registry::Registry;
use crate::routing::builder::BuildContext;
use crate::routing::Gateway;
use crate::server::{self, AppState, LoadedConfig, Stats};

pub async fn execute(args: RunArgs) -> Result<(), GatewayError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let resolver = resolve_config_sources(&args).await?;
    let (config, version) = resolver.load_with_fallback().await?;

    // Flipped once on shutdown; stops listeners, the refresh loop and
    // middleware timers.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let build = BuildContext::new(
        server::build_http_client(),
        Duration::from_millis(args.timeout),
        shutdown_rx.clone(),
    );
    let registry = Registry::with_builtins();
    let gateway = Gateway::compile(&config, &registry, &build).await?;

    let entrypoints = config.entrypoints.clone();
    let state = Arc::new(AppState {
        config: tokio::sync::RwLock::new(LoadedConfig {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            version,
            source_name: resolver.primary_name().to_string(),
            loaded_at: Instant::now(),
        }),
        registry,
        build,
        start_time: Instant::now(),
        stats: Stats::new(),
    });

    let mut listeners = Vec::with_capacity(entrypoints.len() + 1);
    for entrypoint in &entrypoints {
        let router = server::build_entrypoint_router(Arc::clone(&state), &entrypoint.name, args.max_body);
        listeners.push(serve(&entrypoint.name, &entrypoint.address, router, shutdown_rx.clone()).await?);
    }
    if let Some(ref addr) = args.health_addr {
        let router = server::build_health_router(Arc::clone(&state));
        listeners.push(serve("health", addr, router, shutdown_rx.clone()).await?);
    }

    {
        let loaded = state.config.read().await;
        tracing::info!(
            entrypoints = entrypoints.len(),
            routers_mounted = loaded.gateway.mounted_count(),
            routers_failed = loaded.gateway.failed_count(),
            services = loaded.config.services.len(),
            source = resolver.primary_name(),
            "portico started"
        );
    }

    let refresh_state = Arc::clone(&state);
    let poll_interval = args.poll_interval;
    let refresh_rx = shutdown_rx.clone();
    let refresh_handle = tokio::spawn(async move {
        config_refresh_loop(refresh_state, resolver, poll_interval, refresh_rx).await;
    });

    server::shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    for (name, handle) in listeners {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(listener = %name, error = %e, "listener failed"),
            Err(e) => tracing::error!(listener = %name, error = %e, "listener task failed"),
        }
    }
    if let Err(e) = refresh_handle.await {
        tracing::error!(error = %e, "config refresh task failed");
    }

    tracing::info!("portico stopped");
    Ok(())
}

type Listener = (String, JoinHandle<std::io::Result<()>>);

/// Bind `address` and serve `router` until shutdown flips.
async fn serve(
    name: &str,
    address: &str,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<Listener, GatewayError> {
    let addr: SocketAddr = address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!(listener = %name, addr = %local, "listening");

    let handle = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stopped| *stopped).await;
        })
        .await
    });
    Ok((name.to_string(), handle))
}

async fn resolve_config_sources(args: &RunArgs) -> Result<ConfigResolver, GatewayError> {
    let Some(primary) = resolve_file_source(args.config.as_deref()).await? else {
        return Err(GatewayError::NoConfigSource {
            hint: "Provide --config <file> or create ./portico.yaml.\n  \
                   Run 'portico init' to create a config file."
                .into(),
        });
    };

    let fallback = match args.fallback_config {
        Some(ref path) => Some(Box::new(sources::for_path(path)?) as Box<dyn ConfigSource>),
        None => None,
    };

    Ok(ConfigResolver::new(primary, fallback))
}

async fn resolve_file_source(
    explicit: Option<&Path>,
) -> Result<Option<Box<dyn ConfigSource>>, GatewayError> {
    if let Some(path) = explicit {
        return Ok(Some(Box::new(sources::for_path(path)?)));
    }

    for name in DEFAULT_CONFIG_FILES {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return Ok(Some(Box::new(sources::for_path(&path)?)));
        }
    }

    Ok(None)
}

/// Poll the primary source only. The fallback is a startup aid; a broken
/// primary on reload keeps the generation that is already serving.
async fn config_refresh_loop(
    state: Arc<AppState>,
    resolver: ConfigResolver,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("config refresh loop shutting down");
                return;
            }
        }

        match state.refresh(resolver.primary()).await {
            Ok(true) => {
                let loaded = state.config.read().await;
                tracing::info!(
                    routers_mounted = loaded.gateway.mounted_count(),
                    routers_failed = loaded.gateway.failed_count(),
                    "config reloaded"
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    source = resolver.primary_name(),
                    error = %e,
                    "config reload failed, keeping current generation"
                );
            }
        }
    }
}
