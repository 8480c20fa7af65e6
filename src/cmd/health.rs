//! `portico health`: query the health listener of a running instance.
//!
//! The request goes out through the gateway's own pooled client, so an
//! `https://` health URL works the same as a plain one. With `--strict`
//! a degraded instance (routers that failed to mount) exits non-zero.

use std::fmt::Write as _;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};

use crate::cli::HealthArgs;
use crate::error::GatewayError;
use crate::health::HealthResponse;
use crate::server::build_http_client;

pub async fn execute(args: HealthArgs) -> Result<(), GatewayError> {
    let url = format!("{}/health", args.url.trim_end_matches('/'));
    let body = fetch(&url, Duration::from_millis(args.timeout)).await?;

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    let health: HealthResponse =
        serde_json::from_slice(&body).map_err(|e| GatewayError::HttpRequest {
            source: format!("unexpected health payload from {url}: {e}").into(),
        })?;
    print!("{}", render(&health, &args.url));

    if args.strict && health.config.routers_failed > 0 {
        return Err(GatewayError::RouterBuild {
            failed: health.config.routers_failed,
        });
    }
    Ok(())
}

/// GET `url` and return the body of a 2xx answer.
async fn fetch(url: &str, timeout: Duration) -> Result<Bytes, GatewayError> {
    let uri: hyper::Uri = url.parse().map_err(|e: hyper::http::uri::InvalidUri| {
        GatewayError::UriParse {
            source: Box::new(e),
        }
    })?;
    let request = hyper::Request::get(uri)
        .body(Full::new(Bytes::new()))
        .map_err(|e| GatewayError::HttpRequest {
            source: Box::new(e),
        })?;

    let response = tokio::time::timeout(timeout, build_http_client().request(request))
        .await
        .map_err(|_| GatewayError::HttpRequest {
            source: format!("no answer from {url} within {}ms", timeout.as_millis()).into(),
        })?
        .map_err(|e| GatewayError::HttpRequest {
            source: Box::new(e),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::HealthCheckFailed(status));
    }
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| GatewayError::HttpRequest {
            source: Box::new(e),
        })?;
    Ok(body.to_bytes())
}

fn render(health: &HealthResponse, url: &str) -> String {
    let marker = if health.status == "healthy" { "\u{2713}" } else { "!" };
    let config = &health.config;
    let stats = &health.stats;

    let mut out = String::new();
    let _ = writeln!(out, "{marker} portico {} is {} ({url})", health.version, health.status);
    let _ = writeln!(out, "  uptime:      {}", format_uptime(health.uptime_seconds));
    let _ = writeln!(
        out,
        "  generation:  {} from {}, loaded {} ago, {} reloads",
        config.version,
        config.source,
        format_uptime(config.loaded_ago_seconds),
        stats.config_reloads
    );
    let _ = writeln!(
        out,
        "  routers:     {} mounted on {} entrypoints",
        config.routers_mounted, config.entrypoints
    );
    if config.routers_failed > 0 {
        let _ = writeln!(out, "               {} failed to mount", config.routers_failed);
    }
    let _ = writeln!(
        out,
        "  services:    {} ({} servers)",
        config.services, config.servers
    );
    let _ = writeln!(
        out,
        "  requests:    {} forwarded, {} failed, {} unmatched",
        stats.requests_forwarded, stats.requests_failed, stats.requests_not_found
    );
    out
}

fn format_uptime(seconds: u64) -> String {
    match (seconds / 3600, (seconds % 3600) / 60, seconds % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, s) => format!("{h}h {m}m {s}s"),
    }
}
