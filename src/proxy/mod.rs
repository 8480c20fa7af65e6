//! Listener-side request handling.
//!
//! [`entrypoint_handler`] is the Axum fallback of every entrypoint
//! listener. It captures the configuration generation current at dispatch,
//! wraps the request in a [`RequestContext`] and hands it to that
//! entrypoint's compiled table.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::pipeline::{RequestContext, CORRELATION_HEADER};
use crate::server::ListenerState;

pub async fn entrypoint_handler(
    State(state): State<ListenerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let gateway = state.app.gateway().await;
    let Some(table) = gateway.entrypoint(&state.entrypoint) else {
        // The entrypoint list is static; this only happens if a reload
        // dropped the entrypoint this listener serves.
        tracing::warn!(entrypoint = %state.entrypoint, "entrypoint is not configured");
        return StatusCode::NOT_FOUND.into_response();
    };

    let ctx = RequestContext::new(
        state.entrypoint.as_ref(),
        method.clone(),
        uri,
        req_headers,
        body,
        addr,
    );
    let correlation_id = ctx.correlation_id.clone();
    let path = ctx.path().to_string();

    let start = Instant::now();
    let mut response = table.handle(ctx).await;
    let status = response.status();
    state.app.stats.record(status);

    tracing::debug!(
        correlation_id = %correlation_id,
        entrypoint = %state.entrypoint,
        method = %method,
        path = %path,
        status = status.as_u16(),
        latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "request handled"
    );

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
