//! The terminal forwarding step of a router chain.
//!
//! [`Forwarder`] selects a server of the router's service, applies the
//! queued upstream rewrites, sends the request with a timeout, applies the
//! queued downstream header rewrites to the response and returns it.
//!
//! Status mapping: a failing rewrite is a 500 for this request only; an
//! unreachable or failing upstream is a 502; an upstream that does not
//! answer within the timeout is a 504.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, Full};

use super::headers::{build_forwarded_headers, strip_response_hop_by_hop};
use super::{Endpoint, RequestContext};
use crate::config::model::ServiceSpec;
use crate::routing::balancer::ServerSelector;
use crate::server::HttpClient;

pub struct Forwarder {
    router: String,
    service: Arc<ServiceSpec>,
    selector: Arc<dyn ServerSelector>,
    client: HttpClient,
    timeout: Duration,
}

impl Forwarder {
    #[must_use]
    pub fn new(
        router: impl Into<String>,
        service: Arc<ServiceSpec>,
        selector: Arc<dyn ServerSelector>,
        client: HttpClient,
        timeout: Duration,
    ) -> Self {
        Self {
            router: router.into(),
            service,
            selector,
            client,
            timeout,
        }
    }
}

#[async_trait]
impl Endpoint for Forwarder {
    #[allow(clippy::cast_possible_truncation)]
    async fn call(&self, ctx: RequestContext) -> Response {
        let RequestContext {
            method,
            uri,
            headers,
            body,
            client_addr,
            correlation_id,
            state,
            ..
        } = ctx;

        let Some(server) = self.selector.select(&self.service.servers) else {
            tracing::error!(
                correlation_id = %correlation_id,
                router = %self.router,
                service = %self.service.name,
                "service has no servers"
            );
            return StatusCode::BAD_GATEWAY.into_response();
        };

        let (upstream, downstream) = state.into_parts();
        let mut out_headers = build_forwarded_headers(
            &headers,
            &client_addr.ip().to_string(),
            uri.scheme_str().unwrap_or("http"),
            &correlation_id,
        );

        let original = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        let rewritten = match upstream.apply(&original, &mut out_headers) {
            Ok(pq) => pq,
            Err(e) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    router = %self.router,
                    error = %e,
                    "request rewrite failed"
                );
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let target = format!("{}{}", server.origin(), rewritten);
        let target_uri = match target.parse::<Uri>() {
            Ok(u) => u,
            Err(e) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    target = %target,
                    error = %e,
                    "invalid upstream URI"
                );
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let mut req_builder = hyper::Request::builder()
            .method(method.clone())
            .uri(target_uri);
        for (key, value) in &out_headers {
            req_builder = req_builder.header(key, value);
        }
        let request = match req_builder.body(Full::new(body)) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(correlation_id = %correlation_id, error = %e, "failed to build upstream request");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.client.request(request)).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    router = %self.router,
                    target = %target,
                    error = %e,
                    latency_ms,
                    "upstream request failed"
                );
                return StatusCode::BAD_GATEWAY.into_response();
            }
            Err(_) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    router = %self.router,
                    target = %target,
                    latency_ms,
                    "upstream request timed out"
                );
                return StatusCode::GATEWAY_TIMEOUT.into_response();
            }
        };

        let status = response.status();
        let mut resp_headers = response.headers().clone();
        let body_bytes = match response.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    target = %target,
                    error = %e,
                    "upstream body read failed"
                );
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        if self.service.verbose {
            tracing::info!(
                correlation_id = %correlation_id,
                router = %self.router,
                method = %method,
                target = %target,
                status = status.as_u16(),
                latency_ms,
                "forwarded"
            );
        } else {
            tracing::debug!(
                correlation_id = %correlation_id,
                router = %self.router,
                target = %target,
                status = status.as_u16(),
                latency_ms,
                "forwarded"
            );
        }

        strip_response_hop_by_hop(&mut resp_headers);
        if let Err(e) = downstream.apply(&mut resp_headers) {
            tracing::error!(
                correlation_id = %correlation_id,
                router = %self.router,
                error = %e,
                "response rewrite failed"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }

        let mut out = Response::new(Body::from(body_bytes));
        *out.status_mut() = status;
        *out.headers_mut() = resp_headers;
        out
    }
}
