//! Per-request execution contract.
//!
//! A request travels through an ordered slice of [`Middleware`]s and ends
//! at an [`Endpoint`]. Each middleware receives the [`RequestContext`] by
//! value together with a [`Next`] continuation and either returns a
//! response itself (terminating the chain) or hands the context on with
//! [`Next::run`].
//!
//! Path and header changes that depend on ordering are not applied to the
//! context directly. Middlewares queue them on
//! [`RequestContext::state`] and the forwarding endpoint applies the whole
//! queue at once (see [`modifiers`]).
//!
//! There is no timeout at this layer: a middleware that never returns and
//! never calls `next` holds its request open until the client or the
//! listener gives up.

pub mod forward;
pub mod headers;
pub mod modifiers;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, Method, Uri};
use axum::response::Response;
use bytes::Bytes;

pub use modifiers::{Position, RequestPipelineState};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Everything a middleware may look at or change for one request.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: SocketAddr,
    pub correlation_id: String,
    pub entrypoint: String,
    /// Set once a router rule has matched.
    pub router: Option<String>,
    pub state: RequestPipelineState,
}

impl RequestContext {
    #[must_use]
    pub fn new(
        entrypoint: impl Into<String>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        client_addr: SocketAddr,
    ) -> Self {
        let correlation_id = headers
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

        Self {
            method,
            uri,
            headers,
            body,
            client_addr,
            correlation_id,
            entrypoint: entrypoint.into(),
            router: None,
            state: RequestPipelineState::default(),
        }
    }

    /// Host as sent by the client: the `Host` header, or the URI authority
    /// for absolute-form requests.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Instance name as declared in the configuration.
    fn name(&self) -> &str;

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Response;
}

/// The step a chain ends in once every middleware has passed the request on.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, ctx: RequestContext) -> Response;
}

/// Continuation over the rest of a chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    #[must_use]
    pub fn new(middlewares: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self {
            middlewares,
            endpoint,
        }
    }

    pub async fn run(self, ctx: RequestContext) -> Response {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                tracing::trace!(
                    correlation_id = %ctx.correlation_id,
                    middleware = current.name(),
                    "entering middleware"
                );
                current
                    .handle(
                        ctx,
                        Next {
                            middlewares: rest,
                            endpoint: self.endpoint,
                        },
                    )
                    .await
            }
            None => self.endpoint.call(ctx).await,
        }
    }
}
