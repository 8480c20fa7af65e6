//! Middleware types and their registration.
//!
//! A middleware *type* is a [`MiddlewareFactory`]: it names itself,
//! describes its options with an [`OptionsSchema`](schema::OptionsSchema),
//! deserializes them into a typed options model and asynchronously
//! creates [`Middleware`](crate::pipeline::Middleware) instances. Types are
//! collected in a [`Registry`](registry::Registry) built once at startup
//! and handed to the chain builder.
//!
//! Built-in types:
//!
//! | Type | Module |
//! |------|--------|
//! | `headers` | [`headers`] |
//! | `replacePathRegex`, `stripPrefix`, `addPrefix` | [`path`] |
//! | `redirectScheme` | [`redirect`] |
//! | `basicAuth` | [`basic_auth`] |
//! | `forwardAuth` | [`forward_auth`] |

pub mod basic_auth;
pub mod forward_auth;
pub mod headers;
pub mod path;
pub mod redirect;
pub mod registry;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::error::MiddlewareInitError;
use crate::pipeline::Middleware;
use crate::server::HttpClient;
use schema::OptionsSchema;

/// What a factory gets to know about the router (or entrypoint) an
/// instance is being created for.
#[derive(Clone)]
pub struct RouteHandle {
    owner: String,
    client: HttpClient,
    timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RouteHandle {
    #[must_use]
    pub fn new(
        owner: impl Into<String>,
        client: HttpClient,
        timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            owner: owner.into(),
            client,
            timeout,
            shutdown,
        }
    }

    /// Router or entrypoint name.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Upstream timeout configured for the gateway.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Flips to `true` when the gateway shuts down; background tasks
    /// spawned by a factory must stop on it.
    #[must_use]
    pub fn shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }
}

#[async_trait]
pub trait MiddlewareFactory: Send + Sync + 'static {
    type Options: DeserializeOwned + Send;

    /// Type name referenced by `MiddlewareSpec::kind`.
    fn provides(&self) -> &'static str;

    fn options_schema(&self) -> OptionsSchema;

    async fn create(
        &self,
        name: &str,
        route: &RouteHandle,
        options: Self::Options,
    ) -> Result<Arc<dyn Middleware>, MiddlewareInitError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::SocketAddr;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, Method, Response, StatusCode, Uri};
    use bytes::Bytes;

    use super::*;
    use crate::pipeline::{Endpoint, Next, RequestContext};
    use crate::server::build_http_client;

    /// A handle for tests. Keep the sender alive for as long as background
    /// tasks should keep running.
    pub fn handle() -> (RouteHandle, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let handle = RouteHandle::new("test", build_http_client(), Duration::from_secs(5), rx);
        (handle, tx)
    }

    pub fn request(uri: &str, headers: &[(&str, &str)]) -> RequestContext {
        request_with(Method::GET, uri, headers)
    }

    pub fn request_with(method: Method, uri: &str, headers: &[(&str, &str)]) -> RequestContext {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        let client: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        RequestContext::new("web", method, uri.parse::<Uri>().unwrap(), map, Bytes::new(), client)
    }

    /// Endpoint that applies the queued rewrites the way the forwarder does
    /// and remembers what would have been sent upstream.
    #[derive(Default)]
    pub struct Capture {
        upstream: Mutex<Option<(String, HeaderMap)>>,
        pub response_headers: HeaderMap,
    }

    impl Capture {
        /// Rewritten path and query plus request headers, if the request
        /// reached the endpoint.
        pub fn upstream(&self) -> Option<(String, HeaderMap)> {
            self.upstream.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Endpoint for Capture {
        async fn call(&self, ctx: RequestContext) -> Response<Body> {
            let (upstream, downstream) = ctx.state.into_parts();
            let mut headers = ctx.headers.clone();
            let Some(path_and_query) = ctx.uri.path_and_query() else {
                return error(StatusCode::BAD_REQUEST);
            };
            let Ok(rewritten) = upstream.apply(path_and_query, &mut headers) else {
                return error(StatusCode::INTERNAL_SERVER_ERROR);
            };
            *self.upstream.lock().unwrap() = Some((rewritten.to_string(), headers));

            let mut response = Response::new(Body::empty());
            *response.headers_mut() = self.response_headers.clone();
            if downstream.apply(response.headers_mut()).is_err() {
                return error(StatusCode::INTERNAL_SERVER_ERROR);
            }
            response
        }
    }

    fn error(status: StatusCode) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        response
    }

    pub async fn run(middleware: Arc<dyn Middleware>, ctx: RequestContext, endpoint: &dyn Endpoint) -> Response<Body> {
        chain(vec![middleware], ctx, endpoint).await
    }

    pub async fn chain(
        middlewares: Vec<Arc<dyn Middleware>>,
        ctx: RequestContext,
        endpoint: &dyn Endpoint,
    ) -> Response<Body> {
        Next::new(&middlewares, endpoint).run(ctx).await
    }
}
