//! `redirectScheme`: send clients to the same URL under another scheme.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::schema::{Field, FieldKind, OptionsSchema};
use super::{MiddlewareFactory, RouteHandle};
use crate::error::MiddlewareInitError;
use crate::pipeline::{Middleware, Next, RequestContext};

pub const TYPE_NAME: &str = "redirectScheme";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedirectSchemeOptions {
    pub scheme: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub permanent: bool,
}

pub struct RedirectSchemeFactory;

#[async_trait]
impl MiddlewareFactory for RedirectSchemeFactory {
    type Options = RedirectSchemeOptions;

    fn provides(&self) -> &'static str {
        TYPE_NAME
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new(vec![
            Field::required("scheme", FieldKind::String).one_of(&["http", "https"]),
            Field::optional("port", FieldKind::Integer),
            Field::optional("permanent", FieldKind::Bool),
        ])
    }

    async fn create(
        &self,
        name: &str,
        _route: &RouteHandle,
        options: RedirectSchemeOptions,
    ) -> Result<Arc<dyn Middleware>, MiddlewareInitError> {
        if options.port == Some(0) {
            return Err(MiddlewareInitError::new("port must be between 1 and 65535"));
        }
        Ok(Arc::new(RedirectScheme {
            name: name.to_string(),
            scheme: options.scheme,
            port: options.port,
            permanent: options.permanent,
        }))
    }
}

pub struct RedirectScheme {
    name: String,
    scheme: String,
    port: Option<u16>,
    permanent: bool,
}

impl RedirectScheme {
    fn status(&self, method: &Method) -> StatusCode {
        let preserve_method = !matches!(*method, Method::GET | Method::HEAD);
        match (self.permanent, preserve_method) {
            (true, false) => StatusCode::MOVED_PERMANENTLY,
            (true, true) => StatusCode::PERMANENT_REDIRECT,
            (false, false) => StatusCode::FOUND,
            (false, true) => StatusCode::TEMPORARY_REDIRECT,
        }
    }

    fn location(&self, ctx: &RequestContext) -> Option<String> {
        let host = strip_port(ctx.host()?);
        if host.is_empty() {
            return None;
        }
        let path = ctx
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        Some(format!("{}://{host}{port}{path}", self.scheme))
    }
}

/// Scheme the client used: absolute-form URI first, then what a fronting
/// proxy reported, then plain http.
fn request_scheme(ctx: &RequestContext) -> String {
    if let Some(scheme) = ctx.uri.scheme_str() {
        return scheme.to_ascii_lowercase();
    }
    ctx.headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| "http".to_string(), |v| v.trim().to_ascii_lowercase())
}

/// `example.com:8080` -> `example.com`, `[::1]:8080` -> `[::1]`.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}

#[async_trait]
impl Middleware for RedirectScheme {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Response {
        if request_scheme(&ctx) == self.scheme {
            return next.run(ctx).await;
        }

        let Some(location) = self.location(&ctx) else {
            tracing::debug!(
                correlation_id = %ctx.correlation_id,
                middleware = %self.name,
                "cannot redirect a request without host"
            );
            return (StatusCode::BAD_REQUEST, "missing host").into_response();
        };
        let Ok(location) = HeaderValue::from_str(&location) else {
            return (StatusCode::BAD_REQUEST, "invalid host").into_response();
        };

        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            middleware = %self.name,
            location = ?location,
            "redirecting"
        );
        (self.status(&ctx.method), [(header::LOCATION, location)]).into_response()
    }
}
