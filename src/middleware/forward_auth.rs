//! `forwardAuth`: delegate the authentication decision to an external
//! service.
//!
//! For every request a `GET` carrying the client's headers is sent to
//! `address`, together with `X-Forwarded-Method`, `X-Forwarded-Proto`,
//! `X-Forwarded-Host`, `X-Forwarded-Uri` and `X-Forwarded-For`. A 2xx
//! answer lets the request through, copying the headers listed in
//! `authResponseHeaders` onto the upstream request. Any other answer is
//! returned to the client as is.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, Full};
use serde::Deserialize;

use super::schema::{Field, FieldKind, OptionsSchema};
use super::{MiddlewareFactory, RouteHandle};
use crate::error::MiddlewareInitError;
use crate::pipeline::headers::{strip_hop_by_hop, strip_response_hop_by_hop};
use crate::pipeline::{Middleware, Next, Position, RequestContext};
use crate::server::HttpClient;

pub const TYPE_NAME: &str = "forwardAuth";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ForwardAuthOptions {
    pub address: String,

    #[serde(default)]
    pub auth_response_headers: Vec<String>,

    /// Keep `X-Forwarded-*` headers the client already sent instead of
    /// overwriting them.
    #[serde(default)]
    pub trust_forward_header: bool,
}

pub struct ForwardAuthFactory;

#[async_trait]
impl MiddlewareFactory for ForwardAuthFactory {
    type Options = ForwardAuthOptions;

    fn provides(&self) -> &'static str {
        TYPE_NAME
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new(vec![
            Field::required("address", FieldKind::String).pattern("^https?://"),
            Field::optional("authResponseHeaders", FieldKind::StringList),
            Field::optional("trustForwardHeader", FieldKind::Bool),
        ])
    }

    async fn create(
        &self,
        name: &str,
        route: &RouteHandle,
        options: ForwardAuthOptions,
    ) -> Result<Arc<dyn Middleware>, MiddlewareInitError> {
        let parsed = url::Url::parse(&options.address)
            .map_err(|e| MiddlewareInitError::with_source("invalid address", e))?;
        if parsed.host_str().is_none() {
            return Err(MiddlewareInitError::new("address has no host"));
        }
        let address = options
            .address
            .parse::<Uri>()
            .map_err(|e| MiddlewareInitError::with_source("invalid address", e))?;

        let auth_response_headers = options
            .auth_response_headers
            .iter()
            .map(|h| {
                HeaderName::from_bytes(h.as_bytes())
                    .map_err(|_| MiddlewareInitError::new(format!("invalid header name '{h}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Arc::new(ForwardAuth {
            name: name.to_string(),
            address,
            auth_response_headers,
            trust_forward_header: options.trust_forward_header,
            client: route.client().clone(),
            timeout: route.timeout(),
        }))
    }
}

pub struct ForwardAuth {
    name: String,
    address: Uri,
    auth_response_headers: Vec<HeaderName>,
    trust_forward_header: bool,
    client: HttpClient,
    timeout: Duration,
}

impl ForwardAuth {
    fn auth_headers(&self, ctx: &RequestContext) -> HeaderMap {
        let mut headers = ctx.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::CONTENT_TYPE);

        let uri = ctx
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str())
            .to_string();
        let forwarded = [
            ("x-forwarded-method", Some(ctx.method.to_string())),
            (
                "x-forwarded-proto",
                Some(ctx.uri.scheme_str().unwrap_or("http").to_string()),
            ),
            ("x-forwarded-host", ctx.host().map(str::to_string)),
            ("x-forwarded-uri", Some(uri)),
            ("x-forwarded-for", Some(ctx.client_addr.ip().to_string())),
        ];
        for (name, value) in forwarded {
            if self.trust_forward_header && headers.contains_key(name) {
                continue;
            }
            match value.and_then(|v| HeaderValue::from_str(&v).ok()) {
                Some(value) => {
                    headers.insert(name, value);
                }
                None => {
                    headers.remove(name);
                }
            }
        }
        headers
    }
}

#[async_trait]
impl Middleware for ForwardAuth {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, mut ctx: RequestContext, next: Next<'_>) -> Response {
        let mut builder = hyper::Request::builder()
            .method(hyper::Method::GET)
            .uri(self.address.clone());
        for (key, value) in &self.auth_headers(&ctx) {
            builder = builder.header(key, value);
        }
        let request = match builder.body(Full::default()) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(middleware = %self.name, error = %e, "failed to build auth request");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let response = match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(
                    correlation_id = %ctx.correlation_id,
                    middleware = %self.name,
                    address = %self.address,
                    error = %e,
                    "auth server unreachable"
                );
                return StatusCode::BAD_GATEWAY.into_response();
            }
            Err(_) => {
                tracing::warn!(
                    correlation_id = %ctx.correlation_id,
                    middleware = %self.name,
                    address = %self.address,
                    "auth server timed out"
                );
                return StatusCode::GATEWAY_TIMEOUT.into_response();
            }
        };

        let status = response.status();
        let mut headers = response.headers().clone();

        if status.is_success() {
            for name in &self.auth_response_headers {
                let name_str = name.as_str();
                ctx.state.set_request_header(name_str, "", Position::Append);
                for value in headers.get_all(name) {
                    if let Ok(value) = value.to_str() {
                        ctx.state.set_request_header(name_str, value, Position::Append);
                    }
                }
            }
            return next.run(ctx).await;
        }

        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            middleware = %self.name,
            status = status.as_u16(),
            "auth server denied request"
        );
        let body = match response.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(middleware = %self.name, error = %e, "auth response body read failed");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };
        strip_response_hop_by_hop(&mut headers);
        let mut out = Response::new(Body::from(body));
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        out
    }
}
