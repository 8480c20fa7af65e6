//! `headers`: add, replace or remove request and response headers.
//!
//! ```yaml
//! - name: add-header
//!   type: headers
//!   options:
//!     requestHeaders:
//!       X-Source: portico
//!       Cookie: ""          # empty value removes the header
//!     responseHeaders:
//!       Server: ""
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use serde::Deserialize;

use super::schema::{Field, FieldKind, OptionsSchema};
use super::{MiddlewareFactory, RouteHandle};
use crate::error::MiddlewareInitError;
use crate::pipeline::{Middleware, Next, Position, RequestContext};

pub const TYPE_NAME: &str = "headers";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct HeadersOptions {
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,

    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
}

pub struct HeadersFactory;

#[async_trait]
impl MiddlewareFactory for HeadersFactory {
    type Options = HeadersOptions;

    fn provides(&self) -> &'static str {
        TYPE_NAME
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new(vec![
            Field::optional("requestHeaders", FieldKind::StringMap),
            Field::optional("responseHeaders", FieldKind::StringMap),
        ])
    }

    async fn create(
        &self,
        name: &str,
        _route: &RouteHandle,
        options: HeadersOptions,
    ) -> Result<Arc<dyn Middleware>, MiddlewareInitError> {
        let request = check_headers(options.request_headers)?;
        let response = check_headers(options.response_headers)?;
        Ok(Arc::new(Headers {
            name: name.to_string(),
            request,
            response,
        }))
    }
}

fn check_headers(
    headers: BTreeMap<String, String>,
) -> Result<Vec<(String, String)>, MiddlewareInitError> {
    for (key, value) in &headers {
        if HeaderName::from_bytes(key.as_bytes()).is_err() {
            return Err(MiddlewareInitError::new(format!("invalid header name '{key}'")));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(MiddlewareInitError::new(format!(
                "invalid value for header '{key}'"
            )));
        }
    }
    Ok(headers.into_iter().collect())
}

pub struct Headers {
    name: String,
    request: Vec<(String, String)>,
    response: Vec<(String, String)>,
}

#[async_trait]
impl Middleware for Headers {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, mut ctx: RequestContext, next: Next<'_>) -> Response {
        for (key, value) in &self.request {
            ctx.state.set_request_header(key, value, Position::Append);
        }
        for (key, value) in &self.response {
            ctx.state.set_response_header(key, value, Position::Append);
        }
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::model::MiddlewareSpec;
    use crate::middleware::registry::Registry;
    use crate::middleware::testing;

    async fn build(options: serde_json::Value) -> Arc<dyn Middleware> {
        let (handle, _shutdown) = testing::handle();
        let spec = MiddlewareSpec {
            name: "hdr".into(),
            kind: TYPE_NAME.into(),
            options,
        };
        Registry::with_builtins()
            .instantiate(&spec, &handle)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn queues_request_and_response_headers() {
        let middleware = build(json!({
            "requestHeaders": {"X-Test": "1", "Cookie": ""},
            "responseHeaders": {"Server": ""},
        }))
        .await;

        let mut capture = testing::Capture::default();
        capture.response_headers.insert("server", "backend".parse().unwrap());
        let ctx = testing::request("/a", &[("cookie", "session=1")]);

        let response = testing::run(middleware, ctx, &capture).await;
        let (_, upstream_headers) = capture.upstream().unwrap();

        assert_eq!(upstream_headers.get("x-test").unwrap(), "1");
        assert!(upstream_headers.get("cookie").is_none());
        assert!(response.headers().get("server").is_none());
    }

    #[tokio::test]
    async fn invalid_header_name_fails_construction() {
        let (handle, _shutdown) = testing::handle();
        let result = HeadersFactory
            .create(
                "hdr",
                &handle,
                HeadersOptions {
                    request_headers: BTreeMap::from([("bad name".to_string(), "1".to_string())]),
                    response_headers: BTreeMap::new(),
                },
            )
            .await;
        assert!(result.is_err());
    }
}
