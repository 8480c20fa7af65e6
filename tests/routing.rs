//! End-to-end routing: rule matching, middleware chains, router isolation
//! and forwarding through a live gateway.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use common::{config, get_json, service, spawn_backend, TestGateway};
use portico::error::MiddlewareInitError;
use portico::middleware::registry::Registry;
use portico::middleware::schema::{Field, FieldKind, OptionsSchema};
use portico::middleware::{MiddlewareFactory, RouteHandle};
use portico::pipeline::{Middleware, Next, RequestContext};

#[tokio::test]
async fn headers_middleware_decorates_request_and_response() {
    let backend = spawn_backend("one").await;
    let gateway = TestGateway::start(config(json!({
        "entrypoints": [{ "name": "web", "address": "127.0.0.1:0" }],
        "routers": [{
            "name": "api",
            "rule": "PathPrefix('/api')",
            "middlewares": ["add-header"],
            "service": "backend",
        }],
        "middlewares": [{
            "name": "add-header",
            "type": "headers",
            "options": {
                "requestHeaders": { "X-Gateway": "portico" },
                "responseHeaders": { "X-Served-By": "portico" },
            },
        }],
        "services": [service("backend", backend)],
    })))
    .await;

    let resp = reqwest::get(gateway.url("web", "/api/users")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-served-by"], "portico");
    assert!(resp.headers().contains_key("x-correlation-id"));

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["path"], "/api/users");
    assert_eq!(body["headers"]["x-gateway"], "portico");
    assert!(body["headers"]["x-forwarded-for"]
        .as_str()
        .unwrap()
        .contains("127.0.0.1"));

    let (status, _) = get_json(&gateway.url("web", "/other")).await;
    assert_eq!(status, 404);

    gateway.stop();
}

#[tokio::test]
async fn chained_path_rewrites_reach_backend() {
    let backend = spawn_backend("one").await;
    let gateway = TestGateway::start(config(json!({
        "entrypoints": [{ "name": "web", "address": "127.0.0.1:0" }],
        "routers": [{
            "name": "api",
            "rule": "PathPrefix('/v1')",
            "middlewares": ["drop-version", "add-internal"],
            "service": "backend",
        }],
        "middlewares": [
            {
                "name": "drop-version",
                "type": "replacePathRegex",
                "options": { "regex": "^/v1/(.*)", "replacement": "/$1" },
            },
            {
                "name": "add-internal",
                "type": "addPrefix",
                "options": { "prefix": "/internal" },
            },
        ],
        "services": [service("backend", backend)],
    })))
    .await;

    let (status, body) = get_json(&gateway.url("web", "/v1/users?page=2")).await;
    assert_eq!(status, 200);
    assert_eq!(body["path"], "/internal/users?page=2");
    assert_eq!(body["headers"]["x-replaced-path"], "/v1/users");

    gateway.stop();
}

#[tokio::test]
async fn broken_router_does_not_affect_others() {
    let backend = spawn_backend("one").await;
    let gateway = TestGateway::start(config(json!({
        "entrypoints": [{ "name": "web", "address": "127.0.0.1:0" }],
        "routers": [
            {
                "name": "good",
                "rule": "PathPrefix('/good')",
                "service": "backend",
            },
            {
                "name": "broken",
                "rule": "PathPrefix('/broken')",
                "middlewares": ["mystery"],
                "service": "backend",
            },
            {
                "name": "bad-rule",
                "rule": "Path('/exact')",
                "service": "backend",
            },
        ],
        "middlewares": [{ "name": "mystery", "type": "doesNotExist" }],
        "services": [service("backend", backend)],
    })))
    .await;

    {
        let loaded = gateway.state.config.read().await;
        assert_eq!(loaded.gateway.mounted_count(), 1);
        assert_eq!(loaded.gateway.failed_count(), 2);
        let report = &loaded.gateway.reports()[0];
        assert_eq!(report.mounted, vec!["good"]);
        let failed: Vec<&str> = report.failed.iter().map(|f| f.router.as_str()).collect();
        assert!(failed.contains(&"broken"));
        assert!(failed.contains(&"bad-rule"));
    }

    let (status, _) = get_json(&gateway.url("web", "/good")).await;
    assert_eq!(status, 200);
    let (status, _) = get_json(&gateway.url("web", "/broken")).await;
    assert_eq!(status, 404);

    gateway.stop();
}

#[tokio::test]
async fn priority_and_host_rules_pick_the_router() {
    let one = spawn_backend("one").await;
    let two = spawn_backend("two").await;
    let three = spawn_backend("three").await;
    let gateway = TestGateway::start(config(json!({
        "entrypoints": [{ "name": "web", "address": "127.0.0.1:0" }],
        "routers": [
            { "name": "catch-all", "rule": "PathPrefix('/')", "service": "one" },
            { "name": "api", "rule": "PathPrefix('/api')", "service": "two" },
            {
                "name": "tenant",
                "rule": "Host('tenant.local')",
                "priority": 100,
                "service": "three",
            },
        ],
        "services": [service("one", one), service("two", two), service("three", three)],
    })))
    .await;

    let (_, body) = get_json(&gateway.url("web", "/anything")).await;
    assert_eq!(body["backend"], "one");

    let (_, body) = get_json(&gateway.url("web", "/api/x")).await;
    assert_eq!(body["backend"], "two");

    let body: serde_json::Value = reqwest::Client::new()
        .get(gateway.url("web", "/api/x"))
        .header("host", "tenant.local")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["backend"], "three");
    assert_eq!(body["headers"]["host"], "tenant.local");

    gateway.stop();
}

#[tokio::test]
async fn routers_are_scoped_to_their_entrypoints() {
    let backend = spawn_backend("one").await;
    let gateway = TestGateway::start(config(json!({
        "entrypoints": [
            { "name": "public", "address": "127.0.0.1:0" },
            { "name": "admin", "address": "127.0.0.1:0" },
        ],
        "routers": [
            {
                "name": "dashboard",
                "rule": "PathPrefix('/dashboard')",
                "entrypoints": ["admin"],
                "service": "backend",
            },
            { "name": "site", "rule": "PathPrefix('/')", "service": "backend" },
        ],
        "services": [service("backend", backend)],
    })))
    .await;

    let (_, body) = get_json(&gateway.url("admin", "/dashboard")).await;
    assert_eq!(body["backend"], "one");

    // On `public` only the catch-all router exists.
    let loaded = gateway.state.config.read().await;
    let public = loaded.gateway.entrypoint("public").unwrap();
    let names: Vec<&str> = public.routers().routes().map(|r| r.name()).collect();
    assert_eq!(names, vec!["site"]);
    drop(loaded);

    gateway.stop();
}

#[tokio::test]
async fn entry_middlewares_run_before_matching() {
    let backend = spawn_backend("one").await;
    let gateway = TestGateway::start(config(json!({
        "entrypoints": [{
            "name": "web",
            "address": "127.0.0.1:0",
            "middlewares": ["auth"],
        }],
        "routers": [{ "name": "api", "rule": "PathPrefix('/api')", "service": "backend" }],
        "middlewares": [{
            "name": "auth",
            "type": "basicAuth",
            "options": {
                "users": ["admin:2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"],
                "headerField": "X-Auth-User",
            },
        }],
        "services": [service("backend", backend)],
    })))
    .await;

    // Rejected even where no router would match.
    let (status, _) = get_json(&gateway.url("web", "/nowhere")).await;
    assert_eq!(status, 401);

    let body: serde_json::Value = reqwest::Client::new()
        .get(gateway.url("web", "/api"))
        .basic_auth("admin", Some("secret"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["headers"]["x-auth-user"], "admin");

    gateway.stop();
}

#[tokio::test]
async fn unreachable_server_is_bad_gateway() {
    let gateway = TestGateway::start(config(json!({
        "entrypoints": [{ "name": "web", "address": "127.0.0.1:0" }],
        "routers": [{ "name": "api", "rule": "PathPrefix('/')", "service": "dead" }],
        "services": [{ "name": "dead", "servers": [{ "host": "127.0.0.1", "port": 1 }] }],
    })))
    .await;

    let (status, _) = get_json(&gateway.url("web", "/")).await;
    assert_eq!(status, 502);

    gateway.stop();
}

/// A third-party middleware type answering every request itself.
struct MaintenanceFactory;

#[derive(Deserialize)]
struct MaintenanceOptions {
    message: String,
}

struct Maintenance {
    name: String,
    message: String,
}

#[async_trait]
impl Middleware for Maintenance {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _ctx: RequestContext, _next: Next<'_>) -> Response {
        (StatusCode::SERVICE_UNAVAILABLE, self.message.clone()).into_response()
    }
}

#[async_trait]
impl MiddlewareFactory for MaintenanceFactory {
    type Options = MaintenanceOptions;

    fn provides(&self) -> &'static str {
        "maintenance"
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new(vec![Field::required("message", FieldKind::String)])
    }

    async fn create(
        &self,
        name: &str,
        _route: &RouteHandle,
        options: MaintenanceOptions,
    ) -> Result<Arc<dyn Middleware>, MiddlewareInitError> {
        Ok(Arc::new(Maintenance {
            name: name.to_string(),
            message: options.message,
        }))
    }
}

#[tokio::test]
async fn custom_registry_types_are_used() {
    let backend = spawn_backend("one").await;
    let mut registry = Registry::new();
    registry.register(MaintenanceFactory).unwrap();
    assert!(registry.register(MaintenanceFactory).is_err());

    let gateway = TestGateway::start_with(
        config(json!({
            "entrypoints": [{ "name": "web", "address": "127.0.0.1:0" }],
            "routers": [
                {
                    "name": "down",
                    "rule": "PathPrefix('/down')",
                    "middlewares": ["closed"],
                    "service": "backend",
                },
                {
                    "name": "headers",
                    "rule": "PathPrefix('/headers')",
                    "middlewares": ["builtin"],
                    "service": "backend",
                },
            ],
            "middlewares": [
                {
                    "name": "closed",
                    "type": "maintenance",
                    "options": { "message": "back soon" },
                },
                // Not registered in this registry.
                { "name": "builtin", "type": "headers" },
            ],
            "services": [service("backend", backend)],
        })),
        registry,
    )
    .await;

    let resp = reqwest::get(gateway.url("web", "/down")).await.unwrap();
    assert_eq!(resp.status(), 503);
    assert_eq!(resp.text().await.unwrap(), "back soon");

    let (status, _) = get_json(&gateway.url("web", "/headers")).await;
    assert_eq!(status, 404);

    gateway.stop();
}
