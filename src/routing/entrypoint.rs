//! Per-entrypoint dispatch: the entry chain followed by router matching.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::route::Route;
use crate::pipeline::{Endpoint, Middleware, Next, RequestContext};

/// Mounted routes of one entrypoint, highest priority first.
pub struct RouterTable {
    routes: Vec<Route>,
}

impl RouterTable {
    /// Routes are ordered by priority, descending. The sort is stable so
    /// equal priorities keep declaration order.
    #[must_use]
    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { routes }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

#[async_trait]
impl Endpoint for RouterTable {
    async fn call(&self, mut ctx: RequestContext) -> Response {
        let Some(route) = self.routes.iter().find(|route| route.matches(&ctx)) else {
            tracing::debug!(
                correlation_id = %ctx.correlation_id,
                entrypoint = %ctx.entrypoint,
                host = ?ctx.host(),
                path = %ctx.path(),
                "no router matched"
            );
            return StatusCode::NOT_FOUND.into_response();
        };

        ctx.router = Some(route.name().to_string());
        route.handle(ctx).await
    }
}

pub struct EntrypointTable {
    name: String,
    entry: Vec<Arc<dyn Middleware>>,
    routers: RouterTable,
}

impl EntrypointTable {
    #[must_use]
    pub fn new(name: impl Into<String>, entry: Vec<Arc<dyn Middleware>>, routes: Vec<Route>) -> Self {
        Self {
            name: name.into(),
            entry,
            routers: RouterTable::new(routes),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn routers(&self) -> &RouterTable {
        &self.routers
    }

    /// Run the entry chain, then dispatch to the first matching router.
    pub async fn handle(&self, ctx: RequestContext) -> Response {
        Next::new(&self.entry, &self.routers).run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::http::{HeaderMap, Method, Uri};
    use bytes::Bytes;

    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Endpoint for Named {
        async fn call(&self, ctx: RequestContext) -> Response {
            assert_eq!(ctx.router.as_deref(), Some(self.0));
            (StatusCode::OK, self.0).into_response()
        }
    }

    struct Tag(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Middleware for Tag {
        fn name(&self) -> &str {
            "tag"
        }

        async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Response {
            self.0.lock().unwrap().push(ctx.path().to_string());
            next.run(ctx).await
        }
    }

    fn route(name: &'static str, priority: i64, prefix: &str) -> Route {
        let mut route = Route::new(name, priority, Arc::new(Named(name)));
        route.match_path_prefix(prefix);
        route
    }

    fn context(path: &str) -> RequestContext {
        RequestContext::new(
            "web",
            Method::GET,
            path.parse::<Uri>().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
            "127.0.0.1:1000".parse().unwrap(),
        )
    }

    async fn body(response: Response) -> String {
        use http_body_util::BodyExt;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn highest_priority_wins_and_ties_keep_order() {
        let table = EntrypointTable::new(
            "web",
            Vec::new(),
            vec![
                route("short", 4, "/api"),
                route("long", 10, "/api/v1"),
                route("first-tie", 4, "/"),
            ],
        );

        assert_eq!(body(table.handle(context("/api/v1/x")).await).await, "long");
        assert_eq!(body(table.handle(context("/api/x")).await).await, "short");
        assert_eq!(body(table.handle(context("/web")).await).await, "first-tie");
    }

    #[tokio::test]
    async fn unmatched_request_is_not_found() {
        let table = EntrypointTable::new("web", Vec::new(), vec![route("api", 0, "/api")]);
        let response = table.handle(context("/other")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn entry_chain_runs_before_matching_even_without_match() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tag: Arc<dyn Middleware> = Arc::new(Tag(Arc::clone(&seen)));
        let table = EntrypointTable::new(
            "web",
            vec![tag],
            vec![route("api", 0, "/api")],
        );

        table.handle(context("/api")).await;
        table.handle(context("/other")).await;

        assert_eq!(*seen.lock().unwrap(), vec!["/api", "/other"]);
    }
}
