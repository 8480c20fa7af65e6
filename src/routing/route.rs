//! A mounted router: match conditions plus its compiled chain.

use std::sync::Arc;

use axum::response::Response;

use super::rule::Rule;
use crate::pipeline::{Endpoint, Middleware, Next, RequestContext};

pub struct Route {
    name: String,
    priority: i64,
    conditions: Vec<Rule>,
    middlewares: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Endpoint>,
}

impl Route {
    /// A route with no conditions matches every request.
    #[must_use]
    pub fn new(name: impl Into<String>, priority: i64, endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            name: name.into(),
            priority,
            conditions: Vec::new(),
            middlewares: Vec::new(),
            endpoint,
        }
    }

    pub fn match_host(&mut self, host: impl Into<String>) -> &mut Self {
        self.conditions.push(Rule::Host(host.into()));
        self
    }

    pub fn match_path_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.conditions.push(Rule::PathPrefix(prefix.into()));
        self
    }

    pub fn match_rule(&mut self, rule: Rule) -> &mut Self {
        match rule {
            Rule::Host(host) => self.match_host(host),
            Rule::PathPrefix(prefix) => self.match_path_prefix(prefix),
        }
    }

    /// Append `middleware` to the chain; it runs after those added before.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn priority(&self) -> i64 {
        self.priority
    }

    #[must_use]
    pub fn middleware_names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    #[must_use]
    pub fn matches(&self, ctx: &RequestContext) -> bool {
        let host = ctx.host();
        let path = ctx.path();
        self.conditions.iter().all(|rule| rule.matches(host, path))
    }

    pub async fn handle(&self, ctx: RequestContext) -> Response {
        Next::new(&self.middlewares, self.endpoint.as_ref())
            .run(ctx)
            .await
    }
}
