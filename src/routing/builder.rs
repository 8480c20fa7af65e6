//! Compiles router and entrypoint specs into mounted chains.
//!
//! Every router builds on its own. Its middlewares are resolved in
//! declared order and instantiated concurrently; the router is mounted only
//! when all of them succeed. A router that fails is reported with its
//! identity and left out, the others are unaffected. The entry chain of an
//! entrypoint follows the same discipline, but its failure fails the whole
//! entrypoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, try_join_all};
use serde::Serialize;
use tokio::sync::watch;

use super::balancer::{selector_for, ServerSelector};
use super::entrypoint::EntrypointTable;
use super::route::Route;
use super::rule::Rule;
use crate::config::model::{DynamicConfiguration, EntrypointSpec, RouterSpec, ServiceSpec};
use crate::error::{BuildError, GatewayError};
use crate::middleware::registry::Registry;
use crate::middleware::RouteHandle;
use crate::pipeline::forward::Forwarder;
use crate::pipeline::Middleware;
use crate::server::HttpClient;

/// Runtime resources handed to everything the builder creates.
#[derive(Clone)]
pub struct BuildContext {
    client: HttpClient,
    timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BuildContext {
    #[must_use]
    pub fn new(client: HttpClient, timeout: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            client,
            timeout,
            shutdown,
        }
    }

    fn route_handle(&self, owner: &str) -> RouteHandle {
        RouteHandle::new(
            owner,
            self.client.clone(),
            self.timeout,
            self.shutdown.clone(),
        )
    }
}

/// What happened to the routers of one entrypoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub entrypoint: String,
    pub mounted: Vec<String>,
    pub failed: Vec<RouterFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterFailure {
    pub router: String,
    pub error: String,
}

type ServiceEntry = (Arc<ServiceSpec>, Arc<dyn ServerSelector>);

pub struct ChainBuilder<'a> {
    registry: &'a Registry,
    config: &'a DynamicConfiguration,
    context: &'a BuildContext,
    /// One selector per service, shared by every router targeting it.
    services: HashMap<&'a str, ServiceEntry>,
}

impl<'a> ChainBuilder<'a> {
    #[must_use]
    pub fn new(
        registry: &'a Registry,
        config: &'a DynamicConfiguration,
        context: &'a BuildContext,
    ) -> Self {
        let services = config
            .services
            .iter()
            .map(|service| {
                (
                    service.name.as_str(),
                    (
                        Arc::new(service.clone()),
                        selector_for(service.load_balancer),
                    ),
                )
            })
            .collect();

        Self {
            registry,
            config,
            context,
            services,
        }
    }

    /// Resolve `names` in order and instantiate them concurrently. The
    /// first failure aborts the whole list.
    pub async fn build_middlewares(
        &self,
        owner: &str,
        names: &[String],
    ) -> Result<Vec<Arc<dyn Middleware>>, BuildError> {
        let specs = names
            .iter()
            .map(|name| {
                self.config
                    .middleware(name)
                    .ok_or_else(|| BuildError::UnresolvedMiddleware {
                        middleware: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let route = self.context.route_handle(owner);
        try_join_all(
            specs
                .into_iter()
                .map(|spec| self.registry.instantiate(spec, &route)),
        )
        .await
    }

    pub async fn build_router(&self, spec: &RouterSpec) -> Result<Route, BuildError> {
        let rule = Rule::parse(&spec.rule)?;
        let (service, selector) =
            self.services
                .get(spec.service.as_str())
                .ok_or_else(|| BuildError::UnresolvedService {
                    service: spec.service.clone(),
                })?;

        let middlewares = self.build_middlewares(&spec.name, &spec.middlewares).await?;

        let forwarder = Forwarder::new(
            spec.name.clone(),
            Arc::clone(service),
            Arc::clone(selector),
            self.context.client.clone(),
            self.context.timeout,
        );
        let mut route = Route::new(spec.name.clone(), spec.effective_priority(), Arc::new(forwarder));
        route.match_rule(rule);
        for middleware in middlewares {
            route.use_middleware(middleware);
        }
        Ok(route)
    }

    /// Build the entry chain and every router serving `entrypoint`.
    ///
    /// Only an entry chain failure is an error; router failures end up in
    /// the report.
    pub async fn build_entrypoint(
        &self,
        entrypoint: &EntrypointSpec,
    ) -> Result<(EntrypointTable, BuildReport), GatewayError> {
        let entry = self
            .build_middlewares(&entrypoint.name, &entrypoint.middlewares)
            .await
            .map_err(|source| GatewayError::EntrypointBuild {
                entrypoint: entrypoint.name.clone(),
                source,
            })?;

        let routers: Vec<&RouterSpec> = self
            .config
            .routers
            .iter()
            .filter(|router| router.serves_entrypoint(&entrypoint.name))
            .collect();
        let results = join_all(routers.iter().map(|spec| self.build_router(spec))).await;

        let mut report = BuildReport {
            entrypoint: entrypoint.name.clone(),
            ..BuildReport::default()
        };
        let mut routes = Vec::with_capacity(results.len());
        for (spec, result) in routers.into_iter().zip(results) {
            match result {
                Ok(route) => {
                    tracing::debug!(
                        entrypoint = %entrypoint.name,
                        router = %spec.name,
                        rule = %spec.rule,
                        middlewares = ?route.middleware_names(),
                        priority = route.priority(),
                        "router mounted"
                    );
                    report.mounted.push(spec.name.clone());
                    routes.push(route);
                }
                Err(e) => {
                    tracing::error!(
                        entrypoint = %entrypoint.name,
                        router = %spec.name,
                        error = %e,
                        "router not mounted"
                    );
                    report.failed.push(RouterFailure {
                        router: spec.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok((
            EntrypointTable::new(entrypoint.name.clone(), entry, routes),
            report,
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::model::{LoadBalancerKind, MiddlewareSpec, Protocol, ServerSpec};
    use crate::server::build_http_client;

    fn context() -> (BuildContext, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (BuildContext::new(build_http_client(), Duration::from_secs(5), rx), tx)
    }

    fn router(name: &str, rule: &str, middlewares: &[&str]) -> RouterSpec {
        RouterSpec {
            name: name.into(),
            rule: rule.into(),
            entrypoints: Vec::new(),
            middlewares: middlewares.iter().map(ToString::to_string).collect(),
            service: "backend".into(),
            priority: None,
        }
    }

    fn dynamic() -> DynamicConfiguration {
        DynamicConfiguration {
            routers: vec![
                router("good", "PathPrefix('/good')", &["hdr"]),
                router("unknown-type", "PathPrefix('/bad')", &["hdr", "jwt"]),
                router("missing-mw", "PathPrefix('/missing')", &["nope"]),
                router("bad-rule", "Path('/x')", &[]),
            ],
            middlewares: vec![
                MiddlewareSpec {
                    name: "hdr".into(),
                    kind: "headers".into(),
                    options: json!({"requestHeaders": {"X-Test": "1"}}),
                },
                MiddlewareSpec {
                    name: "jwt".into(),
                    kind: "jwt".into(),
                    options: json!({}),
                },
            ],
            services: vec![ServiceSpec {
                name: "backend".into(),
                servers: vec![ServerSpec {
                    host: "127.0.0.1".into(),
                    port: 9000,
                    protocol: Protocol::Http,
                    tls_options: None,
                }],
                verbose: false,
                load_balancer: LoadBalancerKind::First,
            }],
        }
    }

    fn entrypoint(middlewares: &[&str]) -> EntrypointSpec {
        EntrypointSpec {
            name: "web".into(),
            address: "127.0.0.1:0".into(),
            middlewares: middlewares.iter().map(ToString::to_string).collect(),
        }
    }

    #[tokio::test]
    async fn failing_routers_are_isolated() {
        let registry = Registry::with_builtins();
        let config = dynamic();
        let (ctx, _tx) = context();
        let builder = ChainBuilder::new(&registry, &config, &ctx);

        let (table, report) = builder.build_entrypoint(&entrypoint(&[])).await.unwrap();

        assert_eq!(report.mounted, vec!["good"]);
        let failed: Vec<&str> = report.failed.iter().map(|f| f.router.as_str()).collect();
        assert_eq!(failed, vec!["unknown-type", "missing-mw", "bad-rule"]);
        assert!(report.failed[0].error.contains("unknown type 'jwt'"));
        assert_eq!(table.routers().len(), 1);
    }

    #[tokio::test]
    async fn unresolved_service_fails_router() {
        let registry = Registry::with_builtins();
        let mut config = dynamic();
        config.routers[0].service = "ghost".into();
        let (ctx, _tx) = context();
        let builder = ChainBuilder::new(&registry, &config, &ctx);

        let err = builder.build_router(&config.routers[0]).await.err().unwrap();
        assert!(matches!(err, BuildError::UnresolvedService { service } if service == "ghost"));
    }

    #[tokio::test]
    async fn empty_rule_or_service_only_fails_that_router() {
        let registry = Registry::with_builtins();
        let mut config = dynamic();
        config.routers.truncate(1);
        config.routers.push(router("no-rule", "", &[]));
        let mut no_service = router("no-service", "PathPrefix('/x')", &[]);
        no_service.service = String::new();
        config.routers.push(no_service);
        let (ctx, _tx) = context();
        let builder = ChainBuilder::new(&registry, &config, &ctx);

        let (table, report) = builder.build_entrypoint(&entrypoint(&[])).await.unwrap();

        assert_eq!(report.mounted, vec!["good"]);
        let failed: Vec<&str> = report.failed.iter().map(|f| f.router.as_str()).collect();
        assert_eq!(failed, vec!["no-rule", "no-service"]);
        assert_eq!(table.routers().len(), 1);
    }

    #[tokio::test]
    async fn entry_chain_failure_fails_the_entrypoint() {
        let registry = Registry::with_builtins();
        let config = dynamic();
        let (ctx, _tx) = context();
        let builder = ChainBuilder::new(&registry, &config, &ctx);

        let err = builder
            .build_entrypoint(&entrypoint(&["jwt"]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::EntrypointBuild { entrypoint, .. } if entrypoint == "web"));
    }

    #[tokio::test]
    async fn middlewares_keep_declared_order() {
        let registry = Registry::with_builtins();
        let mut config = dynamic();
        config.middlewares.push(MiddlewareSpec {
            name: "strip".into(),
            kind: "stripPrefix".into(),
            options: json!({"prefixes": ["/good"]}),
        });
        config.routers[0].middlewares = vec!["strip".into(), "hdr".into()];
        let (ctx, _tx) = context();
        let builder = ChainBuilder::new(&registry, &config, &ctx);

        let route = builder.build_router(&config.routers[0]).await.unwrap();
        assert_eq!(route.middleware_names(), vec!["strip", "hdr"]);
        assert_eq!(route.priority(), "PathPrefix('/good')".len() as i64);
    }
}
