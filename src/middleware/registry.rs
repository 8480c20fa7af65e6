//! The middleware type registry.
//!
//! [`Registry`] maps a type name to its factory. It is built once at
//! startup, usually with [`Registry::with_builtins`], and passed by
//! reference to the chain builder; tests build their own with fake types.
//! Behind the registry each factory is type-erased so that the options
//! pipeline (coerce, validate, deserialize, create) is shared.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    basic_auth, forward_auth, headers, path, redirect, MiddlewareFactory, RouteHandle,
};
use crate::config::model::MiddlewareSpec;
use crate::error::{BuildError, GatewayError, ValidationError};
use crate::pipeline::Middleware;

#[async_trait]
trait ErasedFactory: Send + Sync {
    fn check(&self, name: &str, options: Value) -> Result<Value, BuildError>;

    async fn instantiate(
        &self,
        name: &str,
        route: &RouteHandle,
        options: Value,
    ) -> Result<Arc<dyn Middleware>, BuildError>;
}

#[async_trait]
impl<F: MiddlewareFactory> ErasedFactory for F {
    fn check(&self, name: &str, options: Value) -> Result<Value, BuildError> {
        let schema = MiddlewareFactory::options_schema(self);
        let options = schema.coerce(options);
        schema
            .validate(&format!("middleware {name}"), &options)
            .map_err(|errors| BuildError::InvalidOptions {
                middleware: name.to_string(),
                errors,
            })?;
        Ok(options)
    }

    async fn instantiate(
        &self,
        name: &str,
        route: &RouteHandle,
        options: Value,
    ) -> Result<Arc<dyn Middleware>, BuildError> {
        let options = self.check(name, options)?;
        let model: F::Options =
            serde_json::from_value(options).map_err(|e| BuildError::InvalidOptions {
                middleware: name.to_string(),
                errors: vec![ValidationError::new(
                    format!("middleware {name}"),
                    "options",
                    e.to_string(),
                )],
            })?;

        self.create(name, route, model)
            .await
            .map_err(|source| BuildError::MiddlewareInit {
                middleware: name.to_string(),
                source,
            })
    }
}

#[derive(Default)]
pub struct Registry {
    factories: HashMap<&'static str, Box<dyn ErasedFactory>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in middleware type.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert(headers::HeadersFactory);
        registry.insert(path::ReplacePathRegexFactory);
        registry.insert(path::StripPrefixFactory);
        registry.insert(path::AddPrefixFactory);
        registry.insert(redirect::RedirectSchemeFactory);
        registry.insert(basic_auth::BasicAuthFactory);
        registry.insert(forward_auth::ForwardAuthFactory);
        registry
    }

    fn insert<F: MiddlewareFactory>(&mut self, factory: F) {
        self.factories.insert(factory.provides(), Box::new(factory));
    }

    pub fn register<F: MiddlewareFactory>(&mut self, factory: F) -> Result<(), GatewayError> {
        let type_name = factory.provides();
        if self.factories.contains_key(type_name) {
            return Err(GatewayError::DuplicateMiddlewareType(type_name));
        }
        self.insert(factory);
        Ok(())
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.factories.keys().copied().collect();
        types.sort_unstable();
        types
    }

    fn factory(&self, spec: &MiddlewareSpec) -> Result<&dyn ErasedFactory, BuildError> {
        self.factories
            .get(spec.kind.as_str())
            .map(|factory| &**factory)
            .ok_or_else(|| BuildError::UnknownMiddlewareType {
                middleware: spec.name.clone(),
                type_name: spec.kind.clone(),
            })
    }

    /// Resolve the type and validate the options without creating anything.
    pub fn check(&self, spec: &MiddlewareSpec) -> Result<(), BuildError> {
        self.factory(spec)?
            .check(&spec.name, spec.options.clone())
            .map(|_| ())
    }

    pub async fn instantiate(
        &self,
        spec: &MiddlewareSpec,
        route: &RouteHandle,
    ) -> Result<Arc<dyn Middleware>, BuildError> {
        let factory = self.factory(spec)?;
        tracing::debug!(
            middleware = %spec.name,
            type_name = %spec.kind,
            owner = route.owner(),
            "creating middleware"
        );
        factory
            .instantiate(&spec.name, route, spec.options.clone())
            .await
    }
}
