//! Path rewriting types: `replacePathRegex`, `stripPrefix` and `addPrefix`.
//!
//! None of them touch [`RequestContext::uri`] directly. They queue a path
//! rewrite, so rewrites from several middlewares compose in chain order and
//! routing keeps seeing the path the client sent. The original path is
//! reported upstream in a header once the rewrite has actually happened.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use regex::Regex;
use serde::Deserialize;

use super::schema::{Field, FieldKind, OptionsSchema};
use super::{MiddlewareFactory, RouteHandle};
use crate::error::{MiddlewareInitError, ModifierError};
use crate::pipeline::{Middleware, Next, Position, RequestContext};

pub const REPLACE_PATH_REGEX: &str = "replacePathRegex";
pub const STRIP_PREFIX: &str = "stripPrefix";
pub const ADD_PREFIX: &str = "addPrefix";

pub const REPLACED_PATH_HEADER: &str = "x-replaced-path";
pub const FORWARDED_PREFIX_HEADER: &str = "x-forwarded-prefix";

/// Queue a header that only appears once the matching path rewrite has run
/// and recorded a value. Queued in front and inserted, so across a chain of
/// rewrites the first one in the chain wins and a client-sent value is
/// replaced.
fn set_header_when_recorded(ctx: &mut RequestContext, name: &'static str, recorded: Arc<OnceLock<String>>) {
    ctx.state.add_request_header_modifier(
        move |headers| {
            let Some(value) = recorded.get() else {
                return Ok(());
            };
            let value = HeaderValue::from_str(value)
                .map_err(|_| ModifierError::InvalidHeader { name: name.to_string() })?;
            headers.insert(HeaderName::from_static(name), value);
            Ok(())
        },
        Position::Prepend,
    );
}

// ---------------------------------------------------------------------------
// replacePathRegex
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplacePathRegexOptions {
    pub regex: String,
    pub replacement: String,
}

pub struct ReplacePathRegexFactory;

#[async_trait]
impl MiddlewareFactory for ReplacePathRegexFactory {
    type Options = ReplacePathRegexOptions;

    fn provides(&self) -> &'static str {
        REPLACE_PATH_REGEX
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new(vec![
            Field::required("regex", FieldKind::Regex),
            Field::required("replacement", FieldKind::String),
        ])
    }

    async fn create(
        &self,
        name: &str,
        _route: &RouteHandle,
        options: ReplacePathRegexOptions,
    ) -> Result<Arc<dyn Middleware>, MiddlewareInitError> {
        let regex = Regex::new(&options.regex)
            .map_err(|e| MiddlewareInitError::with_source("invalid regex", e))?;
        Ok(Arc::new(ReplacePathRegex {
            name: name.to_string(),
            regex,
            replacement: options.replacement,
        }))
    }
}

/// Replaces every match of `regex` in the path with `replacement`
/// (`$1`, `${name}` expand capture groups). A path that does not match is
/// left alone.
pub struct ReplacePathRegex {
    name: String,
    regex: Regex,
    replacement: String,
}

#[async_trait]
impl Middleware for ReplacePathRegex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, mut ctx: RequestContext, next: Next<'_>) -> Response {
        let regex = self.regex.clone();
        let replacement = self.replacement.clone();
        let original = Arc::new(OnceLock::new());
        let recorded = Arc::clone(&original);

        ctx.state.add_uri_modifier(move |path| {
            if !regex.is_match(&path) {
                return path;
            }
            let replaced = regex.replace_all(&path, replacement.as_str()).into_owned();
            let _ = recorded.set(path);
            replaced
        });
        set_header_when_recorded(&mut ctx, REPLACED_PATH_HEADER, original);

        next.run(ctx).await
    }
}

// ---------------------------------------------------------------------------
// stripPrefix
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StripPrefixOptions {
    pub prefixes: Vec<String>,
}

pub struct StripPrefixFactory;

#[async_trait]
impl MiddlewareFactory for StripPrefixFactory {
    type Options = StripPrefixOptions;

    fn provides(&self) -> &'static str {
        STRIP_PREFIX
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new(vec![
            Field::required("prefixes", FieldKind::StringList).pattern("^/"),
        ])
    }

    async fn create(
        &self,
        name: &str,
        _route: &RouteHandle,
        options: StripPrefixOptions,
    ) -> Result<Arc<dyn Middleware>, MiddlewareInitError> {
        if options.prefixes.is_empty() {
            return Err(MiddlewareInitError::new("at least one prefix is required"));
        }
        Ok(Arc::new(StripPrefix {
            name: name.to_string(),
            prefixes: Arc::new(options.prefixes),
        }))
    }
}

pub struct StripPrefix {
    name: String,
    prefixes: Arc<Vec<String>>,
}

/// Remove the first of `prefixes` the path starts with. The result always
/// keeps a leading slash.
fn strip_prefix<'a>(path: &str, prefixes: &'a [String]) -> Option<(&'a str, String)> {
    prefixes.iter().find_map(|prefix| {
        let rest = path.strip_prefix(prefix.as_str())?;
        let stripped = if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{rest}")
        };
        Some((prefix.as_str(), stripped))
    })
}

#[async_trait]
impl Middleware for StripPrefix {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, mut ctx: RequestContext, next: Next<'_>) -> Response {
        let prefixes = Arc::clone(&self.prefixes);
        let stripped_prefix = Arc::new(OnceLock::new());
        let recorded = Arc::clone(&stripped_prefix);

        ctx.state.add_uri_modifier(move |path| match strip_prefix(&path, &prefixes) {
            Some((prefix, stripped)) => {
                let _ = recorded.set(prefix.trim_end_matches('/').to_string());
                stripped
            }
            None => path,
        });
        set_header_when_recorded(&mut ctx, FORWARDED_PREFIX_HEADER, stripped_prefix);

        next.run(ctx).await
    }
}

// ---------------------------------------------------------------------------
// addPrefix
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddPrefixOptions {
    pub prefix: String,
}

pub struct AddPrefixFactory;

#[async_trait]
impl MiddlewareFactory for AddPrefixFactory {
    type Options = AddPrefixOptions;

    fn provides(&self) -> &'static str {
        ADD_PREFIX
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new(vec![Field::required("prefix", FieldKind::String).pattern("^/")])
    }

    async fn create(
        &self,
        name: &str,
        _route: &RouteHandle,
        options: AddPrefixOptions,
    ) -> Result<Arc<dyn Middleware>, MiddlewareInitError> {
        Ok(Arc::new(AddPrefix {
            name: name.to_string(),
            prefix: options.prefix.trim_end_matches('/').to_string(),
        }))
    }
}

pub struct AddPrefix {
    name: String,
    prefix: String,
}

#[async_trait]
impl Middleware for AddPrefix {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, mut ctx: RequestContext, next: Next<'_>) -> Response {
        let prefix = self.prefix.clone();
        ctx.state.add_uri_modifier(move |path| format!("{prefix}{path}"));
        next.run(ctx).await
    }
}
