//! Deferred URI and header rewrites.
//!
//! Middlewares queue rewrites on the request's [`RequestPipelineState`]
//! while the request travels down the chain. The forwarding endpoint takes
//! the state apart with [`RequestPipelineState::into_parts`]: path
//! rewrites run first, in queue order, then request header rewrites, and
//! once the upstream response arrives the response header rewrites. The
//! state is consumed by value, so every queue runs exactly once.

use std::collections::VecDeque;
use std::fmt;

use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ModifierError;

pub type PathRewrite = Box<dyn FnOnce(String) -> String + Send>;
pub type HeaderRewrite = Box<dyn FnOnce(&mut HeaderMap) -> Result<(), ModifierError> + Send>;

/// Where a rewrite goes in its queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Position {
    #[default]
    Append,
    /// Run before everything queued so far.
    Prepend,
}

#[derive(Default)]
pub struct RequestPipelineState {
    upstream_path_rewrites: VecDeque<PathRewrite>,
    upstream_header_rewrites: VecDeque<HeaderRewrite>,
    downstream_header_rewrites: VecDeque<HeaderRewrite>,
}

impl fmt::Debug for RequestPipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPipelineState")
            .field("upstream_path_rewrites", &self.upstream_path_rewrites.len())
            .field("upstream_header_rewrites", &self.upstream_header_rewrites.len())
            .field("downstream_header_rewrites", &self.downstream_header_rewrites.len())
            .finish()
    }
}

fn enqueue<T>(queue: &mut VecDeque<T>, item: T, position: Position) {
    match position {
        Position::Append => queue.push_back(item),
        Position::Prepend => queue.push_front(item),
    }
}

impl RequestPipelineState {
    pub fn add_uri_modifier(&mut self, rewrite: impl FnOnce(String) -> String + Send + 'static) {
        self.upstream_path_rewrites.push_back(Box::new(rewrite));
    }

    pub fn add_request_header_modifier(
        &mut self,
        rewrite: impl FnOnce(&mut HeaderMap) -> Result<(), ModifierError> + Send + 'static,
        position: Position,
    ) {
        enqueue(&mut self.upstream_header_rewrites, Box::new(rewrite), position);
    }

    pub fn add_response_header_modifier(
        &mut self,
        rewrite: impl FnOnce(&mut HeaderMap) -> Result<(), ModifierError> + Send + 'static,
        position: Position,
    ) {
        enqueue(&mut self.downstream_header_rewrites, Box::new(rewrite), position);
    }

    /// Shorthand for queueing [`set_header`] on the upstream request.
    pub fn set_request_header(&mut self, name: &str, value: &str, position: Position) {
        self.add_request_header_modifier(set_header(name, value), position);
    }

    /// Shorthand for queueing [`set_header`] on the downstream response.
    pub fn set_response_header(&mut self, name: &str, value: &str, position: Position) {
        self.add_response_header_modifier(set_header(name, value), position);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upstream_path_rewrites.is_empty()
            && self.upstream_header_rewrites.is_empty()
            && self.downstream_header_rewrites.is_empty()
    }

    #[must_use]
    pub fn into_parts(self) -> (UpstreamRewrites, DownstreamRewrites) {
        (
            UpstreamRewrites {
                paths: self.upstream_path_rewrites,
                headers: self.upstream_header_rewrites,
            },
            DownstreamRewrites {
                headers: self.downstream_header_rewrites,
            },
        )
    }
}

pub struct UpstreamRewrites {
    paths: VecDeque<PathRewrite>,
    headers: VecDeque<HeaderRewrite>,
}

impl UpstreamRewrites {
    /// Rewrite `path_and_query` and `headers` in place. The query string is
    /// carried over untouched; only the path goes through the rewrites.
    pub fn apply(
        self,
        path_and_query: &PathAndQuery,
        headers: &mut HeaderMap,
    ) -> Result<PathAndQuery, ModifierError> {
        let path = self
            .paths
            .into_iter()
            .fold(path_and_query.path().to_string(), |path, rewrite| rewrite(path));

        if !path.starts_with('/') {
            return Err(ModifierError::InvalidPath { path });
        }

        let rebuilt = match path_and_query.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.clone(),
        };
        let rewritten = rebuilt
            .parse::<PathAndQuery>()
            .map_err(|_| ModifierError::InvalidPath { path })?;

        for rewrite in self.headers {
            rewrite(headers)?;
        }

        Ok(rewritten)
    }
}

pub struct DownstreamRewrites {
    headers: VecDeque<HeaderRewrite>,
}

impl DownstreamRewrites {
    pub fn apply(self, headers: &mut HeaderMap) -> Result<(), ModifierError> {
        for rewrite in self.headers {
            rewrite(headers)?;
        }
        Ok(())
    }
}

/// Canonical header rewrite. An empty `value` removes every `name` header
/// (nothing happens when there is none); otherwise `value` is appended
/// unless an identical value is already present.
pub fn set_header(
    name: &str,
    value: &str,
) -> impl FnOnce(&mut HeaderMap) -> Result<(), ModifierError> + Send + 'static {
    let name = name.to_string();
    let value = value.to_string();
    move |headers: &mut HeaderMap| {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ModifierError::InvalidHeader { name: name.clone() })?;

        if value.is_empty() {
            headers.remove(&header_name);
            return Ok(());
        }

        let header_value = HeaderValue::from_str(&value)
            .map_err(|_| ModifierError::InvalidHeader { name: name.clone() })?;
        if !headers.get_all(&header_name).iter().any(|v| *v == header_value) {
            headers.append(header_name, header_value);
        }
        Ok(())
    }
}
