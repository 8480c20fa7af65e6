//! Portico is an HTTP reverse-proxy gateway.
//!
//! Each request arriving on an entrypoint runs through that entrypoint's
//! middleware chain, is matched against the mounted routers (`Host` and
//! `PathPrefix` rules, highest priority first), runs through the winning
//! router's chain, and is forwarded to one server of the router's service.
//! Routers, middlewares and services come from the config file or from a
//! flat label map, and are rebuilt and hot-swapped when either changes.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate,
//!   decode, health).
//! - [`config`] -- Configuration loading, validation, and hot-reloading via
//!   the [`ConfigSource`](config::ConfigSource) trait.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`labels`] -- Flat `root.a.b[0]` label maps decoded into dynamic
//!   configuration.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`middleware`] -- Middleware factories, their option schemas, and the
//!   type-keyed [`Registry`](middleware::registry::Registry).
//! - [`pipeline`] -- Request context, `Next`-style chain execution, deferred
//!   upstream/downstream modifiers, and forwarding to the backend.
//! - [`proxy`] -- Axum handler bridging a listener to its compiled entrypoint.
//! - [`routing`] -- Rule parsing, chain building, and per-entrypoint dispatch.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod labels;
pub mod logging;
pub mod middleware;
pub mod pipeline;
pub mod proxy;
pub mod routing;
pub mod server;
