//! Unified error types for Portico.
//!
//! Defines [`GatewayError`] (the main crate error enum), [`ValidationError`]
//! for structural config failures, and the narrower error enums raised by
//! each stage of the pipeline: label decoding ([`DecodeError`]), rule
//! parsing ([`RuleParseError`]), per-router chain construction
//! ([`BuildError`]), middleware instantiation ([`MiddlewareInitError`]) and
//! request-time modifier application ([`ModifierError`]).

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ValidationError {
    /// What the error is attached to, e.g. `router api` or `(root)`.
    pub scope: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(scope: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}: {} - {}", self.scope, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

pub fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("No config source found.\n\n  {hint}")]
    NoConfigSource { hint: String },

    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Label decode failed: {0}")]
    ConfigDecode(#[from] DecodeError),

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Middleware type '{0}' is registered twice")]
    DuplicateMiddlewareType(&'static str),

    #[error("Entrypoint '{entrypoint}' cannot start: {source}")]
    EntrypointBuild {
        entrypoint: String,
        #[source]
        source: BuildError,
    },

    #[error("{failed} router(s) failed to build")]
    RouterBuild { failed: usize },

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}

/// A malformed label set. Any one of these aborts the whole decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("label '{key}' contains an empty segment")]
    EmptySegment { key: String },

    #[error("label '{key}' has segment '{segment}' starting with '['")]
    LeadingBracket { key: String, segment: String },

    #[error("label '{key}' has malformed index segment '{segment}'")]
    BadIndex { key: String, segment: String },

    #[error("label '{key}' is not rooted at '{root}'")]
    RootMismatch { key: String, root: String },

    #[error("'{path}' has both a value and nested labels")]
    ValueAndChildren { path: String },

    #[error("unknown label '{path}'")]
    UnknownField { path: String },

    #[error("'{path}': {message}")]
    InvalidValue { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid rule \"{rule}\": {reason}")]
pub struct RuleParseError {
    pub rule: String,
    pub reason: String,
}

/// Failure raised by a middleware factory while constructing an instance.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct MiddlewareInitError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MiddlewareInitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Router-level (or entrypoint-level) construction failure.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error(transparent)]
    RuleParse(#[from] RuleParseError),

    #[error("middleware '{middleware}' is not defined")]
    UnresolvedMiddleware { middleware: String },

    #[error("service '{service}' is not defined")]
    UnresolvedService { service: String },

    #[error("middleware '{middleware}' has unknown type '{type_name}'")]
    UnknownMiddlewareType {
        middleware: String,
        type_name: String,
    },

    #[error("middleware '{middleware}' has invalid options:\n{}", format_errors(.errors))]
    InvalidOptions {
        middleware: String,
        errors: Vec<ValidationError>,
    },

    #[error("middleware '{middleware}' failed to initialise: {source}")]
    MiddlewareInit {
        middleware: String,
        #[source]
        source: MiddlewareInitError,
    },
}

/// Raised while applying queued rewrites at the forwarding boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ModifierError {
    #[error("rewritten path '{path}' is not a valid URI path")]
    InvalidPath { path: String },

    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },
}
