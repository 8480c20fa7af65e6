//! Router rule parsing and matching.
//!
//! Exactly two rule forms are understood, both with a case-sensitive
//! keyword and a single-quoted literal:
//!
//! - `Host('<value>')` matches when the request host equals `<value>`.
//! - `PathPrefix('<value>')` matches when the request path is `<value>` or
//!   continues it at a `/` boundary.

use std::fmt;
use std::str::FromStr;

use crate::error::RuleParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Host(String),
    PathPrefix(String),
}

impl Rule {
    pub fn parse(input: &str) -> Result<Self, RuleParseError> {
        let fail = |reason: &str| RuleParseError {
            rule: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (keyword, rest) = trimmed
            .split_once('(')
            .ok_or_else(|| fail("expected Host('...') or PathPrefix('...')"))?;
        let argument = rest
            .strip_suffix(')')
            .ok_or_else(|| fail("missing closing parenthesis"))?;
        let literal = argument
            .strip_prefix('\'')
            .and_then(|a| a.strip_suffix('\''))
            .ok_or_else(|| fail("argument must be a single-quoted literal"))?;

        if literal.is_empty() {
            return Err(fail("literal cannot be empty"));
        }
        if literal.contains('\'') {
            return Err(fail("literal cannot contain a quote"));
        }

        match keyword {
            "Host" => Ok(Self::Host(literal.to_string())),
            "PathPrefix" if literal.starts_with('/') => Ok(Self::PathPrefix(literal.to_string())),
            "PathPrefix" => Err(fail("path prefix must start with '/'")),
            other => Err(fail(&format!("unknown matcher '{other}'"))),
        }
    }

    /// `host` is the request host exactly as sent (port included).
    #[must_use]
    pub fn matches(&self, host: Option<&str>, path: &str) -> bool {
        match self {
            Self::Host(expected) => host == Some(expected.as_str()),
            Self::PathPrefix(prefix) => path_has_prefix(path, prefix),
        }
    }
}

impl FromStr for Rule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(host) => write!(f, "Host('{host}')"),
            Self::PathPrefix(prefix) => write!(f, "PathPrefix('{prefix}')"),
        }
    }
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}
