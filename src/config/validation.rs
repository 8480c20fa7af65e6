//! Structural configuration validation with detailed error reporting.
//!
//! [`validate`] checks a parsed [`Config`] for errors that make the whole
//! generation unusable: missing or duplicate names, unparseable listen
//! addresses, services without servers. Reference resolution, rule
//! syntax and middleware options are checked later, per router, by the
//! chain builder so that one bad router cannot take down the others.

use std::collections::HashSet;
use std::net::SocketAddr;

use super::model::{Config, DynamicConfiguration};
use crate::error::ValidationError;

/// Validate a listen address. Returns `Ok(())` or a human-readable error.
pub fn validate_address(address: &str) -> Result<(), String> {
    address
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| format!("'{address}' is not a valid socket address"))
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.entrypoints.is_empty() {
        errors.push(ValidationError::new(
            "(root)",
            "entrypoints",
            "at least one entrypoint must be defined",
        ));
    }

    let mut seen = HashSet::new();
    for (i, entrypoint) in config.entrypoints.iter().enumerate() {
        let scope = if entrypoint.name.is_empty() {
            format!("entrypoints[{i}]")
        } else {
            format!("entrypoint {}", entrypoint.name)
        };
        if entrypoint.name.is_empty() {
            errors.push(ValidationError::new(&scope, "name", "name cannot be empty"));
        } else if !seen.insert(entrypoint.name.as_str()) {
            errors.push(ValidationError::new(&scope, "name", "duplicate entrypoint name"));
        }
        if let Err(msg) = validate_address(&entrypoint.address) {
            let error = ValidationError::new(&scope, "address", msg);
            errors.push(if entrypoint.address.starts_with(':') {
                error.with_suggestion(format!("did you mean '0.0.0.0{}'?", entrypoint.address))
            } else {
                error
            });
        }
    }

    if let Some(ref labels) = config.labels {
        if labels.root.is_empty() || labels.root.contains('.') {
            errors.push(ValidationError::new(
                "labels",
                "root",
                "root must be a single non-empty label segment",
            ));
        }
    }

    errors.extend(validate_dynamic(&config.dynamic()));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Structural checks on the hot-reloadable part of the configuration.
#[must_use]
pub fn validate_dynamic(dynamic: &DynamicConfiguration) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for (i, router) in dynamic.routers.iter().enumerate() {
        let scope = named_scope("router", &router.name, "routers", i);
        if router.name.is_empty() {
            errors.push(ValidationError::new(&scope, "name", "name cannot be empty"));
        } else if !seen.insert(router.name.as_str()) {
            errors.push(ValidationError::new(&scope, "name", "duplicate router name"));
        }
    }

    let mut seen = HashSet::new();
    for (i, middleware) in dynamic.middlewares.iter().enumerate() {
        let scope = named_scope("middleware", &middleware.name, "middlewares", i);
        if middleware.name.is_empty() {
            errors.push(ValidationError::new(&scope, "name", "name cannot be empty"));
        } else if !seen.insert(middleware.name.as_str()) {
            errors.push(ValidationError::new(&scope, "name", "duplicate middleware name"));
        }
        if middleware.kind.is_empty() {
            errors.push(ValidationError::new(&scope, "type", "type cannot be empty"));
        }
        if !(middleware.options.is_null() || middleware.options.is_object()) {
            errors.push(ValidationError::new(&scope, "options", "options must be a map"));
        }
    }

    let mut seen = HashSet::new();
    for (i, service) in dynamic.services.iter().enumerate() {
        let scope = named_scope("service", &service.name, "services", i);
        if service.name.is_empty() {
            errors.push(ValidationError::new(&scope, "name", "name cannot be empty"));
        } else if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::new(&scope, "name", "duplicate service name"));
        }
        if service.servers.is_empty() {
            errors.push(ValidationError::new(
                &scope,
                "servers",
                "at least one server must be defined",
            ));
        }
        for (j, server) in service.servers.iter().enumerate() {
            if server.host.is_empty() {
                errors.push(ValidationError::new(
                    &scope,
                    format!("servers[{j}].host"),
                    "host cannot be empty",
                ));
            }
            if server.port == 0 {
                errors.push(ValidationError::new(
                    &scope,
                    format!("servers[{j}].port"),
                    "port must be between 1 and 65535",
                ));
            }
            if server.tls_options.as_deref().is_some_and(str::is_empty) {
                errors.push(ValidationError::new(
                    &scope,
                    format!("servers[{j}].tlsOptions"),
                    "tlsOptions cannot be empty when set",
                ));
            }
        }
    }

    errors
}

fn named_scope(kind: &str, name: &str, list: &str, index: usize) -> String {
    if name.is_empty() {
        format!("{list}[{index}]")
    } else {
        format!("{kind} {name}")
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let mut lines = vec![format!(
        "  {} entrypoints, {} routers, {} middlewares, {} services ({} servers)\n",
        config.entrypoints.len(),
        config.routers.len(),
        config.middlewares.len(),
        config.services.len(),
        config.dynamic().total_servers(),
    )];

    for entrypoint in &config.entrypoints {
        lines.push(format!("  entrypoint {} on {}", entrypoint.name, entrypoint.address));
        if !entrypoint.middlewares.is_empty() {
            lines.push(format!("    middlewares: {}", entrypoint.middlewares.join(", ")));
        }
    }

    for router in &config.routers {
        lines.push(format!(
            "  router {}  {}  -> {} (priority {})",
            router.name,
            router.rule,
            router.service,
            router.effective_priority(),
        ));
        if !router.middlewares.is_empty() {
            lines.push(format!("    middlewares: {}", router.middlewares.join(", ")));
        }
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}
