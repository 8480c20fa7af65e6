//! `portico init`: generate a starter configuration file.
//!
//! Writes a YAML, JSON, or TOML config with one entrypoint, one router
//! behind a short middleware chain, and one service.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::error::GatewayError;

pub fn execute(args: &InitArgs) -> Result<(), GatewayError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("portico.{}", args.format.extension())));

    if output.exists() && !args.force {
        return Err(GatewayError::FileExists { path: output });
    }

    std::fs::write(&output, template(args.format))?;
    println!("Created {}", output.display());
    Ok(())
}

const fn template(format: ConfigFormat) -> &'static str {
    match format {
        ConfigFormat::Yaml => YAML,
        ConfigFormat::Json => JSON,
        ConfigFormat::Toml => TOML,
    }
}

const YAML: &str = r#"# Portico gateway config

entrypoints:
  - name: web
    address: "0.0.0.0:8080"

routers:
  - name: api
    rule: "PathPrefix('/api')"
    middlewares: [strip-api, tag-gateway]
    service: backend

middlewares:
  - name: strip-api
    type: stripPrefix
    options:
      prefixes: ["/api"]
  - name: tag-gateway
    type: headers
    options:
      requestHeaders:
        X-Gateway: portico

services:
  - name: backend
    servers:
      - host: 127.0.0.1
        port: 3000

# Routers, middlewares and services can also come from a flat label file:
# labels:
#   path: labels.json
#   root: portico
"#;

const JSON: &str = r#"{
  "entrypoints": [
    { "name": "web", "address": "0.0.0.0:8080" }
  ],
  "routers": [
    {
      "name": "api",
      "rule": "PathPrefix('/api')",
      "middlewares": ["strip-api", "tag-gateway"],
      "service": "backend"
    }
  ],
  "middlewares": [
    {
      "name": "strip-api",
      "type": "stripPrefix",
      "options": { "prefixes": ["/api"] }
    },
    {
      "name": "tag-gateway",
      "type": "headers",
      "options": { "requestHeaders": { "X-Gateway": "portico" } }
    }
  ],
  "services": [
    {
      "name": "backend",
      "servers": [{ "host": "127.0.0.1", "port": 3000 }]
    }
  ]
}
"#;

const TOML: &str = r#"# Portico gateway config

[[entrypoints]]
name = "web"
address = "0.0.0.0:8080"

[[routers]]
name = "api"
rule = "PathPrefix('/api')"
middlewares = ["strip-api", "tag-gateway"]
service = "backend"

[[middlewares]]
name = "strip-api"
type = "stripPrefix"
options = { prefixes = ["/api"] }

[[middlewares]]
name = "tag-gateway"
type = "headers"
options = { requestHeaders = { X-Gateway = "portico" } }

[[services]]
name = "backend"

[[services.servers]]
host = "127.0.0.1"
port = 3000
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Config;
    use crate::config::validation::validate;

    fn check(config: &Config) {
        assert!(validate(config).is_ok());
        assert_eq!(config.routers[0].middlewares, vec!["strip-api", "tag-gateway"]);
        assert_eq!(config.services[0].servers[0].port, 3000);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_template_is_valid() {
        check(&serde_yml::from_str(YAML).unwrap());
    }

    #[test]
    fn json_template_is_valid() {
        check(&serde_json::from_str(JSON).unwrap());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn toml_template_is_valid() {
        check(&toml::from_str(TOML).unwrap());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let path = std::env::temp_dir().join(format!("portico-init-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{}").unwrap();

        let mut args = InitArgs {
            format: ConfigFormat::Json,
            output: Some(path.clone()),
            force: false,
        };
        assert!(matches!(execute(&args), Err(GatewayError::FileExists { .. })));

        args.force = true;
        execute(&args).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), JSON);
        std::fs::remove_file(&path).unwrap();
    }
}
