//! `portico validate`: check a configuration file for errors.
//!
//! Loads the file the same way `run` does (labels included), then compiles
//! it with the built-in middleware registry without binding any listener.
//! Structural errors and routers that would fail to mount are both
//! reported, in either human-readable text or machine-readable JSON.

use std::time::Duration;

use tokio::sync::watch;

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::sources;
use crate::config::validation;
use crate::config::ConfigSource;
use crate::error::GatewayError;
use crate::middleware::registry::Registry;
use crate::routing::builder::BuildContext;
use crate::routing::Gateway;
use crate::server::build_http_client;

pub async fn execute(args: &ValidateArgs) -> Result<(), GatewayError> {
    let path = &args.config;
    let display = path.display().to_string();

    let config = match sources::for_path(path)?.load().await {
        Ok((config, _)) => config,
        Err(GatewayError::ConfigValidation { errors }) => {
            match args.format {
                ValidateFormat::Text => {
                    eprintln!("\u{2717} {display} has {} errors\n", errors.len());
                    for error in &errors {
                        eprintln!("{error}");
                    }
                }
                ValidateFormat::Json => {
                    let json_errors: Vec<serde_json::Value> = errors
                        .iter()
                        .map(|e| {
                            serde_json::json!({
                                "scope": e.scope,
                                "field": e.field,
                                "message": e.message,
                                "suggestion": e.suggestion,
                            })
                        })
                        .collect();
                    println!(
                        "{}",
                        serde_json::json!({
                            "valid": false,
                            "errors": json_errors,
                        })
                    );
                }
            }
            return Err(GatewayError::ConfigValidation { errors });
        }
        Err(e) => return Err(e),
    };

    // Dry-run build: timers started by middlewares stop when this sender
    // drops at the end of the command.
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let context = BuildContext::new(build_http_client(), Duration::from_secs(5), shutdown_rx);
    let gateway = Gateway::compile(&config, &Registry::with_builtins(), &context).await?;

    match args.format {
        ValidateFormat::Text => {
            let report = validation::format_validation_report(&display, &config);
            if gateway.failed_count() == 0 {
                println!("\u{2713} {report}");
            } else {
                println!("{report}\n");
                for report in gateway.reports() {
                    for failure in &report.failed {
                        eprintln!(
                            "\u{2717} router {} on {}: {}",
                            failure.router, report.entrypoint, failure.error
                        );
                    }
                }
            }
        }
        ValidateFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "valid": gateway.failed_count() == 0,
                    "entrypoints": config.entrypoints.len(),
                    "routers": config.routers.len(),
                    "reports": gateway.reports(),
                })
            );
        }
    }

    if gateway.failed_count() > 0 {
        return Err(GatewayError::RouterBuild {
            failed: gateway.failed_count(),
        });
    }

    Ok(())
}
