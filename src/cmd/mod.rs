//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`init`], [`validate`], [`decode`], or
//! [`health`]. Each handler lives in its own submodule.

pub mod decode;
pub mod health;
pub mod init;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::GatewayError;

pub async fn dispatch(cli: Cli) -> Result<(), GatewayError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Init(ref args)) => init::execute(args),
        Some(Commands::Validate(ref args)) => validate::execute(args).await,
        Some(Commands::Decode(ref args)) => decode::execute(args),
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  portico v{version}: HTTP reverse-proxy gateway\n\n  \
         No command provided. To get started:\n\n    \
         portico init                    Generate a starter config\n    \
         portico run                     Start the gateway (auto-detects ./portico.yaml)\n    \
         portico run -c gateway.yaml     Start with a specific config file\n    \
         portico --help                  See all commands and options\n"
    );
}
