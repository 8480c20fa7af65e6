//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate, decode, health, init), and their
//! associated argument structs. Every `run` flag has an environment
//! variable equivalent for container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "portico",
    version,
    about = "HTTP reverse-proxy gateway",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        portico init                         Create a starter config\n  \
        portico run                          Start with ./portico.yaml\n  \
        portico run -c gateway.yaml          Start with a specific config\n  \
        portico validate gateway.yaml        Check a config and its routers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start every configured entrypoint
    Run(Box<RunArgs>),

    /// Generate a starter config file
    Init(InitArgs),

    /// Validate a config file and build its routers without serving
    Validate(ValidateArgs),

    /// Decode a label file into dynamic configuration JSON
    Decode(DecodeArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        portico run                                     Auto-detect config\n  \
        portico run -c gateway.yaml                     Specific config file\n  \
        portico run -c gateway.yaml --pretty -l debug   Local dev mode\n  \
        portico run --health-addr 127.0.0.1:9090        Expose GET /health")]
pub struct RunArgs {
    /// Config file path (.yaml, .json, .toml)
    #[arg(short, long, env = "PORTICO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Config file used when the primary one cannot be loaded
    #[arg(long, env = "PORTICO_FALLBACK_CONFIG")]
    pub fallback_config: Option<PathBuf>,

    /// Address of the health listener (disabled when unset)
    #[arg(long, env = "PORTICO_HEALTH_ADDR")]
    pub health_addr: Option<String>,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Upstream request timeout in milliseconds
    #[arg(
        long,
        env = "REQUEST_TIMEOUT_MS",
        default_value_t = 5000,
        help_heading = "Tuning"
    )]
    pub timeout: u64,

    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = 1_048_576,
        help_heading = "Tuning"
    )]
    pub max_body: usize,

    /// Config refresh interval in seconds
    #[arg(
        long,
        env = "POLL_INTERVAL_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..),
        help_heading = "Tuning"
    )]
    pub poll_interval: u64,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        portico init                          Quick start config (yaml)\n  \
        portico init -f toml -o gateway.toml  TOML format")]
pub struct InitArgs {
    /// Output format
    #[arg(short, long, default_value = "yaml")]
    pub format: ConfigFormat,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Config file to validate
    #[arg(default_value = "portico.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        portico decode labels.json                      Root 'portico'\n  \
        portico decode labels.json --root edge          Custom root\n  \
        portico decode labels.json --filter portico.routers.")]
pub struct DecodeArgs {
    /// JSON object file with the flat label map
    pub labels: PathBuf,

    /// Root segment every label must start with
    #[arg(long, default_value = "portico")]
    pub root: String,

    /// Only decode labels starting with this prefix (repeatable)
    #[arg(long = "filter")]
    pub filters: Vec<String>,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the health listener of a running instance
    #[arg(default_value = "http://localhost:9090")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Exit non-zero when some routers failed to mount
    #[arg(long)]
    pub strict: bool,

    /// Give up after this many milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub timeout: u64,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_decode_filters() {
        let cli = Cli::parse_from([
            "portico",
            "decode",
            "labels.json",
            "--filter",
            "portico.routers.",
            "--filter",
            "portico.services.",
        ]);
        let Some(Commands::Decode(args)) = cli.command else {
            panic!("expected decode");
        };
        assert_eq!(args.root, "portico");
        assert_eq!(args.filters.len(), 2);
    }

    #[test]
    fn poll_interval_must_be_positive() {
        assert!(Cli::try_parse_from(["portico", "run", "--poll-interval", "0"]).is_err());
    }
}
