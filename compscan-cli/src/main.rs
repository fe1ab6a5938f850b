//! compscan -- component detection scanner CLI entry point

mod cli;
mod commands;
mod error;
mod output;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use compscan_core::config::{CompscanConfig, GeneralConfig};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let general = load_general(&cli.config).await;
    init_logging(cli.log_level.as_deref(), &general);
    compscan_core::metrics::describe_all();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Best-effort read of `[general]` for logging setup. Subcommands load
/// (and validate) the full configuration themselves; a missing or broken
/// file here just means default logging.
async fn load_general(config_path: &Path) -> GeneralConfig {
    match CompscanConfig::from_file(config_path).await {
        Ok(config) => config.general,
        Err(_) => GeneralConfig::default(),
    }
}

/// Logs go to stderr so JSON report output on stdout stays parseable.
/// Level precedence: --log-level flag, then RUST_LOG, then
/// `[general] log_level`. Format follows `[general] log_format`.
fn init_logging(flag_level: Option<&str>, general: &GeneralConfig) {
    let filter = match flag_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&general.log_level)),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if general.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Scan(args) => commands::scan::execute(args, &cli.config, &writer).await,
        Commands::Detectors(args) => commands::detectors::execute(args, &writer),
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}
