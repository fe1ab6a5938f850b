//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Compscan -- software composition analysis scanner.
///
/// Use `compscan <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "compscan", version, about, long_about = None)]
pub struct Cli {
    /// Path to the compscan.toml configuration file.
    #[arg(short, long, default_value = "compscan.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a component scan over a source directory.
    Scan(ScanArgs),

    /// List registered detectors.
    Detectors(DetectorsArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- scan ----

/// Run a one-shot component scan on a project directory.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory to scan (default: current directory).
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Directory names or glob patterns to exclude from the walk (repeatable).
    #[arg(long = "exclude")]
    pub exclusions: Vec<String>,

    /// Run only detectors with these ids (repeatable). Lifts experimental detectors.
    #[arg(long = "detector")]
    pub detectors: Vec<String>,

    /// Run only detectors in these categories (repeatable).
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Maximum concurrent file processing per detector (0 = unbounded).
    #[arg(long)]
    pub max_threads: Option<usize>,

    /// Per-detector timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Leave detector-created files (go.sum etc.) in place after the scan.
    #[arg(long)]
    pub no_cleanup: bool,

    /// Log cleanup deletions without actually deleting anything.
    #[arg(long)]
    pub dry_run: bool,
}

// ---- detectors ----

/// List registered detectors and their file patterns.
#[derive(Args, Debug)]
pub struct DetectorsArgs {
    /// Filter by category (npm, rust, go, ...).
    #[arg(long)]
    pub category: Option<String>,
}

// ---- config ----

/// Manage compscan configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, scan, detectors).
        #[arg(long)]
        section: Option<String>,
    },
}
