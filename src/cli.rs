//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::config::StandardizationMode;

/// Landlord portfolio builder for HPD registration data
#[derive(Parser, Debug)]
#[command(name = "portfoliograph")]
#[command(
    about = "Clusters HPD registration contacts into landlord portfolios and publishes the portfolio table and search index"
)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (applies to all commands)
    #[arg(short, long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Show a spinner per pipeline phase
    #[arg(long, global = true)]
    pub progress: bool,
}

impl Cli {
    /// Configuration file named by the subcommand, if any
    pub fn config_path(&self) -> Option<&Path> {
        match &self.command {
            Commands::Build(args) => args.pipeline.config.as_deref(),
            Commands::ExportJson(args) => args.pipeline.config.as_deref(),
            Commands::Config(ConfigArgs {
                operation: ConfigOperation::Show { config },
            }) => config.as_deref(),
        }
    }
}

/// Available subcommands for portfoliograph
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full batch and publish the portfolio table and search index
    #[command(visible_alias = "b")]
    Build(BuildArgs),

    /// Run the batch and write the portfolios as JSON only
    ExportJson(ExportJsonArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

/// Snapshot and tuning options shared by build and export-json
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// SQLite snapshot with hpd_registrations and hpd_contacts
    #[arg(long, value_name = "DB", env = "PORTFOLIOGRAPH_SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Configuration file (TOML); defaults apply when missing
    #[arg(long, value_name = "TOML", env = "PORTFOLIOGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reference date for the registration expiration window (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub as_of: Option<String>,

    /// Split portfolios with more unique BBLs than this
    #[arg(long, value_name = "N")]
    pub max_size: Option<usize>,

    /// Community detection resolution
    #[arg(long, value_name = "R")]
    pub resolution: Option<f64>,

    /// Maximum landlord_names length per search index record
    #[arg(long, value_name = "L")]
    pub max_record_len: Option<usize>,

    /// Business address standardization
    #[arg(long, value_enum, value_name = "MODE")]
    pub standardize: Option<StandardizationMode>,
}

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Portfolio table output (SQLite)
    #[arg(long, value_name = "DB", env = "PORTFOLIOGRAPH_TABLE_OUT")]
    pub table_out: PathBuf,

    /// Search index feed output (JSON lines)
    #[arg(long, value_name = "JSONL", env = "PORTFOLIOGRAPH_INDEX_OUT")]
    pub index_out: PathBuf,

    /// Also write the portfolios as a JSON array
    #[arg(long, value_name = "FILE")]
    pub json_out: Option<PathBuf>,
}

/// Arguments for the export-json command
#[derive(Args, Debug)]
pub struct ExportJsonArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Output file (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub operation: ConfigOperation,
}

#[derive(Subcommand, Debug)]
pub enum ConfigOperation {
    /// Print the effective configuration
    Show {
        /// Configuration file (TOML)
        #[arg(long, value_name = "TOML", env = "PORTFOLIOGRAPH_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    #[value(alias = "pretty")]
    Text,
    /// JSON for machine parsing
    Json,
}
