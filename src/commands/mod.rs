//! Command modules for the portfoliograph CLI
//!
//! Each command module implements a single top-level command:
//! - `build` - Run the batch and publish the portfolio table and search index
//! - `export_json` - Run the batch and write the portfolios as JSON
//! - `config` - Show the effective configuration
//!
//! All command handlers take their respective `Args` struct from `cli.rs`
//! and a shared `CommandContext` for output format, verbosity and progress.

pub mod build;
pub mod config;
pub mod export_json;

pub use build::run_build;
pub use config::run_config;
pub use export_json::run_export_json;

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::{OutputFormat, PipelineArgs};
use crate::config::PipelineConfig;
use crate::error::{PortfolioError, Result};
use crate::pipeline::Pipeline;
use crate::standardize::{standardizer_for, AddressStandardizer};

/// Default configuration file, read when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "portfoliograph.toml";

/// Shared context passed to all command handlers
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// Output format (text or json)
    pub format: OutputFormat,
    /// Show verbose output
    pub verbose: bool,
    /// Show a spinner during pipeline phases
    pub progress: bool,
}

impl CommandContext {
    /// Create a new CommandContext from CLI args
    pub fn from_cli(format: OutputFormat, verbose: bool, progress: bool) -> Self {
        Self {
            format,
            verbose,
            progress,
        }
    }
}

/// Load the config file named on the command line, or the default file
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) if !path.exists() => Err(PortfolioError::config(format!(
            "Config file not found: {}",
            path.display()
        ))),
        Some(path) => PipelineConfig::load_from(path),
        None => PipelineConfig::load_from(Path::new(DEFAULT_CONFIG_FILE)),
    }
}

/// A configured pipeline plus what it needs to run
pub struct PreparedRun {
    pub pipeline: Pipeline,
    pub standardizer: Box<dyn AddressStandardizer>,
    pub spinner: Option<ProgressBar>,
}

impl PreparedRun {
    pub fn finish(&self) {
        if let Some(ref pb) = self.spinner {
            pb.finish_and_clear();
        }
    }
}

/// Apply command-line overrides on top of the config file
pub fn apply_overrides(config: &mut PipelineConfig, args: &PipelineArgs) -> Result<()> {
    if let Some(max_size) = args.max_size {
        config.split.max_size = max_size;
    }
    if let Some(resolution) = args.resolution {
        config.split.resolution = resolution;
    }
    if let Some(max_record_len) = args.max_record_len {
        config.search_index.max_record_len = max_record_len;
    }
    if let Some(mode) = args.standardize {
        config.extract.address_standardization = mode;
    }
    config.validate()
}

pub fn parse_as_of(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        PortfolioError::config(format!("Invalid --as-of date '{}': {}", value, e))
    })
}

/// Build the pipeline for `build` and `export-json`
pub fn prepare_run(args: &PipelineArgs, ctx: &CommandContext) -> Result<PreparedRun> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, args)?;

    let standardizer = standardizer_for(config.extract.address_standardization);
    let mut pipeline = Pipeline::new(config);
    if let Some(ref as_of) = args.as_of {
        pipeline = pipeline.with_as_of(parse_as_of(as_of)?);
    }

    let spinner = ctx.progress.then(phase_spinner);
    if let Some(ref pb) = spinner {
        let pb = pb.clone();
        pipeline = pipeline.with_progress(Box::new(move |phase| {
            pb.set_message(phase.description());
        }));
    }

    Ok(PreparedRun {
        pipeline,
        standardizer,
        spinner,
    })
}

fn phase_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Pretty JSON for command output
pub fn to_pretty_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Banner used at the top of text output
pub fn banner(title: &str) -> String {
    let rule = "═══════════════════════════════════════════════════════";
    format!("{}\n  {}\n{}\n\n", rule, title, rule)
}
