//! Config command handler - Show the effective configuration

use crate::cli::{ConfigArgs, ConfigOperation, OutputFormat};
use crate::commands::{load_config, to_pretty_json, CommandContext};
use crate::error::{PortfolioError, Result};

/// Run the config command
pub fn run_config(args: &ConfigArgs, ctx: &CommandContext) -> Result<String> {
    match &args.operation {
        ConfigOperation::Show { config } => {
            let config = load_config(config.as_deref())?;
            match ctx.format {
                OutputFormat::Json => {
                    let value = serde_json::to_value(&config).map_err(|e| {
                        PortfolioError::config(format!("Failed to serialize config: {}", e))
                    })?;
                    Ok(format!("{}\n", to_pretty_json(&value)))
                }
                OutputFormat::Text => config.to_toml(),
            }
        }
    }
}
