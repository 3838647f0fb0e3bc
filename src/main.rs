//! portfoliograph CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use portfoliograph::commands::{
    load_config, run_build, run_config, run_export_json, CommandContext,
};
use portfoliograph::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

/// RUST_LOG wins; otherwise `-v` means debug, else the configured level
fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        // Config errors are reported by the command itself.
        load_config(cli.config_path())
            .map(|config| config.logging.level)
            .unwrap_or_else(|_| "info".to_string())
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("portfoliograph={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> portfoliograph::Result<String> {
    let ctx = CommandContext::from_cli(cli.format, cli.verbose, cli.progress);

    match &cli.command {
        Commands::Build(args) => run_build(args, &ctx),
        Commands::ExportJson(args) => run_export_json(args, &ctx),
        Commands::Config(args) => run_config(args, &ctx),
    }
}
