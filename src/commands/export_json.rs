//! Export-json command handler - Run the batch and dump portfolios as JSON

use crate::cli::{ExportJsonArgs, OutputFormat};
use crate::commands::{prepare_run, to_pretty_json, CommandContext};
use crate::error::{PortfolioError, Result};
use crate::export::{write_portfolios_json, write_portfolios_json_file};
use crate::source::SqliteSnapshot;

/// Run the export-json command
///
/// Nothing is published. Without `--output` the JSON array itself is the
/// command output.
pub fn run_export_json(args: &ExportJsonArgs, ctx: &CommandContext) -> Result<String> {
    let run = prepare_run(&args.pipeline, ctx)?;
    let mut source = SqliteSnapshot::new(&args.pipeline.snapshot);
    let batch = run.pipeline.run(&mut source, run.standardizer.as_ref());
    run.finish();
    let batch = batch?;

    let Some(ref path) = args.output else {
        let mut buf = Vec::new();
        write_portfolios_json(&batch.rows, &mut buf)?;
        return String::from_utf8(buf)
            .map_err(|e| PortfolioError::export(format!("Invalid UTF-8 in export: {}", e)));
    };

    write_portfolios_json_file(&batch.rows, path)?;
    Ok(match ctx.format {
        OutputFormat::Json => format!(
            "{}\n",
            to_pretty_json(&serde_json::json!({
                "_type": "export_json",
                "path": path.display().to_string(),
                "portfolios": batch.rows.len(),
            }))
        ),
        OutputFormat::Text => format!(
            "Wrote {} portfolios to {}\n",
            batch.rows.len(),
            path.display()
        ),
    })
}
