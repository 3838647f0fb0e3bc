//! Build command handler - Run the batch and publish both artifacts

use crate::cli::{BuildArgs, OutputFormat};
use crate::commands::{banner, prepare_run, to_pretty_json, CommandContext};
use crate::error::Result;
use crate::export::{write_portfolios_json_file, SqlitePortfolioTable};
use crate::pipeline::{BatchStats, PublishReport};
use crate::search_index::JsonLinesIndex;
use crate::source::SqliteSnapshot;

/// Run the build command
pub fn run_build(args: &BuildArgs, ctx: &CommandContext) -> Result<String> {
    let run = prepare_run(&args.pipeline, ctx)?;
    let mut source = SqliteSnapshot::new(&args.pipeline.snapshot);

    let outcome = run
        .pipeline
        .run(&mut source, run.standardizer.as_ref())
        .and_then(|batch| {
            let table = SqlitePortfolioTable::new(&args.table_out)
                .with_batch_size(run.pipeline.config().export.batch_size);
            let mut index = JsonLinesIndex::new(&args.index_out);
            let report = run.pipeline.publish(&batch, &table, &mut index)?;
            if let Some(ref json_out) = args.json_out {
                write_portfolios_json_file(&batch.rows, json_out)?;
            }
            Ok((batch, report))
        });
    run.finish();
    let (batch, report) = outcome?;

    Ok(format_build(&batch.stats, &report, args, ctx))
}

fn format_build(
    stats: &BatchStats,
    report: &PublishReport,
    args: &BuildArgs,
    ctx: &CommandContext,
) -> String {
    match ctx.format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "_type": "build",
                "stats": stats,
                "publish": report,
                "json_out": args.json_out.as_ref().map(|p| p.display().to_string()),
            });
            format!("{}\n", to_pretty_json(&value))
        }
        OutputFormat::Text => {
            let mut output = banner("PORTFOLIO BUILD");
            output.push_str(&format!("rows_read: {}\n", stats.rows_read));
            output.push_str(&format!("contacts: {}\n", stats.contacts_kept));
            if ctx.verbose {
                output.push_str(&format!("  non_owner_dropped: {}\n", stats.non_owner_dropped));
                output.push_str(&format!("  expired_dropped: {}\n", stats.expired_dropped));
                output.push_str(&format!("  superseded_dropped: {}\n", stats.superseded_dropped));
                output.push_str(&format!("  malformed_dropped: {}\n", stats.malformed_dropped));
            }
            output.push_str(&format!("graph: {} nodes, {} edges\n", stats.nodes, stats.edges));
            output.push_str(&format!(
                "components: {} ({} oversized)\n",
                stats.components, stats.oversized_components
            ));
            output.push_str(&format!(
                "portfolios: {} ({} degenerate splits)\n",
                stats.portfolios, stats.degenerate_splits
            ));
            output.push_str(&format!("index_records: {}\n", stats.index_records));
            output.push_str(&format!("fingerprint: {}\n\n", stats.graph_fingerprint));

            output.push_str(&format!(
                "table: {} ({} rows, {} bytes)\n",
                report.table.output_path, report.table.rows_inserted, report.table.file_size_bytes
            ));
            output.push_str(&format!(
                "index: {} ({} records)\n",
                report.index.output_path, report.index.records_published
            ));
            if report.attempts > 1 {
                output.push_str(&format!("publish_attempts: {}\n", report.attempts));
            }
            if let Some(ref json_out) = args.json_out {
                output.push_str(&format!("json: {}\n", json_out.display()));
            }
            output
        }
    }
}
