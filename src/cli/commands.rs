//! Command execution for the envlab CLI.
//!
//! Wires the parsed arguments into a pipeline run, then renders the issue
//! report and optional per-item summaries to the console.

use crate::cli::args::Args;
use crate::error::Result;
use crate::models::{ProcessingResult, RawBatch};
use crate::processor::IngestPipeline;
use crate::processor::streaming::CsvChunkSource;
use crate::report::{FormattedIssue, IssueReport};
use colored::*;
use std::fs::File;
use tracing::{debug, info};

/// Run the ingestion command end to end
pub async fn run(args: Args) -> Result<ProcessingResult> {
    setup_logging(&args)?;

    info!("Starting envlab engine");
    debug!("Command line arguments: {:?}", args);

    args.validate()?;
    let config = args.to_engine_config();
    let pipeline = IngestPipeline::with_default_schema(config)?;

    let file = File::open(&args.input)?;
    let result = if args.streaming {
        info!("Processing {} on the streaming path", args.input.display());
        pipeline.run_csv_stream(file).await?
    } else {
        info!("Processing {} on the parallel path", args.input.display());
        let batch = load_batch(file, args.chunk_size)?;
        pipeline.run_batch(batch).await?
    };

    print_report(&IssueReport::from_result(&result));

    if args.summarize {
        if let Some(buffer) = &result.data {
            match pipeline.summarize(buffer, "test_item", "result_value") {
                Ok(summaries) => print_summaries(&summaries),
                Err(e) => eprintln!("{} {}", "Summary unavailable:".yellow(), e),
            }
        }
    }

    Ok(result)
}

/// Materialize an entire CSV file as one batch for the parallel path
fn load_batch(file: File, chunk_size: usize) -> Result<RawBatch> {
    let mut source = CsvChunkSource::new(file, chunk_size)?;
    let headers = source.headers().to_vec();
    let mut rows = Vec::new();
    while let Some(chunk) = source.next_chunk()? {
        rows.extend(chunk);
    }
    Ok(RawBatch::new(headers, rows))
}

fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("envlab_engine={}", args.get_log_level())));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
    Ok(())
}

fn print_report(report: &IssueReport) {
    let headline = format!(
        "Processed {}/{} rows ({:.1}% success)",
        report.processed_rows, report.total_rows, report.success_rate
    );
    if report.success {
        println!("{}", headline.green().bold());
    } else {
        println!("{}", headline.red().bold());
    }

    print_section("CRITICAL", &report.critical, |s| s.red().bold());
    print_section("ERROR", &report.errors, |s| s.red());
    print_section("WARNING", &report.warnings, |s| s.yellow());
    print_section("INFO", &report.info, |s| s.cyan());
}

fn print_section(label: &str, issues: &[FormattedIssue], paint: fn(&str) -> ColoredString) {
    if issues.is_empty() {
        return;
    }
    println!("\n{} ({})", paint(label), issues.len());
    for issue in issues {
        match &issue.location {
            Some(location) => println!("  - [{}] {}", location.dimmed(), issue.message),
            None => println!("  - {}", issue.message),
        }
        if let Some(fix) = &issue.suggested_fix {
            println!("    {} {}", "fix:".dimmed(), fix);
        }
    }
}

fn print_summaries(summaries: &[crate::summary::GroupSummary]) {
    println!("\n{}", "Per-item result summary".bold());
    println!(
        "{:<24} {:>8} {:>12} {:>12} {:>12}",
        "test item", "count", "mean", "min", "max"
    );
    for summary in summaries {
        println!(
            "{:<24} {:>8} {:>12.4} {:>12.4} {:>12.4}",
            summary.group, summary.count, summary.mean, summary.min, summary.max
        );
    }
}
