//! Pipeline command handlers
//!
//! Runs the pipeline (or one of its phases) and prints the result.

use colored::*;
use gantry_core::{ExecutionContext, PipelineOutcome, ScanPhaseOutcome};
use gantry_runner::{Pipeline, PipelineError};

/// Run the full pipeline
pub async fn run(pipeline: &Pipeline, ctx: &ExecutionContext) -> Result<(), PipelineError> {
    let outcome = pipeline.run(ctx).await?;
    print_outcome(&outcome);
    Ok(())
}

/// Run the scan/report phase only
pub async fn scan(pipeline: &Pipeline, ctx: &ExecutionContext) -> Result<(), PipelineError> {
    let outcome = pipeline.scan_and_report(ctx).await?;
    print_scan(&outcome);
    Ok(())
}

/// Run the build/publish phase only
pub async fn build(pipeline: &Pipeline, ctx: &ExecutionContext) -> Result<(), PipelineError> {
    let published = pipeline.build_and_push(ctx).await?;
    println!(
        "{} Image successfully pushed to {}",
        "✓".green().bold(),
        published.to_string().cyan()
    );
    Ok(())
}

/// Print the outcome of a full run
fn print_outcome(outcome: &PipelineOutcome) {
    let message = outcome.message();
    let mut lines = message.lines();
    if let Some(published) = lines.next() {
        println!("{} {}", "✓".green().bold(), published);
    }
    for line in lines {
        if outcome.has_warnings() {
            println!("{} {}", "!".yellow().bold(), line.yellow());
        } else {
            println!("{} {}", "✓".green().bold(), line);
        }
    }

    let elapsed = outcome.finished_at - outcome.started_at;
    println!(
        "  {}",
        format!(
            "Invocation {} finished in {}s",
            outcome.invocation_id,
            elapsed.num_seconds()
        )
        .dimmed()
    );
}

/// Print the scan phase line
fn print_scan(scan: &ScanPhaseOutcome) {
    match scan {
        ScanPhaseOutcome::Reported(_) => println!("{} {}", "✓".green().bold(), scan.summary()),
        ScanPhaseOutcome::Warned(_) => {
            println!("{} {}", "!".yellow().bold(), scan.summary().yellow())
        }
    }
}
