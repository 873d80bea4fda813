//! Gantry CLI
//!
//! Entry point of a CI invocation: reads the configuration from flags and the
//! environment, runs the requested pipeline and maps its result to the exit
//! status (0 success, 1 build failure, 2 configuration error, 124 timeout).

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use commands::{Commands, handle_command};
use config::Config;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Gantry CI pipeline: scan, report, build and publish", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.config.log_level) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        return ExitCode::from(2);
    }

    match handle_command(cli.command, cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e.to_string().red());
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

/// Initialize logging to stderr; stdout carries the result summary
fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("gantry={}", level))
            .with_context(|| format!("Invalid log level '{}'", level))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to initialize logging")
}
