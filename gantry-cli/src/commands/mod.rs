//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod pipeline;

use clap::Subcommand;
use gantry_client::GitHubClient;
use gantry_runner::{Pipeline, PipelineError, PodmanEngine};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Scan and report, then build and publish the image
    Run,
    /// Run the scan and post its output to the pull request only
    Scan,
    /// Build and publish the image only
    Build,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
///
/// # Returns
/// Ok when the command succeeded, possibly with scan warnings
pub async fn handle_command(command: Commands, config: Config) -> Result<(), PipelineError> {
    let reporter = GitHubClient::with_base_url(config.api_url.clone());
    let ctx = config.into_context()?;
    let pipeline = Pipeline::new(Arc::new(PodmanEngine::new()), Arc::new(reporter));

    info!(
        "Invocation {}: {} (deadline in {}s)",
        ctx.invocation_id,
        command.name(),
        ctx.remaining().as_secs()
    );

    let result = match command {
        Commands::Run => pipeline::run(&pipeline, &ctx).await,
        Commands::Scan => pipeline::scan(&pipeline, &ctx).await,
        Commands::Build => pipeline::build(&pipeline, &ctx).await,
    };

    match &result {
        Ok(()) => info!("Invocation {} finished", ctx.invocation_id),
        Err(e) => error!(
            "Invocation {} failed with exit status {}: {}",
            ctx.invocation_id,
            e.exit_code(),
            e
        ),
    }

    result
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Run => "run",
            Commands::Scan => "scan",
            Commands::Build => "build",
        }
    }
}
