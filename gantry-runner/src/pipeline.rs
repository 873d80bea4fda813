//! Pipeline orchestrator
//!
//! Sequences the two phases of an invocation and folds them into one result:
//!
//! ```text
//! Init ──(invalid context)──────────────────────────────► Err(Config)
//!   │
//!   ▼
//! ScanPhase: run scan job → report output    (failures become warnings)
//!   │
//!   ▼
//! BuildPhase: build image → publish image    (failures are fatal)
//!   │
//!   ▼
//! Finalized: Ok(PipelineOutcome) or Err(Engine / Timeout)
//! ```
//!
//! Both phases run under the context's deadline. The phases share no state;
//! the build phase decides the overall result on its own, unless the deadline
//! already expired during the scan phase, in which case the build never starts.

use chrono::Utc;
use gantry_client::ScanReporter;
use gantry_core::{
    BuildRecipe, ConfigError, ExecutionContext, Phase, PipelineOutcome, PublishedRef,
    ScanJob, ScanPhaseOutcome, ScanReport, ScanWarning, ScanWarningKind,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::timeout_at;
use tracing::{error, info, warn};

use crate::engine::{ContainerEngine, EngineError};
use crate::steps::StepRunner;

/// Exit status for a successful invocation
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status when the build phase failed
pub const EXIT_BUILD_FAILED: i32 = 1;
/// Exit status for configuration errors
pub const EXIT_CONFIG: i32 = 2;
/// Standard timeout exit code
pub const EXIT_TIMEOUT: i32 = 124;

/// Fatal failure of an invocation
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required parameter is missing or malformed; no phase ran
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The container engine failed in a fatal phase
    #[error("{phase} phase failed: {source}")]
    Engine {
        phase: Phase,
        #[source]
        source: EngineError,
    },

    /// The deadline expired while the named phase was in flight
    #[error("{phase} phase timed out: deadline exceeded")]
    Timeout { phase: Phase },
}

impl PipelineError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => EXIT_CONFIG,
            PipelineError::Engine { .. } => EXIT_BUILD_FAILED,
            PipelineError::Timeout { .. } => EXIT_TIMEOUT,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Timeout { .. })
    }

    /// Phase the error happened in; None for configuration errors
    pub fn phase(&self) -> Option<Phase> {
        match self {
            PipelineError::Config(_) => None,
            PipelineError::Engine { phase, .. } | PipelineError::Timeout { phase } => Some(*phase),
        }
    }
}

/// Orchestrates the scan/report and build/publish phases
pub struct Pipeline {
    steps: StepRunner,
    reporter: Arc<dyn ScanReporter>,
}

impl Pipeline {
    /// Creates a pipeline from its two external collaborators
    pub fn new(engine: Arc<dyn ContainerEngine>, reporter: Arc<dyn ScanReporter>) -> Self {
        Self {
            steps: StepRunner::new(engine),
            reporter,
        }
    }

    /// Runs the full pipeline: scan and report, then build and publish
    ///
    /// # Returns
    /// The outcome when the image was published (scan problems attached as a
    /// warning), or the first fatal error.
    pub async fn run(&self, ctx: &ExecutionContext) -> Result<PipelineOutcome, PipelineError> {
        let started_at = Utc::now();
        info!("Starting pipeline {}", ctx.invocation_id);

        if let Err(e) = ctx.validate() {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }

        let scan = self.scan_phase(ctx).await;
        if ctx.remaining().is_zero() {
            error!("Deadline expired during the scan phase, build not started");
            return Err(PipelineError::Timeout { phase: Phase::Scan });
        }

        let published = self.build_phase(ctx).await?;

        let outcome = PipelineOutcome {
            invocation_id: ctx.invocation_id,
            published,
            scan,
            started_at,
            finished_at: Utc::now(),
        };

        if outcome.has_warnings() {
            warn!(
                "Pipeline {} succeeded with warnings",
                outcome.invocation_id
            );
        } else {
            info!("Pipeline {} succeeded", outcome.invocation_id);
        }

        Ok(outcome)
    }

    /// Runs only the scan/report phase
    ///
    /// Scan and report failures come back as [`ScanPhaseOutcome::Warned`];
    /// only an invalid context is an error.
    pub async fn scan_and_report(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<ScanPhaseOutcome, PipelineError> {
        ctx.validate_scan()?;
        Ok(self.scan_phase(ctx).await)
    }

    /// Runs only the build/publish phase
    pub async fn build_and_push(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<PublishedRef, PipelineError> {
        ctx.validate_build()?;
        self.build_phase(ctx).await
    }

    async fn scan_phase(&self, ctx: &ExecutionContext) -> ScanPhaseOutcome {
        info!("Scan phase started");

        let outcome = match timeout_at(ctx.deadline, self.scan_and_report_inner(ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => ScanPhaseOutcome::Warned(ScanWarning::new(
                ScanWarningKind::Timeout,
                "deadline exceeded",
            )),
        };

        match &outcome {
            ScanPhaseOutcome::Reported(report) => {
                info!("Scan phase done (scan tool exit status {})", report.exit_code)
            }
            ScanPhaseOutcome::Warned(warning) => warn!("Scan phase failed: {}", warning),
        }

        outcome
    }

    async fn scan_and_report_inner(&self, ctx: &ExecutionContext) -> ScanPhaseOutcome {
        let job = match ScanJob::for_context(ctx) {
            Ok(job) => job,
            Err(e) => {
                return ScanPhaseOutcome::Warned(ScanWarning::new(
                    ScanWarningKind::Engine,
                    e.to_string(),
                ));
            }
        };

        let result = match self.steps.run_scan(&job).await {
            Ok(result) => result,
            Err(e) => {
                return ScanPhaseOutcome::Warned(ScanWarning::new(
                    ScanWarningKind::Engine,
                    e.to_string(),
                ));
            }
        };

        match self
            .reporter
            .report(&result.output, &ctx.repo, &ctx.issue_number, &ctx.token)
            .await
        {
            Ok(report) => ScanPhaseOutcome::Reported(ScanReport {
                exit_code: result.exit_code,
                has_output: !result.output.trim().is_empty(),
                comment_url: report.comment_url,
                truncated: report.truncated,
            }),
            Err(e) => {
                ScanPhaseOutcome::Warned(ScanWarning::new(ScanWarningKind::Report, e.to_string()))
            }
        }
    }

    async fn build_phase(&self, ctx: &ExecutionContext) -> Result<PublishedRef, PipelineError> {
        info!("Build phase started");

        let recipe = BuildRecipe::for_context(ctx);
        let destination = ctx.publish_destination();
        let publish = self.steps.build_and_publish(
            &recipe,
            &destination,
            ctx.registry_credentials.as_ref(),
        );

        match timeout_at(ctx.deadline, publish).await {
            Ok(Ok(published)) => {
                info!("Image successfully pushed to {}", published);
                Ok(published)
            }
            Ok(Err(source)) => {
                error!("Build phase failed: {}", source);
                Err(PipelineError::Engine {
                    phase: Phase::Build,
                    source,
                })
            }
            Err(_) => {
                error!("Build phase timed out");
                Err(PipelineError::Timeout {
                    phase: Phase::Build,
                })
            }
        }
    }
}
