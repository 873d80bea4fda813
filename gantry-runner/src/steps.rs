//! Container step runner
//!
//! Adapter between the pipeline and the container engine. Each step opens its
//! own engine session and releases it before returning, on error paths too.

use gantry_core::{BuildRecipe, PublishedRef, RegistryCredentials, ScanJob, ScanResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::{ContainerEngine, ContainerSpec, EngineError, EngineResult, ScopedSession};

/// Runs scan jobs and builds/publishes images through a container engine
#[derive(Clone)]
pub struct StepRunner {
    engine: Arc<dyn ContainerEngine>,
}

impl StepRunner {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Executes a scan job and captures the scan tool's output
    ///
    /// Setup commands must exit 0. The scan tool's exit status is returned in
    /// the result: a linter that finds issues is expected, not exceptional.
    ///
    /// # Errors
    /// Only when the engine itself fails: unreachable engine, unresolvable
    /// image, container start failure, or a failing setup command.
    pub async fn run_scan(&self, job: &ScanJob) -> EngineResult<ScanResult> {
        let mut session = ScopedSession::open(self.engine.as_ref()).await?;

        let container = session.start(&ContainerSpec::for_job(job)).await?;

        for (idx, command) in job.setup_commands().iter().enumerate() {
            debug!(
                "Running setup command {}/{}",
                idx + 1,
                job.setup_commands().len()
            );
            let output = session.exec(&container, command).await?;
            if output.exit_code != 0 {
                return Err(EngineError::CommandFailed {
                    command: command.join(" "),
                    exit_code: output.exit_code,
                    output: output.combined(),
                });
            }
        }

        let output = session.exec(&container, job.scan_command()).await?;
        session.release();

        if output.exit_code != 0 {
            info!(
                "Scan tool exited with status {} (findings are reported, not fatal)",
                output.exit_code
            );
        } else {
            info!("Scan tool exited cleanly");
        }

        Ok(ScanResult {
            output: output.combined(),
            exit_code: output.exit_code,
        })
    }

    /// Builds an image from the recipe and publishes it to `destination`
    ///
    /// The returned reference is the one the engine reported, untouched.
    ///
    /// # Arguments
    /// * `recipe` - Source tree, build file and labels
    /// * `destination` - Registry reference in `host/name:tag` form
    /// * `credentials` - Optional registry login performed before publishing
    pub async fn build_and_publish(
        &self,
        recipe: &BuildRecipe,
        destination: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> EngineResult<PublishedRef> {
        let mut session = ScopedSession::open(self.engine.as_ref()).await?;

        let image = session.build_image(recipe).await?;

        if let Some(credentials) = credentials {
            session
                .login(registry_host(destination), credentials)
                .await?;
        }

        let reference = session.publish(&image, destination).await?;
        session.release();

        PublishedRef::new(reference).ok_or_else(|| {
            warn!("Engine returned an empty reference for {}", destination);
            EngineError::Publish {
                destination: destination.to_string(),
                detail: "engine reported an empty image reference".to_string(),
            }
        })
    }
}

/// Registry host part of `host/name:tag`
fn registry_host(destination: &str) -> &str {
    destination.split('/').next().unwrap_or(destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_host() {
        assert_eq!(registry_host("ghcr.io/acme/app:latest"), "ghcr.io");
        assert_eq!(registry_host("localhost:5000/app:latest"), "localhost:5000");
    }
}
