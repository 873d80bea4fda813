//! Podman container engine
//!
//! Drives the `podman` CLI for the pipeline's container work:
//! - Checking podman availability when a session is opened
//! - Building images from the source tree's build file
//! - Logging in and publishing images to a registry
//! - Starting a scan container with the source tree mounted and executing commands in it
//! - Removing every container and intermediate image a session created when it closes
//!
//! Commands run through `tokio::process` with `kill_on_drop`, so cancelling an
//! operation also kills the podman process it is waiting on.

use async_trait::async_trait;
use gantry_core::{BuildRecipe, RegistryCredentials};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::{
    ContainerEngine, ContainerId, ContainerSpec, EngineError, EngineResult, EngineSession,
    ExecOutput, ImageRef,
};

/// Exit status podman uses when it fails itself rather than the command it ran
const PODMAN_ERROR_EXIT: i32 = 125;

/// Podman-backed container engine
#[derive(Debug, Clone)]
pub struct PodmanEngine {
    program: String,
}

impl PodmanEngine {
    pub fn new() -> Self {
        Self::with_program("podman")
    }

    /// Uses another podman-compatible binary (or an absolute path to podman)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PodmanEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEngine for PodmanEngine {
    async fn connect(&self) -> EngineResult<Box<dyn EngineSession>> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                EngineError::Unavailable(format!(
                    "failed to execute '{} --version': {}. Is podman installed?",
                    self.program, e
                ))
            })?;

        if !output.status.success() {
            return Err(EngineError::Unavailable(format!(
                "{} is not working correctly: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("Podman is available: {}", version.trim());

        Ok(Box::new(PodmanSession::new(self.program.clone())))
    }
}

/// One podman session
///
/// Tracks the containers and images it creates so that `close` can remove them.
pub struct PodmanSession {
    id: Uuid,
    program: String,
    containers: Vec<String>,
    images: Vec<String>,
    closed: bool,
}

impl PodmanSession {
    fn new(program: String) -> Self {
        let id = Uuid::new_v4();
        debug!("Opened podman session {}", id);
        Self {
            id,
            program,
            containers: Vec::new(),
            images: Vec::new(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    /// Runs podman with the given arguments and collects its output
    async fn podman(&self, args: &[String]) -> EngineResult<Output> {
        debug!("Running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::io(format!("execute {} {}", self.program, args[0]), e))?;

        log_output(&args[0], &output);
        Ok(output)
    }

    /// Generates a name for a resource owned by this session
    fn resource_name(&self, kind: &str, index: usize) -> String {
        format!("gantry-{}-{}{}", self.id, kind, index)
    }
}

#[async_trait]
impl EngineSession for PodmanSession {
    async fn build_image(&mut self, recipe: &BuildRecipe) -> EngineResult<ImageRef> {
        self.ensure_open()?;

        let tag = format!("localhost/{}", self.resource_name("build", self.images.len()));
        info!("Building image {} from {}", tag, recipe.source);

        let mut args = vec!["build".to_string(), "--tag".to_string(), tag.clone()];
        if let Some(build_file) = &recipe.build_file {
            args.push("--file".to_string());
            args.push(
                recipe
                    .source
                    .path()
                    .join(build_file)
                    .to_string_lossy()
                    .to_string(),
            );
        }
        for (key, value) in recipe.labels() {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(recipe.source.path().to_string_lossy().to_string());

        let output = self.podman(&args).await?;
        if !output.status.success() {
            let detail = failure_detail(&output);
            error!("Build of {} failed: {}", tag, detail);
            return Err(EngineError::Build(detail));
        }

        self.images.push(tag.clone());
        info!("Image {} built successfully", tag);
        Ok(ImageRef::new(tag))
    }

    async fn login(
        &mut self,
        registry: &str,
        credentials: &RegistryCredentials,
    ) -> EngineResult<()> {
        self.ensure_open()?;
        info!("Logging into {} as {}", registry, credentials.username);

        // password goes through stdin so it never shows up in the process list
        let mut child = Command::new(&self.program)
            .arg("login")
            .arg("--username")
            .arg(&credentials.username)
            .arg("--password-stdin")
            .arg(registry)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::io(format!("execute {} login", self.program), e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(credentials.password.expose().as_bytes())
                .await
                .map_err(|e| EngineError::io("write registry password", e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::io(format!("wait for {} login", self.program), e))?;

        if !output.status.success() {
            return Err(EngineError::Login {
                registry: registry.to_string(),
                detail: failure_detail(&output),
            });
        }

        Ok(())
    }

    async fn publish(&mut self, image: &ImageRef, destination: &str) -> EngineResult<String> {
        self.ensure_open()?;
        info!("Publishing {} to {}", image.id, destination);

        let digest_file = std::env::temp_dir()
            .join(format!("{}.digest", self.resource_name("push", self.images.len())));
        let args = vec![
            "push".to_string(),
            "--digestfile".to_string(),
            digest_file.to_string_lossy().to_string(),
            image.id.clone(),
            destination.to_string(),
        ];

        let output = self.podman(&args).await?;
        let digest = tokio::fs::read_to_string(&digest_file).await.ok();
        if let Err(e) = tokio::fs::remove_file(&digest_file).await {
            debug!("Digest file {} not removed: {}", digest_file.display(), e);
        }

        if !output.status.success() {
            return Err(EngineError::Publish {
                destination: destination.to_string(),
                detail: failure_detail(&output),
            });
        }

        let reference = match digest.as_deref().map(str::trim) {
            Some(digest) if !digest.is_empty() => format!("{}@{}", destination, digest),
            _ => {
                warn!("Podman reported no digest for {}", destination);
                destination.to_string()
            }
        };

        info!("Published {}", reference);
        Ok(reference)
    }

    async fn start(&mut self, spec: &ContainerSpec) -> EngineResult<ContainerId> {
        self.ensure_open()?;

        let host_path = tokio::fs::canonicalize(spec.mount.source.path())
            .await
            .map_err(|e| EngineError::io(format!("resolve source {}", spec.mount.source), e))?;

        let container_name = self.resource_name("scan", self.containers.len());
        info!(
            "Creating container {} for image {}",
            container_name, spec.image
        );

        // registered before it exists so a half-created container is still removed
        self.containers.push(container_name.clone());

        // Override entrypoint to /bin/sh to handle images with custom entrypoints
        let args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            container_name.clone(),
            "--entrypoint".to_string(),
            "/bin/sh".to_string(),
            "-v".to_string(),
            format!("{}:{}", host_path.display(), spec.mount.container_path),
            "-w".to_string(),
            spec.workdir.clone(),
            spec.image.clone(),
            "-c".to_string(),
            "sleep infinity".to_string(),
        ];

        let output = self.podman(&args).await?;
        if !output.status.success() {
            let detail = failure_detail(&output);
            error!("Failed to start container for image {}: {}", spec.image, detail);
            return Err(EngineError::Start {
                image: spec.image.clone(),
                detail,
            });
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(
            "Container {} started successfully with ID: {}",
            container_name, container_id
        );

        Ok(ContainerId(container_name))
    }

    async fn exec(
        &mut self,
        container: &ContainerId,
        command: &[String],
    ) -> EngineResult<ExecOutput> {
        self.ensure_open()?;
        debug!("Executing in container {}: {:?}", container.0, command);

        let mut args = vec!["exec".to_string(), container.0.clone()];
        args.extend(command.iter().cloned());

        let output = self.podman(&args).await?;

        // 125 is podman's own failure; anything else belongs to the command
        let exit_code = match output.status.code() {
            Some(PODMAN_ERROR_EXIT) | None => {
                let detail = failure_detail(&output);
                error!("podman exec in {} failed: {}", container.0, detail);
                return Err(EngineError::Exec {
                    container: container.0.clone(),
                    detail,
                });
            }
            Some(code) => code,
        };

        let result = ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
        };

        debug!(
            "Command finished in container {}: exit_code={}, stdout_len={}, stderr_len={}",
            container.0,
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );

        Ok(result)
    }

    fn close(&mut self) -> EngineResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        info!(
            "Cleaning up {} container(s) and {} image(s) for session {}",
            self.containers.len(),
            self.images.len(),
            self.id
        );

        // Runs from Drop as well, so this stays synchronous
        for container_name in self.containers.drain(..) {
            remove(&self.program, &["rm", "-f", container_name.as_str()]);
        }
        for image in self.images.drain(..) {
            remove(&self.program, &["rmi", "-f", image.as_str()]);
        }

        info!("Cleanup complete for session {}", self.id);
        Ok(())
    }
}

impl Drop for PodmanSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to cleanup podman session on drop: {}", e);
        }
    }
}

/// Removes a podman resource, logging rather than failing
fn remove(program: &str, args: &[&str]) {
    match std::process::Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            debug!("{} {} done", program, args.join(" "));
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} {} failed: {}", program, args.join(" "), stderr.trim());
        }
        Err(e) => {
            warn!("{} {} failed: {}", program, args.join(" "), e);
        }
    }
}

fn log_output(subcommand: &str, output: &Output) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() {
        debug!("podman {} stdout: {}", subcommand, stdout.trim());
    }
    if !stderr.trim().is_empty() {
        debug!("podman {} stderr: {}", subcommand, stderr.trim());
    }
}

fn failure_detail(output: &Output) -> String {
    format!(
        "exit_code={}, stderr='{}'",
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stderr).trim()
    )
}
