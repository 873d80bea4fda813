//! Container engine capability
//!
//! The pipeline never talks to a container runtime directly; it goes through
//! these traits. An engine hands out sessions, and everything a session
//! creates (containers, intermediate images) is released when it is closed.
//!
//! [`ScopedSession`] ties that release to scope: it closes the session when
//! released explicitly, and from `Drop` on every other exit path, including
//! cancellation of the surrounding future by a deadline.

use async_trait::async_trait;
use gantry_core::{BuildRecipe, Mount, RegistryCredentials, ScanJob};
use std::ops::{Deref, DerefMut};
use thiserror::Error;
use tracing::{debug, warn};

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failures of the container engine or of work it was asked to do
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine cannot be reached or is not working
    #[error("container engine unavailable: {0}")]
    Unavailable(String),

    /// An engine process could not be spawned or its output not collected
    #[error("failed to {action}: {source}")]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    /// The image could not be built from the recipe
    #[error("image build failed: {0}")]
    Build(String),

    /// Logging into the registry failed
    #[error("login to {registry} failed: {detail}")]
    Login { registry: String, detail: String },

    /// The registry rejected the image or could not be reached
    #[error("publish to {destination} failed: {detail}")]
    Publish { destination: String, detail: String },

    /// A container could not be created from the image
    #[error("failed to start container from {image}: {detail}")]
    Start { image: String, detail: String },

    /// The engine could not run a command in the container
    #[error("exec in container {container} failed: {detail}")]
    Exec { container: String, detail: String },

    /// A command that had to succeed exited non-zero inside the container
    #[error("`{command}` exited with status {exit_code}: {output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    /// The session was used after it was closed
    #[error("engine session already closed")]
    Closed,
}

impl EngineError {
    pub fn io(action: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            action: action.into(),
            source,
        }
    }
}

/// Image materialised by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Engine-local reference (tag or id)
    pub id: String,
}

impl ImageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Container to instantiate: base image, mounted source tree and working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub mount: Mount,
    pub workdir: String,
}

impl ContainerSpec {
    pub fn for_job(job: &ScanJob) -> Self {
        Self {
            image: job.base_image.clone(),
            mount: job.mount.clone(),
            workdir: job.workdir.clone(),
        }
    }
}

/// Handle of a running container within a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerId(pub String);

/// Output of one command executed in a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    /// Standard output followed by standard error
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let separator = if self.stdout.ends_with('\n') { "" } else { "\n" };
                format!("{}{}{}", self.stdout, separator, self.stderr)
            }
        }
    }
}

/// Container engine: hands out sessions
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Opens a session with the engine
    async fn connect(&self) -> EngineResult<Box<dyn EngineSession>>;
}

/// Live connection to the engine, scoped to one phase of one invocation
#[async_trait]
pub trait EngineSession: Send {
    /// Builds an image from the recipe's source tree, applying its labels
    async fn build_image(&mut self, recipe: &BuildRecipe) -> EngineResult<ImageRef>;

    /// Authenticates against a registry before publishing
    async fn login(&mut self, registry: &str, credentials: &RegistryCredentials)
    -> EngineResult<()>;

    /// Publishes an image to `destination` (`host/name:tag`)
    ///
    /// # Returns
    /// The reference the engine resolved for the published image
    async fn publish(&mut self, image: &ImageRef, destination: &str) -> EngineResult<String>;

    /// Instantiates a container from a base image with the source tree mounted
    async fn start(&mut self, spec: &ContainerSpec) -> EngineResult<ContainerId>;

    /// Runs one command in a started container
    ///
    /// A non-zero exit status of the command is returned as data, not as an
    /// error. Failures of the engine itself are errors.
    async fn exec(&mut self, container: &ContainerId, command: &[String])
    -> EngineResult<ExecOutput>;

    /// Releases everything the session created
    ///
    /// Must be idempotent: it may be called explicitly and again on drop.
    fn close(&mut self) -> EngineResult<()>;
}

/// Session that is closed on every exit path
pub struct ScopedSession {
    session: Box<dyn EngineSession>,
    released: bool,
}

impl ScopedSession {
    /// Connects to the engine and takes ownership of the new session
    pub async fn open(engine: &dyn ContainerEngine) -> EngineResult<Self> {
        let session = engine.connect().await?;
        debug!("Engine session opened");
        Ok(Self {
            session,
            released: false,
        })
    }

    /// Closes the session on the normal path
    ///
    /// A failure to clean up does not undo the work the session did, so it is
    /// logged rather than returned.
    pub fn release(mut self) {
        self.released = true;
        if let Err(e) = self.session.close() {
            warn!("Failed to close engine session: {}", e);
        } else {
            debug!("Engine session closed");
        }
    }
}

impl Deref for ScopedSession {
    type Target = dyn EngineSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for ScopedSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        debug!("Engine session dropped before release, closing");
        if let Err(e) = self.session.close() {
            warn!("Failed to close engine session on drop: {}", e);
        }
    }
}
