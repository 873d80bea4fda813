//! Execution context
//!
//! Holds everything that identifies one pipeline invocation: the source tree,
//! the registry coordinates of the image, the review thread that receives the
//! scan report, the credentials, and the deadline bounding the whole run.
//!
//! The context is built once at the entry point and only read afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::ConfigError;

/// A credential that must never appear in logs or messages
///
/// `Debug` prints a placeholder; there is no `Display`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value, for use in request headers only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Host directory holding the source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef(PathBuf);

impl SourceRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.as_os_str().is_empty()
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Credentials used to log into the registry before publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: SecretString,
}

/// Options the build recipe is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Build file relative to the source root (engine default when None)
    pub build_file: Option<PathBuf>,
    /// Value of the `version` label attached to the image
    pub version_label: String,
    /// Tag the image is published under
    pub tag: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            build_file: None,
            version_label: "1.0.0".to_string(),
            tag: "latest".to_string(),
        }
    }
}

/// Options the scan job is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub base_image: String,
    /// Shell commands run before the scan tool; each must succeed
    pub setup: Vec<String>,
    /// Shell command of the scan tool; its exit status is data, not an error
    pub command: String,
    /// Where the source tree is mounted inside the scan container
    pub mount_path: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            base_image: "python:3.10".to_string(),
            setup: vec!["pip install -r requirements.txt".to_string()],
            command: "flake8 app".to_string(),
            mount_path: "/src".to_string(),
        }
    }
}

/// Parameters of one pipeline invocation
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Unique id of this invocation, used to name engine resources
    pub invocation_id: Uuid,
    pub source: SourceRef,
    /// Registry host, e.g. `ghcr.io`
    pub registry: String,
    /// Image name within the registry, e.g. `owner/app`
    pub image_name: String,
    /// Review thread repository in `owner/repo` form
    pub repo: String,
    /// Pull-request / issue number of the review thread
    pub issue_number: String,
    pub token: SecretString,
    pub registry_credentials: Option<RegistryCredentials>,
    pub build: BuildOptions,
    pub scan: ScanOptions,
    /// Instant after which every in-flight operation is cancelled
    pub deadline: Instant,
}

impl ExecutionContext {
    /// Creates a context with default options and a deadline `timeout` from now
    ///
    /// Coordinates start out empty; they are filled with the `with_*` methods
    /// and checked by [`ExecutionContext::validate`].
    pub fn new(source: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            source: SourceRef::new(source),
            registry: String::new(),
            image_name: String::new(),
            repo: String::new(),
            issue_number: String::new(),
            token: SecretString::default(),
            registry_credentials: None,
            build: BuildOptions::default(),
            scan: ScanOptions::default(),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn with_image(mut self, registry: impl Into<String>, image_name: impl Into<String>) -> Self {
        self.registry = registry.into();
        self.image_name = image_name.into();
        self
    }

    pub fn with_review_thread(
        mut self,
        repo: impl Into<String>,
        issue_number: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        self.repo = repo.into();
        self.issue_number = issue_number.into();
        self.token = SecretString::new(token);
        self
    }

    pub fn with_registry_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.registry_credentials = Some(RegistryCredentials {
            username: username.into(),
            password: SecretString::new(password),
        });
        self
    }

    pub fn with_build_options(mut self, build: BuildOptions) -> Self {
        self.build = build;
        self
    }

    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = deadline;
        self
    }

    /// Time left before the deadline (zero once it has passed)
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Publish destination: `<registry>/<image_name>:<tag>`
    pub fn publish_destination(&self) -> String {
        format!(
            "{}/{}:{}",
            self.registry.trim().trim_end_matches('/'),
            self.image_name.trim(),
            self.build.tag.trim()
        )
    }

    /// Validates every field the full pipeline needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_build()?;
        self.validate_scan()
    }

    /// Validates the fields used by the build/publish phase
    pub fn validate_build(&self) -> Result<(), ConfigError> {
        self.validate_source()?;

        let registry = require("registry", &self.registry)?;
        if registry.contains("://") {
            return Err(ConfigError::invalid(
                "registry",
                "expected a host such as ghcr.io, not a URL",
            ));
        }
        reject_whitespace("registry", registry)?;

        let image_name = require("image name", &self.image_name)?;
        reject_whitespace("image name", image_name)?;
        if image_name.starts_with('/') || image_name.contains(':') || image_name.contains('@') {
            return Err(ConfigError::invalid(
                "image name",
                "must be a repository path without tag or digest",
            ));
        }

        let tag = require("image tag", &self.build.tag)?;
        reject_whitespace("image tag", tag)?;
        if tag.contains(':') || tag.contains('/') {
            return Err(ConfigError::invalid("image tag", "must not contain ':' or '/'"));
        }

        Ok(())
    }

    /// Validates the fields used by the scan/report phase
    pub fn validate_scan(&self) -> Result<(), ConfigError> {
        self.validate_source()?;

        let repo = require("repository", &self.repo)?;
        match repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => {
                return Err(ConfigError::invalid(
                    "repository",
                    format!("expected owner/repo, got '{}'", repo),
                ));
            }
        }

        let issue = require("pull request number", &self.issue_number)?;
        if !issue.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::invalid(
                "pull request number",
                format!("expected a number, got '{}'", issue),
            ));
        }

        if self.token.is_blank() {
            return Err(ConfigError::missing("token"));
        }

        if self.scan.base_image.trim().is_empty() {
            return Err(ConfigError::missing("scan image"));
        }
        if self.scan.command.trim().is_empty() {
            return Err(ConfigError::missing("scan command"));
        }

        Ok(())
    }

    fn validate_source(&self) -> Result<(), ConfigError> {
        if self.source.is_empty() {
            return Err(ConfigError::missing("source"));
        }
        Ok(())
    }
}

fn require<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::missing(field));
    }
    Ok(value)
}

fn reject_whitespace(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid(field, "must not contain whitespace"));
    }
    Ok(())
}
