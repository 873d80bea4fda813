//! Configuration module
//!
//! Every invocation parameter is a flag with an environment variable fallback,
//! so the binary can be driven entirely by the CI environment. Required values
//! are optional here: they are checked when the pipeline starts, so a missing
//! value is reported as a configuration error and not as a usage error.

use clap::Args;
use gantry_client::DEFAULT_API_URL;
use gantry_core::{BuildOptions, ConfigError, ExecutionContext, ScanOptions};
use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration
#[derive(Clone, Args)]
pub struct Config {
    /// Host directory of the source tree
    #[arg(long, env = "GANTRY_SOURCE", default_value = ".", global = true)]
    pub source: PathBuf,

    /// Registry host (e.g. ghcr.io)
    #[arg(long, env = "DOCKER_REGISTRY", global = true)]
    pub registry: Option<String>,

    /// Image name within the registry (e.g. acme/app)
    #[arg(long, env = "DOCKER_IMAGE_NAME", global = true)]
    pub image_name: Option<String>,

    /// Repository of the review thread, in owner/repo form
    #[arg(long, env = "GITHUB_REPOSITORY", global = true)]
    pub repo: Option<String>,

    /// API token used to post the scan comment
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Pull request number of the review thread
    #[arg(long, env = "PR_NUMBER", global = true)]
    pub pr_number: Option<String>,

    /// Git ref of the triggering event; supplies the PR number when none is given
    #[arg(long, env = "GITHUB_REF", hide = true, global = true)]
    pub github_ref: Option<String>,

    /// Registry login user
    #[arg(long, env = "REGISTRY_USERNAME", global = true)]
    pub registry_username: Option<String>,

    /// Registry login password
    #[arg(long, env = "REGISTRY_PASSWORD", hide_env_values = true, global = true)]
    pub registry_password: Option<String>,

    /// Tag the image is published under
    #[arg(long, env = "GANTRY_IMAGE_TAG", default_value = "latest", global = true)]
    pub tag: String,

    /// Value of the image's version label
    #[arg(
        long,
        env = "GANTRY_VERSION_LABEL",
        default_value = "1.0.0",
        global = true
    )]
    pub version_label: String,

    /// Build file relative to the source root (engine default when omitted)
    #[arg(long, env = "GANTRY_BUILD_FILE", global = true)]
    pub build_file: Option<PathBuf>,

    /// Base image of the scan container
    #[arg(long, env = "GANTRY_SCAN_IMAGE", default_value = "python:3.10", global = true)]
    pub scan_image: String,

    /// Setup command run before the scan tool (repeatable; pass "" for none)
    #[arg(
        long,
        env = "GANTRY_SCAN_SETUP",
        default_value = "pip install -r requirements.txt",
        global = true
    )]
    pub scan_setup: Vec<String>,

    /// Scan tool command
    #[arg(long, env = "GANTRY_SCAN_COMMAND", default_value = "flake8 app", global = true)]
    pub scan_command: String,

    /// Deadline for the whole invocation, in seconds
    #[arg(long, env = "GANTRY_TIMEOUT_SECS", default_value_t = 1800, global = true)]
    pub timeout_secs: u64,

    /// Base URL of the comment API
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Log verbosity (ignored when RUST_LOG is set)
    #[arg(long, env = "GANTRY_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

impl Config {
    /// Converts the parsed flags into an execution context
    ///
    /// The deadline starts counting here.
    ///
    /// # Errors
    /// When only one half of the registry login is given
    pub fn into_context(self) -> Result<ExecutionContext, ConfigError> {
        let issue_number = self
            .pr_number
            .or_else(|| self.github_ref.as_deref().and_then(pr_number_from_ref))
            .unwrap_or_default();

        let ctx = ExecutionContext::new(self.source, Duration::from_secs(self.timeout_secs))
            .with_image(
                self.registry.unwrap_or_default(),
                self.image_name.unwrap_or_default(),
            )
            .with_review_thread(
                self.repo.unwrap_or_default(),
                issue_number,
                self.token.unwrap_or_default(),
            )
            .with_build_options(BuildOptions {
                build_file: self.build_file,
                version_label: self.version_label,
                tag: self.tag,
            })
            .with_scan_options(ScanOptions {
                base_image: self.scan_image,
                setup: self.scan_setup,
                command: self.scan_command,
                ..ScanOptions::default()
            });

        match (self.registry_username, self.registry_password) {
            (Some(username), Some(password)) => Ok(ctx.with_registry_credentials(username, password)),
            (Some(_), None) => Err(ConfigError::missing("registry password")),
            (None, Some(_)) => Err(ConfigError::missing("registry username")),
            (None, None) => Ok(ctx),
        }
    }
}

/// Extracts the PR number from a `refs/pull/<n>/merge` (or `/head`) ref
pub fn pr_number_from_ref(git_ref: &str) -> Option<String> {
    let rest = git_ref.trim().strip_prefix("refs/pull/")?;
    let (number, _) = rest.split_once('/')?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(number.to_string())
}
