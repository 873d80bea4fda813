//! Build recipes and scan jobs
//!
//! Declarative descriptions handed to the container step runner. Both are
//! created right before their step from the execution context and consumed once.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::context::{ExecutionContext, SourceRef};
use crate::error::ConfigError;

/// Label every published image carries
pub const VERSION_LABEL: &str = "version";

/// How to produce an image from the source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecipe {
    pub source: SourceRef,
    /// Build file relative to the source root; the engine picks its default when None
    pub build_file: Option<PathBuf>,
    labels: BTreeMap<String, String>,
}

impl BuildRecipe {
    pub fn new(source: SourceRef) -> Self {
        Self {
            source,
            build_file: None,
            labels: BTreeMap::new(),
        }
    }

    /// Derives the recipe for the build phase of an invocation
    pub fn for_context(ctx: &ExecutionContext) -> Self {
        let mut recipe = Self::new(ctx.source.clone())
            .with_label(VERSION_LABEL, ctx.build.version_label.clone());
        recipe.build_file = ctx.build.build_file.clone();
        recipe
    }

    pub fn with_build_file(mut self, build_file: impl Into<PathBuf>) -> Self {
        self.build_file = Some(build_file.into());
        self
    }

    /// Sets a label; a later value for the same key replaces the earlier one
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}

/// A host directory mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: SourceRef,
    pub container_path: String,
}

/// One-shot container execution used for static analysis
///
/// The last command is the scan tool itself; the ones before it prepare the
/// container (install dependencies and so on).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanJob {
    pub base_image: String,
    pub mount: Mount,
    pub workdir: String,
    commands: Vec<Vec<String>>,
}

impl ScanJob {
    /// Creates a scan job, rejecting an empty command list or empty commands
    pub fn new(
        base_image: impl Into<String>,
        mount: Mount,
        workdir: impl Into<String>,
        commands: Vec<Vec<String>>,
    ) -> Result<Self, ConfigError> {
        if commands.is_empty() {
            return Err(ConfigError::invalid(
                "scan commands",
                "at least one command is required",
            ));
        }
        if commands.iter().any(|argv| argv.is_empty()) {
            return Err(ConfigError::invalid("scan commands", "empty command"));
        }

        Ok(Self {
            base_image: base_image.into(),
            mount,
            workdir: workdir.into(),
            commands,
        })
    }

    /// Derives the scan job of an invocation: setup commands, then the scan tool,
    /// each run through `sh -c` with the source mounted as the working directory
    pub fn for_context(ctx: &ExecutionContext) -> Result<Self, ConfigError> {
        let mount_path = ctx.scan.mount_path.clone();
        let commands = ctx
            .scan
            .setup
            .iter()
            .chain(std::iter::once(&ctx.scan.command))
            .filter(|cmd| !cmd.trim().is_empty())
            .map(|cmd| shell(cmd))
            .collect();

        Self::new(
            ctx.scan.base_image.clone(),
            Mount {
                source: ctx.source.clone(),
                container_path: mount_path.clone(),
            },
            mount_path,
            commands,
        )
    }

    pub fn commands(&self) -> &[Vec<String>] {
        &self.commands
    }

    /// Commands that must succeed before the scan tool runs
    pub fn setup_commands(&self) -> &[Vec<String>] {
        &self.commands[..self.commands.len() - 1]
    }

    /// The scan tool command, whose output is reported
    pub fn scan_command(&self) -> &[String] {
        // non-empty by construction
        &self.commands[self.commands.len() - 1]
    }
}

/// Wraps a shell command line as `sh -c <line>`
pub fn shell(line: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), line.to_string()]
}
