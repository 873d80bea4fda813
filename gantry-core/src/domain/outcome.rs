//! Pipeline outcome types
//!
//! The orchestrator folds both phases into a [`PipelineOutcome`]. A failed
//! build never produces an outcome (it is the invocation's error instead), so
//! an outcome always carries a published image; scan problems are attached as
//! warnings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::result::PublishedRef;

/// The two independently failing phases of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Scan,
    Build,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Scan => f.write_str("scan"),
            Phase::Build => f.write_str("build"),
        }
    }
}

/// Scan results that made it onto the review thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Exit status of the scan tool
    pub exit_code: i32,
    /// Whether the tool printed anything
    pub has_output: bool,
    /// Link to the created comment, when the API returned one
    pub comment_url: Option<String>,
    /// Whether the output had to be shortened to fit the comment
    pub truncated: bool,
}

/// Why the scan phase could not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanWarningKind {
    /// The container engine failed to run the scan job
    Engine,
    /// The scan ran but the comment could not be posted
    Report,
    /// The deadline expired while the scan phase was in flight
    Timeout,
}

/// Advisory failure of the scan phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub kind: ScanWarningKind,
    pub detail: String,
}

impl ScanWarning {
    pub fn new(kind: ScanWarningKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScanWarningKind::Engine => write!(f, "scan could not run: {}", self.detail),
            ScanWarningKind::Report => {
                write!(f, "scan results could not be posted: {}", self.detail)
            }
            ScanWarningKind::Timeout => write!(f, "scan timed out: {}", self.detail),
        }
    }
}

/// Result of the scan phase, which is advisory and therefore never an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanPhaseOutcome {
    Reported(ScanReport),
    Warned(ScanWarning),
}

impl ScanPhaseOutcome {
    pub fn is_warned(&self) -> bool {
        matches!(self, ScanPhaseOutcome::Warned(_))
    }

    pub fn warning(&self) -> Option<&ScanWarning> {
        match self {
            ScanPhaseOutcome::Warned(warning) => Some(warning),
            ScanPhaseOutcome::Reported(_) => None,
        }
    }

    /// One-line summary of the phase
    pub fn summary(&self) -> String {
        match self {
            ScanPhaseOutcome::Reported(report) => {
                let findings = if !report.has_output && report.exit_code == 0 {
                    "no findings".to_string()
                } else {
                    format!("scan tool exited with {}", report.exit_code)
                };
                let mut line = format!("Scan results posted ({})", findings);
                if report.truncated {
                    line.push_str(", output truncated");
                }
                if let Some(url) = &report.comment_url {
                    line.push_str(&format!(": {}", url));
                }
                line
            }
            ScanPhaseOutcome::Warned(warning) => format!("warning: {}", warning),
        }
    }
}

/// Consolidated result of a successful invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub invocation_id: Uuid,
    pub published: PublishedRef,
    pub scan: ScanPhaseOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineOutcome {
    /// Whether the scan phase left a warning on an otherwise successful run
    pub fn has_warnings(&self) -> bool {
        self.scan.is_warned()
    }

    /// Human-readable message: the published image, then the scan summary
    pub fn message(&self) -> String {
        format!(
            "Image successfully pushed to {}\n{}",
            self.published,
            self.scan.summary()
        )
    }
}
