//! Gantry Core
//!
//! Core types for the Gantry CI pipeline.
//!
//! This crate contains:
//! - Domain types: the execution context of one invocation and the values
//!   passed between pipeline steps (build recipe, scan job, results, outcome)
//! - Errors: configuration errors detected before any step runs

pub mod domain;
pub mod error;

pub use domain::context::{
    BuildOptions, ExecutionContext, RegistryCredentials, ScanOptions, SecretString, SourceRef,
};
pub use domain::outcome::{
    Phase, PipelineOutcome, ScanPhaseOutcome, ScanReport, ScanWarning, ScanWarningKind,
};
pub use domain::recipe::{BuildRecipe, Mount, ScanJob, VERSION_LABEL};
pub use domain::result::{PublishedRef, ScanResult};
pub use error::ConfigError;
