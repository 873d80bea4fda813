//! Gantry Runner
//!
//! Executes one CI pipeline invocation: a static-quality scan in a throwaway
//! container whose output is reported to the review thread, and an image
//! build that is published to a registry.
//!
//! Architecture:
//! - Engine: capability traits for the container engine and a scoped session
//! - Podman: the engine implementation backed by the podman CLI
//! - Steps: scan job execution and build/publish on top of an engine
//! - Pipeline: phase sequencing, fatal vs. advisory failures, the final outcome

pub mod engine;
pub mod pipeline;
pub mod podman;
pub mod steps;

pub use engine::{
    ContainerEngine, ContainerId, ContainerSpec, EngineError, EngineResult, EngineSession,
    ExecOutput, ImageRef, ScopedSession,
};
pub use pipeline::{Pipeline, PipelineError};
pub use podman::PodmanEngine;
pub use steps::StepRunner;
