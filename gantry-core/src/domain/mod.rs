//! Core domain types
//!
//! These types describe a single pipeline invocation. They are created at the
//! entry point or immediately before a step, consumed once, and never persisted.

pub mod context;
pub mod outcome;
pub mod recipe;
pub mod result;
