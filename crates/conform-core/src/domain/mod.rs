//! Domain models for the conformance harness.
//!
//! Canonical definitions for the core entities:
//! - `TestCase`: one named case from the registry
//! - `Model`: a decoder binding and what it supports
//! - `Invocation` / `ExecutionResult`: one decoder process and its outcome
//! - `CaseResult`: per-file verdicts aggregated for a case

pub mod case;
pub mod error;
pub mod invocation;
pub mod model;
pub mod result;

// Re-export main types and errors
pub use case::{Action, TestCase};
pub use error::{ConformError, RegistryError, Result};
pub use invocation::{
    ConfigArtifact, ExecutionResult, Invocation, OutputFormat, SYNTHETIC_EXIT_CODE,
};
pub use model::{AdapterKind, Model};
pub use result::{CaseResult, CaseState, FileOutcome, FileVerdict};
