//! Codec Conformance Execution
//!
//! Runs conformance cases against external decoders:
//! - Spawns decoder processes with timeout and cancellation
//! - Processes a case's files on a bounded worker pool
//! - Writes per-case logs and evaluates the overall run gate

pub mod case_runner;
pub mod executor;
pub mod gate;
pub mod report;

// Re-export key types
pub use case_runner::CaseRunner;
pub use executor::Executor;
pub use gate::{write_run_summary_json, RunGate, RunSummary, RunVerdict};
pub use report::{append_case_log, render_case_log, truncate_logs, CaseReport};
