//! Structured observability hooks for the case lifecycle.
//!
//! - Case-scoped spans: [`case_span`] for instrumenting async work and the
//!   [`CaseSpan`] RAII guard for synchronous scopes
//! - Emission functions for case start, per-file verdicts, finish and abort
//!
//! Events are emitted at `info!` level; aborts at `warn!`.

use tracing::{info, warn, Span};

use crate::domain::{Action, CaseResult, FileVerdict};

/// Span tagged with the case name and model, for `Instrument::instrument`.
pub fn case_span(case: &str, model: &str) -> Span {
    tracing::info_span!("conform.case", case = %case, model = %model)
}

/// RAII guard that enters a case-scoped span until dropped.
///
/// Not `Send`: hold it only in synchronous code.
pub struct CaseSpan {
    _span: tracing::span::EnteredSpan,
}

impl CaseSpan {
    pub fn enter(case: &str, model: &str) -> Self {
        Self {
            _span: case_span(case, model).entered(),
        }
    }
}

/// Emit event: case started over `files` input files.
pub fn emit_case_started(case: &str, codec: &str, action: Action, files: usize) {
    info!(
        event = "case.started",
        case = %case,
        codec = %codec,
        action = %action,
        files = files,
    );
}

/// Emit event: one file's pipeline produced a verdict.
pub fn emit_file_finished(case: &str, file: &str, verdict: &FileVerdict, wall_time_ms: u64) {
    info!(
        event = "case.file_finished",
        case = %case,
        file = %file,
        verdict = verdict.label(),
        wall_time_ms = wall_time_ms,
    );
}

/// Emit event: case finished with its aggregate counts.
pub fn emit_case_finished(case: &str, result: &CaseResult) {
    info!(
        event = "case.finished",
        case = %case,
        passed = result.passed,
        failed = result.failed,
        errored = result.errored,
        wall_time_ms = result.wall_time_ms,
        success = result.all_passed(),
    );
}

/// Emit event: case aborted on a case-level error (warning level).
pub fn emit_case_aborted(case: &str, error: &dyn std::fmt::Display) {
    warn!(event = "case.aborted", case = %case, error = %error);
}
