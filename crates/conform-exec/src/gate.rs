//! Run gate: turns case reports into an overall verdict and exit code.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conform_core::{CaseState, Result};

use crate::report::CaseReport;

/// Machine-readable record of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub verdict: RunVerdict,
    pub cases: Vec<CaseReport>,
}

/// Write the run summary as pretty JSON.
pub fn write_run_summary_json(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Overall verdict for one invocation of the harness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunVerdict {
    /// Whether every case reached `Done` with every file passing.
    pub passed: bool,

    pub cases_passed: usize,

    pub cases_failed: usize,

    /// One entry per case that did not pass.
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

impl RunVerdict {
    /// Process exit code for this verdict.
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }
}

/// Run gate evaluation rules.
pub struct RunGate;

impl RunGate {
    /// Evaluate the reports of every case that ran.
    ///
    /// Gate rule:
    /// - at least one case ran
    /// - every case is `Done`
    /// - no case has a failed or errored file
    pub fn evaluate(reports: &[CaseReport]) -> RunVerdict {
        let mut violations = Vec::new();

        if reports.is_empty() {
            violations.push("no case was run".to_string());
        }

        for report in reports {
            if report.passed() {
                continue;
            }
            let violation = match (report.state, &report.result, &report.error) {
                (CaseState::Done, Some(r), _) => format!(
                    "Case '{}': {} failed, {} errored of {} file(s)",
                    report.case,
                    r.failed,
                    r.errored,
                    r.total()
                ),
                (_, _, Some(error)) => format!("Case '{}' failed: {}", report.case, error),
                (state, _, None) => format!("Case '{}' ended in state {}", report.case, state),
            };
            violations.push(violation);
        }

        let cases_passed = reports.iter().filter(|r| r.passed()).count();
        let cases_failed = reports.len() - cases_passed;
        let passed = violations.is_empty();
        let message = if passed {
            format!("All {} case(s) passed", cases_passed)
        } else {
            format!("Gate failed with {} violation(s)", violations.len())
        };

        RunVerdict {
            passed,
            cases_passed,
            cases_failed,
            violations,
            message,
        }
    }
}
