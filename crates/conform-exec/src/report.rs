//! Case reports and the per-case log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conform_core::{relative_key, Action, CaseResult, CaseState, Result};

/// Everything known about one case once it reached a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseReport {
    pub case: String,
    pub model: String,
    pub codec: String,
    pub action: Action,
    pub state: CaseState,

    /// Per-file outcomes. Present once enumeration succeeded, including for
    /// cases that failed or were cancelled part way.
    pub result: Option<CaseResult>,

    /// Case-level error that moved the case to `Failed`.
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,

    pub log_path: PathBuf,
}

impl CaseReport {
    /// Whether the case ran to `Done` with every file passing.
    pub fn passed(&self) -> bool {
        self.state == CaseState::Done && self.result.as_ref().is_some_and(|r| r.all_passed())
    }

    /// One-line summary used in logs and on the console.
    pub fn summary_line(&self) -> String {
        match &self.result {
            Some(r) => format!(
                "{}: {}, {} passed, {} failed, {} errored in {}ms",
                self.case, self.state, r.passed, r.failed, r.errored, r.wall_time_ms
            ),
            None => format!("{}: {}", self.case, self.state),
        }
    }
}

/// Render the log block for one case.
pub fn render_case_log(report: &CaseReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "== case {} (model {}, codec {}, action {}) started {}\n",
        report.case,
        report.model,
        report.codec,
        report.action,
        report.started_at.to_rfc3339()
    ));

    if let Some(result) = &report.result {
        for outcome in &result.outcomes {
            let exit = outcome
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{:<5} {} exit={} {}ms",
                outcome.verdict.label(),
                relative_key(&outcome.file),
                exit,
                outcome.wall_time_ms
            ));
            if let Some(reason) = outcome.verdict.reason() {
                out.push_str(&format!(" {}", reason));
            }
            out.push('\n');
        }

        for outcome in &result.outcomes {
            if let Some(excerpt) = &outcome.stderr_excerpt {
                out.push_str(&format!("-- stderr {}\n", relative_key(&outcome.file)));
                for line in excerpt.lines() {
                    out.push_str(&format!("   | {}\n", line));
                }
            }
        }
    }

    if let Some(error) = &report.error {
        out.push_str(&format!("!! {}\n", error));
    }
    out.push_str(&format!("== {}\n\n", report.summary_line()));
    out
}

/// Append the case block to its log, creating the log if needed.
///
/// Several cases may share one log; each appends its own block.
pub fn append_case_log(report: &CaseReport) -> Result<()> {
    if let Some(parent) = report.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&report.log_path)?;
    file.write_all(render_case_log(report).as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Empty each distinct log once before a run.
pub fn truncate_logs<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Result<()> {
    let mut seen = std::collections::BTreeSet::new();
    for path in paths {
        if !seen.insert(path) {
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(path)?;
    }
    Ok(())
}
