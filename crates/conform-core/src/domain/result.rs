//! Per-file verdicts and per-case aggregates.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::DigestRecord;

/// Lifecycle of one case run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Pending,
    Enumerating,
    Running,
    Aggregating,
    Done,
    Failed,
}

impl CaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseState::Done | CaseState::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: CaseState) -> bool {
        use CaseState::*;
        matches!(
            (self, next),
            (Pending, Enumerating)
                | (Enumerating, Running)
                | (Enumerating, Failed)
                | (Running, Aggregating)
                | (Running, Failed)
                | (Aggregating, Done)
                | (Aggregating, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseState::Pending => "pending",
            CaseState::Enumerating => "enumerating",
            CaseState::Running => "running",
            CaseState::Aggregating => "aggregating",
            CaseState::Done => "done",
            CaseState::Failed => "failed",
        }
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one input file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum FileVerdict {
    Passed,

    /// The decoder misbehaved: non-zero exit, timeout, digest mismatch or
    /// missing golden digest.
    Failed { reason: String },

    /// The harness could not judge the file.
    Errored { reason: String },
}

impl FileVerdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, FileVerdict::Passed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileVerdict::Passed => "PASS",
            FileVerdict::Failed { .. } => "FAIL",
            FileVerdict::Errored { .. } => "ERROR",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            FileVerdict::Passed => None,
            FileVerdict::Failed { reason } | FileVerdict::Errored { reason } => Some(reason),
        }
    }
}

/// Everything recorded about one input file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileOutcome {
    pub file: PathBuf,

    pub verdict: FileVerdict,

    /// Decoder exit code, absent if the decoder never ran.
    pub exit_code: Option<i32>,

    #[serde(default)]
    pub wall_time_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestRecord>,

    /// Tail of the decoder's stderr, kept for failed files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_excerpt: Option<String>,
}

impl FileOutcome {
    pub fn new(file: PathBuf, verdict: FileVerdict) -> Self {
        Self {
            file,
            verdict,
            exit_code: None,
            wall_time_ms: 0,
            digest: None,
            stderr_excerpt: None,
        }
    }
}

/// Aggregate of every file's outcome within one case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseResult {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,

    /// Sorted by file path.
    pub outcomes: Vec<FileOutcome>,

    pub wall_time_ms: u64,
}

impl CaseResult {
    /// Finalize outcomes collected in completion order.
    pub fn from_outcomes(mut outcomes: Vec<FileOutcome>, wall_time: Duration) -> Self {
        outcomes.sort_by(|a, b| a.file.cmp(&b.file));

        let mut passed = 0;
        let mut failed = 0;
        let mut errored = 0;
        for outcome in &outcomes {
            match outcome.verdict {
                FileVerdict::Passed => passed += 1,
                FileVerdict::Failed { .. } => failed += 1,
                FileVerdict::Errored { .. } => errored += 1,
            }
        }

        Self {
            passed,
            failed,
            errored,
            outcomes,
            wall_time_ms: wall_time.as_millis() as u64,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether every file passed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}
