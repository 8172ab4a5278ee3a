//! Harness-wide run settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::TestCase;

/// Default worker pool size per case.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Settings shared by every case in a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Maximum number of decoder processes running at once for a case.
    pub concurrency: usize,

    /// Per-invocation timeout unless a case overrides it.
    pub timeout: Duration,

    /// Keep generated parameter files next to the decoder output.
    pub keep_artifacts: bool,

    /// Stop scheduling further cases after the first one that does not pass.
    pub fail_fast: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            keep_artifacts: false,
            fail_fast: false,
        }
    }
}

impl HarnessConfig {
    /// Set the worker pool size; zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_keep_artifacts(mut self, keep: bool) -> Self {
        self.keep_artifacts = keep;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Effective per-invocation timeout for `case`.
    pub fn timeout_for(&self, case: &TestCase) -> Duration {
        case.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.timeout)
    }
}
