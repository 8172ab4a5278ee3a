//! Test case descriptors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a case does with each decoded file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Run the decoder and keep its output under the case's output directory.
    Decode,

    /// Hash the whole decoded output and store it as the golden digest.
    Digest,

    /// Hash every decoded frame separately and store the list as golden.
    DigestByFrames,

    /// Hash the decoded output and check it against the golden digest.
    Compare,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Decode,
        Action::Digest,
        Action::DigestByFrames,
        Action::Compare,
    ];

    /// Get the action name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Decode => "decode",
            Action::Digest => "digest",
            Action::DigestByFrames => "digest_by_frames",
            Action::Compare => "compare",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}

/// One named unit of test configuration.
///
/// Field names on the wire follow the registry tables (`case`, `srcdir`,
/// `outdir`, ...). A `TestCase` is immutable once the registry is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCase {
    /// Unique case name.
    #[serde(rename = "case")]
    pub name: String,

    /// Model binding that decodes this case.
    pub model: String,

    /// Codec of the bitstreams in `source_dir`.
    pub codec: String,

    pub action: Action,

    /// Aggregated per-case log.
    #[serde(rename = "stdout")]
    pub stdout_log: PathBuf,

    #[serde(rename = "srcdir")]
    pub source_dir: PathBuf,

    /// Decoded output and digest records land here.
    #[serde(rename = "outdir")]
    pub output_dir: PathBuf,

    #[serde(rename = "includes", default)]
    pub include_patterns: Vec<String>,

    #[serde(rename = "excludes", default)]
    pub exclude_patterns: Vec<String>,

    /// For `compare`: decode each file with this model too and use its
    /// digest as the baseline instead of the stored one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_model: Option<String>,

    /// Per-invocation timeout override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl TestCase {
    /// Resolve relative paths against `base` (the registry file's directory).
    pub(crate) fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.stdout_log,
            &mut self.source_dir,
            &mut self.output_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}
