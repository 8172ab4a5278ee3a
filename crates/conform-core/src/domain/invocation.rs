//! Single decoder invocations and their observed outcome.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Exit code reported when the harness, not the decoder, ended the process.
pub const SYNTHETIC_EXIT_CODE: i32 = -1;

/// Container the decoder is asked to write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Headerless planar YUV.
    Raw,

    /// YUV4MPEG2 stream with per-frame markers.
    Y4m,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Raw => "yuv",
            OutputFormat::Y4m => "y4m",
        }
    }
}

/// Auxiliary parameter file generated for one invocation.
///
/// The file is deleted when the artifact is dropped unless it was kept for
/// inspection, in which case `guard` is `None` and the file stays on disk.
#[derive(Debug)]
pub struct ConfigArtifact {
    path: PathBuf,
    guard: Option<NamedTempFile>,
}

impl ConfigArtifact {
    /// A temporary parameter file removed on drop.
    pub fn scoped(file: NamedTempFile) -> Self {
        Self {
            path: file.path().to_path_buf(),
            guard: Some(file),
        }
    }

    /// A parameter file that outlives the invocation.
    pub fn kept(path: PathBuf) -> Self {
        Self { path, guard: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_scoped(&self) -> bool {
        self.guard.is_some()
    }
}

/// Fully resolved, single-use description of one decoder process.
#[derive(Debug)]
pub struct Invocation {
    /// Model that built this invocation.
    pub model: String,

    pub executable: PathBuf,

    pub args: Vec<String>,

    pub source_file: PathBuf,

    pub output_file: PathBuf,

    pub output_format: OutputFormat,

    /// Reference sequence handed to decoders that compute PSNR themselves.
    pub reference_file: Option<PathBuf>,

    /// Generated parameter file, if the adapter needs one.
    pub config: Option<ConfigArtifact>,
}

impl Invocation {
    /// Command line rendered for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.executable.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Observed outcome of one decoder process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    /// Process exit code, or [`SYNTHETIC_EXIT_CODE`] if the harness killed it.
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// The per-invocation timeout elapsed and the process was killed.
    pub duration_exceeded: bool,

    /// The case was cancelled while this process ran.
    pub cancelled: bool,

    /// Wall-clock time from spawn to reap.
    #[serde(with = "duration_ms")]
    pub wall_time: Duration,
}

impl ExecutionResult {
    /// Whether the decoder ran to completion and exited with 0.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.duration_exceeded && !self.cancelled
    }

    /// One-line description of a failed run.
    pub fn failure_reason(&self) -> String {
        if self.cancelled {
            "cancelled".to_string()
        } else if self.duration_exceeded {
            format!("timed out after {}ms", self.wall_time.as_millis())
        } else {
            format!("decoder exited with code {}", self.exit_code)
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
