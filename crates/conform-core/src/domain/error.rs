//! Domain-level error taxonomy for the conformance harness.

use std::path::PathBuf;

use crate::domain::case::Action;

/// Errors produced while loading the case registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate case name: {0}")]
    DuplicateCase(String),

    #[error("duplicate model name: {0}")]
    DuplicateModel(String),

    #[error("model {model} has invalid binding: {reason}")]
    InvalidModel { model: String, reason: String },
}

/// Conformance harness errors.
///
/// Per-file decoder problems never surface as a `ConformError`; they are
/// folded into a file verdict. What remains here either aborts a case
/// (configuration and I/O) or the whole run (registry).
#[derive(Debug, thiserror::Error)]
pub enum ConformError {
    #[error("source directory not found: {0}")]
    NotFound(PathBuf),

    #[error("case {case} references unbound model: {model}")]
    UnboundModel { case: String, model: String },

    #[error("model {model} does not support codec {codec} with action {action}")]
    UnsupportedCombination {
        model: String,
        codec: String,
        action: Action,
    },

    #[error("executable not found for model {model}: {path}")]
    MissingExecutable { model: String, path: PathBuf },

    #[error("failed to spawn {executable}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("digest error: {0}")]
    Digest(#[from] crate::digest::DigestError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("case cancelled")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConformError {
    /// Whether this error stems from the case description or the model
    /// binding rather than from the host.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ConformError::NotFound(_)
                | ConformError::UnboundModel { .. }
                | ConformError::UnsupportedCombination { .. }
                | ConformError::MissingExecutable { .. }
                | ConformError::Spawn { .. }
                | ConformError::InvalidPattern { .. }
                | ConformError::Registry(_)
        )
    }
}

/// Result type for conformance harness operations.
pub type Result<T> = std::result::Result<T, ConformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conform_error_display() {
        let err = ConformError::NotFound(PathBuf::from("streams/vp8"));
        assert!(err.to_string().contains("source directory not found"));
        assert!(err.to_string().contains("streams/vp8"));

        let err = ConformError::UnboundModel {
            case: "libvpx-vp8-digest".to_string(),
            model: "libvpx".to_string(),
        };
        assert!(err.to_string().contains("unbound model: libvpx"));
    }

    #[test]
    fn test_unsupported_combination_names_action() {
        let err = ConformError::UnsupportedCombination {
            model: "ffmpeg".to_string(),
            codec: "h264".to_string(),
            action: Action::DigestByFrames,
        };
        let msg = err.to_string();
        assert!(msg.contains("ffmpeg"));
        assert!(msg.contains("digest_by_frames"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(ConformError::NotFound(PathBuf::from("x")).is_configuration());
        assert!(ConformError::MissingExecutable {
            model: "jm".to_string(),
            path: PathBuf::from("/opt/jm/ldecod"),
        }
        .is_configuration());
        assert!(!ConformError::Cancelled.is_configuration());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!ConformError::Io(io).is_configuration());
    }
}
