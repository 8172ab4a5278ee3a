//! Content digests of decoder output.
//!
//! - [`Digest`]: SHA-256 fingerprint, hex on the wire
//! - [`frames`]: frame boundary detection for per-frame digests
//! - [`store`]: golden digest records under a case's output directory
//! - [`engine`]: compute / persist / compare, one call per file

pub mod engine;
pub mod frames;
pub mod store;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as Sha2Digest, Sha256};
use thiserror::Error;

pub use engine::DigestEngine;
pub use frames::{ChromaFormat, FrameLayout};
pub use store::DigestStore;

/// Name recorded alongside every stored digest.
pub const ALGORITHM: &str = "sha256";

/// SHA-256 digest of decoded bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Compute the SHA-256 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    /// Finish a streaming computation.
    pub(crate) fn from_hasher(hasher: Sha256) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex().chars().take(12).collect::<String>())
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| DigestError::InvalidDigest(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(DigestError::InvalidDigest(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether a record holds one digest for the whole output or one per frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DigestMode {
    Whole,
    Frames,
}

/// Digest(s) of one input file's decoded output.
///
/// Stored records carry no timestamps or absolute paths so that the same
/// decoder output always serializes to the same bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DigestRecord {
    /// Input file path relative to the case's source directory.
    pub file: String,

    pub algorithm: String,

    pub mode: DigestMode,

    pub digests: Vec<Digest>,

    /// Set once the record was checked against a baseline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_reference: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_digests: Option<Vec<Digest>>,
}

impl DigestRecord {
    pub fn new(file: impl Into<String>, mode: DigestMode, digests: Vec<Digest>) -> Self {
        Self {
            file: file.into(),
            algorithm: ALGORITHM.to_string(),
            mode,
            digests,
            matched_reference: None,
            reference_digests: None,
        }
    }

    /// Index of the first digest that differs from the baseline.
    ///
    /// A length difference counts as a mismatch at the shorter length.
    pub fn first_mismatch(&self) -> Option<usize> {
        let reference = self.reference_digests.as_ref()?;
        let common = self.digests.len().min(reference.len());
        (0..common)
            .find(|&i| self.digests[i] != reference[i])
            .or_else(|| (self.digests.len() != reference.len()).then_some(common))
    }
}

/// Errors from digest computation and storage.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("no stored digest for {file}")]
    MissingReference { file: String },

    #[error("cannot split {file} into frames: no frame layout known")]
    UnknownFrameLayout { file: String },

    #[error("malformed Y4M stream: {0}")]
    MalformedY4m(String),

    #[error("invalid frame layout: {0}")]
    InvalidLayout(String),

    #[error("truncated frame {frame}: expected {expected} bytes, found {actual}")]
    TruncatedFrame {
        frame: usize,
        expected: usize,
        actual: usize,
    },

    #[error("decoder produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("invalid digest hex: {0}")]
    InvalidDigest(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DigestError>;
