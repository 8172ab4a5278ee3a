//! Per-file digest operations: compute, persist, check.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest as Sha2Digest, Sha256};
use tracing::debug;

use super::frames::{digest_frames, FrameLayout};
use super::store::DigestStore;
use super::{Digest, DigestError, DigestMode, DigestRecord, Result};

const READ_CHUNK: usize = 1 << 20;

/// Digest engine bound to one case's output directory.
pub struct DigestEngine {
    store: DigestStore,
}

impl DigestEngine {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            store: DigestStore::new(output_dir),
        }
    }

    /// Digest the decoder output at `output` on behalf of input `file`.
    ///
    /// Only output bytes are hashed; `file` is recorded but never hashed.
    pub fn compute(
        file: &str,
        output: &Path,
        mode: DigestMode,
        layout: Option<FrameLayout>,
    ) -> Result<DigestRecord> {
        let digests = match mode {
            DigestMode::Whole => vec![hash_file(output)?],
            DigestMode::Frames => {
                let handle = File::open(output).map_err(|e| missing_output(e, output))?;
                let mut reader = BufReader::with_capacity(READ_CHUNK, handle);
                digest_frames(file, &mut reader, layout)?
            }
        };
        debug!(file = %file, mode = ?mode, count = digests.len(), "computed digest");
        Ok(DigestRecord::new(file, mode, digests))
    }

    /// Store `record` as the golden value for its file.
    pub fn persist(&self, record: &DigestRecord) -> Result<PathBuf> {
        self.store.put(record)
    }

    /// Load the golden value for `file`, failing with `MissingReference`.
    pub fn reference(&self, file: &str) -> Result<DigestRecord> {
        self.store.get(file)
    }

    /// Attach `reference` to `record` and decide whether they match.
    pub fn check(mut record: DigestRecord, reference: &DigestRecord) -> DigestRecord {
        let matched = record.mode == reference.mode
            && record.algorithm == reference.algorithm
            && record.digests == reference.digests;
        record.matched_reference = Some(matched);
        record.reference_digests = Some(reference.digests.clone());
        record
    }
}

fn hash_file(path: &Path) -> Result<Digest> {
    let mut file = File::open(path).map_err(|e| missing_output(e, path))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Digest::from_hasher(hasher))
}

fn missing_output(err: std::io::Error, path: &Path) -> DigestError {
    if err.kind() == ErrorKind::NotFound {
        DigestError::MissingOutput(path.to_path_buf())
    } else {
        DigestError::Io(err)
    }
}
