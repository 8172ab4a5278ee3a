use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{DigestError, DigestRecord, Result};

const RECORD_SUFFIX: &str = ".digest.json";

/// Golden digest records keyed by input file.
///
/// Layout: `<root>/<input path relative to srcdir>.digest.json`
pub struct DigestStore {
    root: PathBuf,
}

impl DigestStore {
    /// Create a store rooted at a case's output directory. Nothing is
    /// created on disk until the first record is written.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Where the record for `file` lives.
    pub fn record_path(&self, file: &str) -> PathBuf {
        self.root.join(format!("{file}{RECORD_SUFFIX}"))
    }

    /// Write `record`, replacing any previous golden value.
    pub fn put(&self, record: &DigestRecord) -> Result<PathBuf> {
        let path = self.record_path(&record.file);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let mut content = serde_json::to_vec_pretty(record)?;
        content.push(b'\n');

        // Atomic write: write to temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&content)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(path)
    }

    /// Read the golden record for `file`.
    pub fn get(&self, file: &str) -> Result<DigestRecord> {
        let path = self.record_path(file);
        let content = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DigestError::MissingReference {
                    file: file.to_string(),
                }
            } else {
                DigestError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{Digest, DigestMode};

    fn make_store() -> (tempfile::TempDir, DigestStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DigestStore::new(dir.path().join("digests"));
        (dir, store)
    }

    fn record(file: &str) -> DigestRecord {
        DigestRecord::new(file, DigestMode::Whole, vec![Digest::compute(file.as_bytes())])
    }

    #[test]
    fn record_roundtrip() {
        let (_dir, store) = make_store();
        let rec = record("a.ivf");
        let path = store.put(&rec).unwrap();
        assert!(path.ends_with("a.ivf.digest.json"));
        assert_eq!(store.get("a.ivf").unwrap(), rec);
    }

    #[test]
    fn nested_input_paths_keep_structure() {
        let (dir, store) = make_store();
        store.put(&record("sub/b.ivf")).unwrap();
        assert!(dir.path().join("digests/sub/b.ivf.digest.json").is_file());
    }

    #[test]
    fn rewrite_is_byte_stable() {
        let (_dir, store) = make_store();
        let rec = record("a.ivf");
        let path = store.put(&rec).unwrap();
        let first = fs::read(&path).unwrap();
        store.put(&rec).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn missing_record_is_missing_reference() {
        let (_dir, store) = make_store();
        match store.get("nope.ivf") {
            Err(DigestError::MissingReference { file }) => assert_eq!(file, "nope.ivf"),
            other => panic!("expected MissingReference, got {other:?}"),
        }
        assert!(!store.record_path("nope.ivf").is_file());
    }

    #[test]
    fn put_replaces_previous_value() {
        let (_dir, store) = make_store();
        store.put(&record("a.ivf")).unwrap();
        let replacement =
            DigestRecord::new("a.ivf", DigestMode::Frames, vec![Digest::compute(b"f0")]);
        store.put(&replacement).unwrap();
        assert_eq!(store.get("a.ivf").unwrap().mode, DigestMode::Frames);
    }
}
