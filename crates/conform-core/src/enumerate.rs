//! Input file discovery.
//!
//! A file is selected iff it matches at least one include pattern (an empty
//! include set matches everything) and none of the exclude patterns.
//! Patterns without a `/` are matched against the file name; patterns with
//! a `/` are matched against the path relative to the source directory.
//!
//! Glob syntax: `*` (any run of non-`/` characters), `?` (one non-`/`
//! character), `**` (any run including `/`), `[abc]` / `[!abc]` classes.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::domain::error::{ConformError, Result};

/// One compiled glob.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
    match_path: bool,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let translated = glob_to_regex(pattern)?;
        let regex = Regex::new(&translated).map_err(|e| ConformError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
            match_path: pattern.contains('/'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match against a `/`-separated path relative to the source directory.
    pub fn matches(&self, relative: &str) -> bool {
        if self.match_path {
            self.regex.is_match(relative)
        } else {
            let name = relative.rsplit('/').next().unwrap_or(relative);
            self.regex.is_match(name)
        }
    }
}

fn glob_to_regex(pattern: &str) -> Result<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .skip(1)
                    .position(|&c| c == ']')
                    .map(|p| i + 2 + p)
                    .ok_or_else(|| ConformError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: "unterminated character class".to_string(),
                    })?;
                out.push('[');
                let mut body = &chars[i + 1..close];
                if let Some('!') | Some('^') = body.first() {
                    out.push('^');
                    body = &body[1..];
                }
                for &c in body {
                    if matches!(c, '\\' | '[' | ']' | '&' | '~') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push(']');
                i = close + 1;
                continue;
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }

    out.push('$');
    Ok(out)
}

/// Include/exclude filter over a source directory.
#[derive(Debug, Clone)]
pub struct FileEnumerator {
    includes: Vec<GlobPattern>,
    excludes: Vec<GlobPattern>,
}

impl FileEnumerator {
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| GlobPattern::new(p))
                .collect::<Result<Vec<_>>>()
        };
        Ok(Self {
            includes: compile(includes)?,
            excludes: compile(excludes)?,
        })
    }

    /// Whether the relative path `relative` is selected.
    pub fn matches(&self, relative: &str) -> bool {
        let included =
            self.includes.is_empty() || self.includes.iter().any(|p| p.matches(relative));
        included && !self.excludes.iter().any(|p| p.matches(relative))
    }

    /// Selected files under `source_dir`, as paths relative to it, sorted
    /// component-wise.
    pub fn enumerate(&self, source_dir: &Path) -> Result<Vec<PathBuf>> {
        if !source_dir.is_dir() {
            return Err(ConformError::NotFound(source_dir.to_path_buf()));
        }

        let mut found = Vec::new();
        walk(source_dir, Path::new(""), &mut found)?;

        let mut selected: Vec<(String, PathBuf)> = found
            .into_iter()
            .map(|rel| (relative_key(&rel), rel))
            .filter(|(key, _)| self.matches(key))
            .collect();
        selected.sort_by(|a, b| a.1.cmp(&b.1));

        debug!(
            source_dir = %source_dir.display(),
            count = selected.len(),
            "enumerated input files"
        );
        Ok(selected.into_iter().map(|(_, rel)| rel).collect())
    }
}

/// Enumerate `source_dir` with the given include/exclude globs.
pub fn enumerate(
    source_dir: &Path,
    includes: &[String],
    excludes: &[String],
) -> Result<Vec<PathBuf>> {
    FileEnumerator::new(includes, excludes)?.enumerate(source_dir)
}

/// `/`-joined form of a relative path, used for matching and for keying
/// digest records.
pub fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk(root: &Path, relative: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(root.join(relative))? {
        let entry = entry?;
        let rel = relative.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(root, &rel, out)?;
        } else if file_type.is_file() || (file_type.is_symlink() && root.join(&rel).is_file()) {
            out.push(rel);
        }
    }
    Ok(())
}
