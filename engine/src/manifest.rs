//! The manifest: tab separated list of relative path, size and content hash.
//!
//! ```text
//! Path\tSize\tHash
//! doc.txt\t12\t<hex digest>
//! bulk.zip\t4711\t<hex digest>
//! ```
//!
//! Written by the copy engine into the destination and the trigger area,
//! read by the surveillance daemon. Paths use `/` separators. The file has no
//! trailing newline; a header without entries is a valid, empty manifest.

use crate::error::EngineError;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

pub const HEADER: &str = "Path\tSize\tHash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub hash: String,
}

/// Ordered manifest entries (append order), at most one per path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    paths: BTreeSet<String>,
}

/// Expected sizes and hashes keyed by relative path, as verifiers consume them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedFiles {
    pub sizes: BTreeMap<String, u64>,
    pub hashes: BTreeMap<String, String>,
}

impl ExpectedFiles {
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    ///
    /// # Errors
    /// `DuplicateEntry` if `path` is already listed; the manifest is unchanged.
    pub fn push(
        &mut self,
        path: impl Into<String>,
        size: u64,
        hash: impl Into<String>,
    ) -> Result<(), EngineError> {
        let path = path.into();
        if !self.paths.insert(path.clone()) {
            return Err(EngineError::DuplicateEntry { path });
        }
        self.entries.push(ManifestEntry {
            path,
            size,
            hash: hash.into(),
        });
        Ok(())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as TSV text.
    pub fn to_tsv(&self) -> String {
        let mut tsv = String::from(HEADER);
        for entry in &self.entries {
            tsv.push_str(&format!("\n{}\t{}\t{}", entry.path, entry.size, entry.hash));
        }
        tsv
    }

    /// Parse TSV text; `source` only names the file in errors.
    pub fn parse(content: &str, source: &Path) -> Result<Self, EngineError> {
        let parse_error = |line: usize, reason: String| EngineError::ManifestParse {
            path: source.to_path_buf(),
            line,
            reason,
        };

        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut lines = content.lines().enumerate();
        match lines.next() {
            Some((_, header)) if header.trim_end() == HEADER => {}
            Some((_, header)) => {
                return Err(parse_error(1, format!("unexpected header '{header}'")))
            }
            None => return Err(parse_error(1, "empty file".to_string())),
        }

        let mut manifest = Manifest::new();
        for (index, line) in lines {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let [path, size, hash] = fields[..] else {
                return Err(parse_error(
                    index + 1,
                    format!("expected 3 fields, found {}", fields.len()),
                ));
            };
            let size = size
                .parse::<u64>()
                .map_err(|e| parse_error(index + 1, format!("invalid size '{size}': {e}")))?;
            if path.is_empty() || hash.is_empty() {
                return Err(parse_error(index + 1, "empty path or hash".to_string()));
            }
            manifest
                .push(path, size, hash)
                .map_err(|e| parse_error(index + 1, e.to_string()))?;
        }
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn read(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path).map_err(|e| EngineError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Write the TSV text to `path` (UTF-8).
    pub fn write(&self, path: &Path) -> Result<(), EngineError> {
        fs::write(path, self.to_tsv()).map_err(|e| EngineError::ManifestWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Size and hash lookups for verification.
    pub fn expected(&self) -> ExpectedFiles {
        let mut expected = ExpectedFiles::default();
        for entry in &self.entries {
            expected.sizes.insert(entry.path.clone(), entry.size);
            expected.hashes.insert(entry.path.clone(), entry.hash.clone());
        }
        expected
    }
}
