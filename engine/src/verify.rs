//! Verification of a manifest against a downstream copy.
//!
//! Two storage shapes are supported behind one trait: a live directory and a
//! zip archive whose members sit below `<archive stem>/`. Both check every
//! manifest entry and report all discrepancies instead of stopping at the
//! first one.

use crate::checksums::{compute_file_checksum, compute_reader_checksum, ChecksumAlgorithm};
use crate::error::EngineError;
use crate::fs_ops::member_name;
use crate::manifest::ExpectedFiles;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchKind {
    Missing,
    Size { expected: u64, actual: u64 },
    Hash { expected: String, actual: String },
    Unreadable(String),
}

/// One discrepancy for one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub path: String,
    pub kind: MismatchKind,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MismatchKind::Missing => write!(f, "Did not find {}", self.path),
            MismatchKind::Size { expected, actual } => write!(
                f,
                "Mismatching file size of {} (expected {expected}, found {actual})",
                self.path
            ),
            MismatchKind::Hash { expected, actual } => write!(
                f,
                "Mismatching hash value of {} (expected {expected}, found {actual})",
                self.path
            ),
            MismatchKind::Unreadable(reason) => {
                write!(f, "Unable to read {}: {reason}", self.path)
            }
        }
    }
}

/// Outcome of checking one location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub checked: usize,
    pub mismatches: Vec<Mismatch>,
}

impl CheckReport {
    pub fn mismatch_count(&self) -> usize {
        self.mismatches.len()
    }

    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// A downstream copy that can be checked against a manifest.
pub trait Verifier {
    /// Where the copy lives, for log messages
    fn location(&self) -> &Path;

    /// Check presence, size and hash of every expected entry.
    fn check(&mut self, expected: &ExpectedFiles) -> CheckReport;
}

/// A live directory tree.
pub struct DirectoryVerifier {
    path: PathBuf,
    algorithm: ChecksumAlgorithm,
}

impl DirectoryVerifier {
    pub fn new(path: impl Into<PathBuf>, algorithm: ChecksumAlgorithm) -> Self {
        DirectoryVerifier {
            path: path.into(),
            algorithm,
        }
    }

    /// All files below the directory with their sizes.
    fn enumerate(&self) -> HashMap<String, u64> {
        WalkDir::new(&self.path)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let rel = e.path().strip_prefix(&self.path).ok()?;
                let size = e.metadata().ok()?.len();
                Some((member_name(rel), size))
            })
            .collect()
    }
}

impl Verifier for DirectoryVerifier {
    fn location(&self) -> &Path {
        &self.path
    }

    fn check(&mut self, expected: &ExpectedFiles) -> CheckReport {
        tracing::debug!(path = %self.path.display(), "checking directory");
        let present = self.enumerate();
        let mut report = CheckReport::default();

        for (rel_path, &size) in &expected.sizes {
            report.checked += 1;
            let kind = match present.get(rel_path) {
                None => Some(MismatchKind::Missing),
                Some(&actual) if actual != size => Some(MismatchKind::Size {
                    expected: size,
                    actual,
                }),
                Some(_) => {
                    let file_path = self.path.join(rel_path);
                    match compute_file_checksum(&file_path, self.algorithm) {
                        Ok(actual) => hash_mismatch(expected, rel_path, actual.hex()),
                        Err(e) => Some(MismatchKind::Unreadable(e.to_string())),
                    }
                }
            };
            if let Some(kind) = kind {
                report.mismatches.push(Mismatch {
                    path: rel_path.clone(),
                    kind,
                });
            }
        }
        report
    }
}

/// A zip archive holding the case below `<stem>/`.
pub struct ArchiveVerifier {
    path: PathBuf,
    stem: String,
    archive: ZipArchive<BufReader<File>>,
    algorithm: ChecksumAlgorithm,
}

impl ArchiveVerifier {
    /// Open the archive for reading.
    pub fn open(path: impl Into<PathBuf>, algorithm: ChecksumAlgorithm) -> Result<Self, EngineError> {
        let path = path.into();
        let file = File::open(&path).map_err(|e| EngineError::ReadError {
            path: path.clone(),
            source: e,
        })?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(|e| {
            EngineError::ArchiveOpenFailed {
                path: path.clone(),
                source: e,
            }
        })?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(ArchiveVerifier {
            path,
            stem,
            archive,
            algorithm,
        })
    }

    fn members(&mut self) -> HashMap<String, u64> {
        let mut members = HashMap::new();
        for index in 0..self.archive.len() {
            if let Ok(member) = self.archive.by_index(index) {
                if !member.is_dir() {
                    members.insert(member.name().to_string(), member.size());
                }
            }
        }
        members
    }
}

impl Verifier for ArchiveVerifier {
    fn location(&self) -> &Path {
        &self.path
    }

    fn check(&mut self, expected: &ExpectedFiles) -> CheckReport {
        tracing::debug!(path = %self.path.display(), "checking archive");
        let members = self.members();
        let mut report = CheckReport::default();

        for (rel_path, &size) in &expected.sizes {
            report.checked += 1;
            let name = format!("{}/{}", self.stem, rel_path);
            let kind = match members.get(&name) {
                None => Some(MismatchKind::Missing),
                Some(&actual) if actual != size => Some(MismatchKind::Size {
                    expected: size,
                    actual,
                }),
                Some(_) => match self.archive.by_name(&name) {
                    Ok(mut member) => match compute_reader_checksum(&mut member, self.algorithm) {
                        Ok(actual) => hash_mismatch(expected, rel_path, actual.hex()),
                        Err(e) => Some(MismatchKind::Unreadable(e.to_string())),
                    },
                    Err(e) => Some(MismatchKind::Unreadable(e.to_string())),
                },
            };
            if let Some(kind) = kind {
                report.mismatches.push(Mismatch { path: name, kind });
            }
        }
        report
    }
}

fn hash_mismatch(expected: &ExpectedFiles, rel_path: &str, actual: &str) -> Option<MismatchKind> {
    let wanted = expected.hashes.get(rel_path).map(String::as_str).unwrap_or("");
    if wanted.eq_ignore_ascii_case(actual) {
        None
    } else {
        Some(MismatchKind::Hash {
            expected: wanted.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::archive_directory;
    use crate::manifest::Manifest;
    use std::fs;

    fn build_case(root: &Path) -> ExpectedFiles {
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("doc.txt"), b"hello world!").unwrap();
        fs::write(root.join("sub/data.bin"), vec![1u8; 300]).unwrap();

        let mut manifest = Manifest::new();
        for rel in ["doc.txt", "sub/data.bin"] {
            let path = root.join(rel);
            let hash = compute_file_checksum(&path, ChecksumAlgorithm::Sha256).unwrap();
            manifest
                .push(rel, fs::metadata(&path).unwrap().len(), hash.hex())
                .unwrap();
        }
        manifest.expected()
    }

    #[test]
    fn test_directory_round_trip_is_clean() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let case = temp_dir.path().join("case1");
        let expected = build_case(&case);

        let report = DirectoryVerifier::new(&case, ChecksumAlgorithm::Sha256).check(&expected);

        assert_eq!(report.checked, 2);
        assert!(report.is_clean(), "unexpected: {:?}", report.mismatches);
    }

    #[test]
    fn test_directory_reports_each_kind() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let case = temp_dir.path().join("case1");
        let mut expected = build_case(&case);
        expected.sizes.insert("gone.txt".to_string(), 1);
        expected.hashes.insert("gone.txt".to_string(), "00".to_string());
        fs::write(case.join("sub/data.bin"), vec![1u8; 299]).unwrap();
        fs::write(case.join("doc.txt"), b"hello world?").unwrap();

        let report = DirectoryVerifier::new(&case, ChecksumAlgorithm::Sha256).check(&expected);

        assert_eq!(report.mismatch_count(), 3);
        let kinds: Vec<_> = report.mismatches.iter().map(|m| (m.path.as_str(), &m.kind)).collect();
        assert!(matches!(kinds[0], ("doc.txt", MismatchKind::Hash { .. })));
        assert!(matches!(kinds[1], ("gone.txt", MismatchKind::Missing)));
        assert!(matches!(
            kinds[2],
            ("sub/data.bin", MismatchKind::Size { expected: 300, actual: 299 })
        ));
    }

    #[test]
    fn test_archive_round_trip_is_clean() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let staging = temp_dir.path().join("staging");
        let expected = build_case(&staging.join("case1"));
        let zip_path = temp_dir.path().join("case1.zip");
        archive_directory(&staging, &zip_path, ChecksumAlgorithm::Sha256).unwrap();

        let mut verifier = ArchiveVerifier::open(&zip_path, ChecksumAlgorithm::Sha256).unwrap();
        let report = verifier.check(&expected);

        assert_eq!(verifier.location(), zip_path.as_path());
        assert!(report.is_clean(), "unexpected: {:?}", report.mismatches);
    }

    #[test]
    fn test_archive_missing_member() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let staging = temp_dir.path().join("staging");
        let expected = build_case(&staging.join("case1"));
        fs::remove_file(staging.join("case1/doc.txt")).unwrap();
        let zip_path = temp_dir.path().join("case1.zip");
        archive_directory(&staging, &zip_path, ChecksumAlgorithm::Sha256).unwrap();

        let report = ArchiveVerifier::open(&zip_path, ChecksumAlgorithm::Sha256)
            .unwrap()
            .check(&expected);

        assert_eq!(
            report.mismatches,
            vec![Mismatch {
                path: "case1/doc.txt".to_string(),
                kind: MismatchKind::Missing
            }]
        );
    }

    #[test]
    fn test_open_rejects_non_archive() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("case1.zip");
        fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(
            ArchiveVerifier::open(&path, ChecksumAlgorithm::Sha256),
            Err(EngineError::ArchiveOpenFailed { .. })
        ));
    }
}
