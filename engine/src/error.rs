//! Error types for the copy engine and the surveillance daemon.
//!
//! `EngineError` covers conditions that stop one unit of work: a source root,
//! a single file, an archive or a case under verification. Which of them abort
//! a root and which are merely logged is decided by the caller; see `job` and
//! `surveillance`. Verification discrepancies are not errors at all, they are
//! counted as [`crate::verify::Mismatch`] values.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source root does not exist or is not a directory
    #[error("Not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    /// A source path is longer than the configured limit
    #[error("Path has {len} characters, more than the limit of {limit}: {}", path.display())]
    PathTooLong { path: PathBuf, len: usize, limit: usize },

    /// Path cannot be used (e.g. a root without a final component)
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Job was driven out of order
    #[error("Invalid job state: {reason}")]
    InvalidState { reason: String },

    /// Failed to enumerate the source root
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory
    #[error("Unable to create directory {}: {source}", path.display())]
    DirectoryCreateFailed { path: PathBuf, source: io::Error },

    /// Failed to read a file
    #[error("Failed to read file {}: {source}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write a file
    #[error("Failed to write file {}: {source}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Streaming copy failed part way
    #[error("Unable to copy {} to {}: {source}", src.display(), dst.display())]
    FileCopyFailed {
        src: PathBuf,
        dst: PathBuf,
        source: io::Error,
    },

    /// Destination bytes differ from what was read from the source
    #[error("Source file and {} are not identical (expected {expected}, found {actual})", path.display())]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The archive itself could not be built or finalized
    #[error("Unable to build archive {}: {source}", path.display())]
    ArchiveBuildFailed {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// An existing archive could not be opened for reading
    #[error("Unable to open archive {}: {source}", path.display())]
    ArchiveOpenFailed {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// Manifest could not be written
    #[error("Unable to write manifest {}: {source}", path.display())]
    ManifestWriteFailed { path: PathBuf, source: io::Error },

    /// A second manifest entry for a path already listed
    #[error("Duplicate manifest entry: {path}")]
    DuplicateEntry { path: String },

    /// The archive name of a directory is already used in its parent
    #[error("Unable to archive {}: {} is already taken", dir.display(), path.display())]
    ArchiveNameTaken { dir: PathBuf, path: PathBuf },

    /// A source entry would be overwritten by the engine's own output
    #[error("Source entry {} clashes with the reserved name '{name}'", path.display())]
    ReservedName { path: PathBuf, name: String },

    /// Manifest content is malformed
    #[error("Malformed manifest {} at line {line}: {reason}", path.display())]
    ManifestParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Another process holds the case lock
    #[error("Case is locked by another process: {}", path.display())]
    CaseLocked { path: PathBuf },

    /// Lock file could not be created
    #[error("Unable to create lock {}: {source}", path.display())]
    LockFailed { path: PathBuf, source: io::Error },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreateFailed { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::FileCopyFailed { source, .. }
            | Self::ManifestWriteFailed { source, .. }
            | Self::LockFailed { source, .. } => source.raw_os_error().map(|e| e as u32),
            _ => None,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Unable to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_path() {
        let err = EngineError::NotADirectory {
            path: PathBuf::from("/media/stick/case1"),
        };
        assert_eq!(err.to_string(), "Not a directory: /media/stick/case1");
    }

    #[test]
    fn test_path_too_long_message() {
        let err = EngineError::PathTooLong {
            path: PathBuf::from("/media/stick/case1/deep"),
            len: 300,
            limit: 230,
        };
        assert_eq!(
            err.to_string(),
            "Path has 300 characters, more than the limit of 230: /media/stick/case1/deep"
        );
    }

    #[test]
    fn test_raw_os_error_passthrough() {
        let err = EngineError::ReadError {
            path: PathBuf::from("a"),
            source: io::Error::from_raw_os_error(2),
        };
        assert_eq!(err.raw_os_error(), Some(2));
        assert_eq!(
            EngineError::CaseLocked { path: PathBuf::from("a") }.raw_os_error(),
            None
        );
    }
}
