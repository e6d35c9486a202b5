//! Checksum computation.
//!
//! This module provides:
//! - The content digests used in manifests (SHA-256, BLAKE3)
//! - Streaming checksum computation for files and arbitrary readers
//!
//! The copy engine and the verifiers must agree on one algorithm; it is part
//! of the shared `[manifest]` configuration.

use crate::error::EngineError;
use serde::Deserialize;
use std::fmt;
use std::io::{self, Read};
use std::path::Path;

/// Block size for streamed reads and writes.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// SHA-256 (cryptographic, 256-bit)
    #[default]
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    /// Create a new checksum value
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    /// Get the algorithm
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Get the hex string representation
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Trait for computing checksums incrementally
pub trait ChecksumHasher {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the checksum value
    fn finalize(self: Box<Self>) -> ChecksumValue;
}

/// SHA-256 hasher (backed by sha2 crate)
struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        use sha2::Digest;
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", digest))
    }
}

/// BLAKE3 hasher (backed by blake3 crate)
struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl ChecksumHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Blake3, digest.to_hex().to_string())
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        ChecksumAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
    }
}

/// Compute the checksum of everything a reader yields.
pub fn compute_reader_checksum<R: Read>(
    reader: &mut R,
    algorithm: ChecksumAlgorithm,
) -> io::Result<ChecksumValue> {
    let mut hasher = create_hasher(algorithm);
    let mut buffer = vec![0u8; BLOCK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finalize())
}

/// Compute checksum for a file
pub fn compute_file_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumValue, EngineError> {
    let read_error = |e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = std::fs::File::open(path).map_err(read_error)?;
    compute_reader_checksum(&mut file, algorithm).map_err(read_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_display() {
        assert_eq!(ChecksumAlgorithm::Sha256.to_string(), "sha256");
        assert_eq!(ChecksumAlgorithm::Blake3.to_string(), "blake3");
    }

    #[test]
    fn test_sha256_hasher() {
        let mut hasher = create_hasher(ChecksumAlgorithm::Sha256);
        hasher.update(b"hel");
        hasher.update(b"lo");
        let checksum = hasher.finalize();
        assert_eq!(checksum.algorithm(), ChecksumAlgorithm::Sha256);
        assert_eq!(
            checksum.hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_blake3_matches_reference() {
        let mut hasher = create_hasher(ChecksumAlgorithm::Blake3);
        hasher.update(b"hello");
        assert_eq!(
            hasher.finalize().hex(),
            blake3::hash(b"hello").to_hex().as_str()
        );
    }

    #[test]
    fn test_reader_checksum_spans_blocks() {
        let data = vec![7u8; BLOCK_SIZE * 2 + 17];
        let streamed =
            compute_reader_checksum(&mut data.as_slice(), ChecksumAlgorithm::Sha256).unwrap();

        let mut hasher = create_hasher(ChecksumAlgorithm::Sha256);
        hasher.update(&data);
        assert_eq!(streamed, hasher.finalize());
    }

    #[test]
    fn test_file_checksum_missing_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result =
            compute_file_checksum(&temp_dir.path().join("missing"), ChecksumAlgorithm::Sha256);
        assert!(matches!(result, Err(EngineError::ReadError { .. })));
    }
}
