//! Filesystem operations module.
//!
//! This module provides the streaming primitives of the copy engine:
//! - Copying a file while hashing it, then re-reading the destination
//! - Packing a directory into a deflate zip archive
//! - Creating directories idempotently
//!
//! `copy_file` reads the destination back after writing it and compares
//! digests. That doubles destination I/O; it is the only thing that catches
//! bytes corrupted on the write path, so it stays.

use crate::checksums::{compute_file_checksum, create_hasher, ChecksumAlgorithm, ChecksumValue, BLOCK_SIZE};
use crate::error::EngineError;
use chrono::{DateTime, Datelike, Local, Timelike};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A verified copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFile {
    pub checksum: ChecksumValue,
    pub bytes: u64,
}

/// Result of packing a directory.
#[derive(Debug, Clone)]
pub struct ArchivedDir {
    /// Digest of the archive file as a whole
    pub checksum: ChecksumValue,
    /// Size of the archive file
    pub size: u64,
    /// Files that could not be added, relative to the archived directory
    pub failed_files: Vec<PathBuf>,
    /// Directories that could not be read or added
    pub failed_dirs: Vec<PathBuf>,
}

/// Copy `src` to `dst` block by block, hashing what was read.
///
/// The destination is then hashed independently. The source digest is
/// returned only if both agree; otherwise `IntegrityMismatch`.
pub fn copy_file(
    src: &Path,
    dst: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<CopiedFile, EngineError> {
    copy_file_through(src, dst, algorithm, |file| file)
}

/// `copy_file` with a hook wrapping the destination writer.
pub(crate) fn copy_file_through<W, F>(
    src: &Path,
    dst: &Path,
    algorithm: ChecksumAlgorithm,
    wrap: F,
) -> Result<CopiedFile, EngineError>
where
    W: Write,
    F: FnOnce(File) -> W,
{
    let copy_error = |e| EngineError::FileCopyFailed {
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        source: e,
    };

    let mut src_file = File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let src_mtime = src_file.metadata().and_then(|m| m.modified()).ok();

    let dst_file = File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;
    let mut writer = BufWriter::with_capacity(BLOCK_SIZE, wrap(dst_file));

    let mut hasher = create_hasher(algorithm);
    let mut buffer = vec![0u8; BLOCK_SIZE];
    let mut bytes = 0u64;
    loop {
        let n = match src_file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(copy_error(e)),
        };
        writer.write_all(&buffer[..n]).map_err(copy_error)?;
        hasher.update(&buffer[..n]);
        bytes += n as u64;
    }
    writer.flush().map_err(copy_error)?;
    drop(writer);
    let checksum = hasher.finalize();

    if let Some(mtime) = src_mtime {
        if let Err(e) = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime)) {
            tracing::debug!(path = %dst.display(), error = %e, "modification time not kept");
        }
    }

    let written = compute_file_checksum(dst, algorithm)?;
    if written != checksum {
        tracing::debug!(path = %dst.display(), algorithm = %checksum.algorithm(), "destination differs");
        return Err(EngineError::IntegrityMismatch {
            path: dst.to_path_buf(),
            expected: checksum.hex().to_string(),
            actual: written.hex().to_string(),
        });
    }

    Ok(CopiedFile { checksum, bytes })
}

/// Pack `src_dir` into a new deflate archive at `zip_path`.
///
/// Member names are relative to `src_dir`. A member that cannot be read is
/// recorded and skipped; the archive is still finalized. Members are added
/// in name order with the source modification time, so an unchanged source
/// produces identical archive bytes.
///
/// # Errors
/// `ArchiveBuildFailed` when the archive itself cannot be written.
pub fn archive_directory(
    src_dir: &Path,
    zip_path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<ArchivedDir, EngineError> {
    let build_error = |e: zip::result::ZipError| EngineError::ArchiveBuildFailed {
        path: zip_path.to_path_buf(),
        source: e,
    };

    let file = File::create(zip_path).map_err(|e| build_error(e.into()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let base_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut failed_files = Vec::new();
    let mut failed_dirs = Vec::new();

    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(src_dir);
                failed_dirs.push(path.strip_prefix(src_dir).unwrap_or(path).to_path_buf());
                continue;
            }
        };
        let Ok(rel_path) = entry.path().strip_prefix(src_dir) else {
            continue;
        };
        let name = member_name(rel_path);
        let mtime = entry.metadata().ok().and_then(|m| m.modified().ok());
        let options = base_options.last_modified_time(zip_time(mtime));

        if entry.file_type().is_dir() {
            if zip.add_directory(name, options).is_err() {
                failed_dirs.push(rel_path.to_path_buf());
            }
            continue;
        }

        let mut member = match File::open(entry.path()) {
            Ok(member) => member,
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), error = %e, "not archived");
                failed_files.push(rel_path.to_path_buf());
                continue;
            }
        };
        let size = member.metadata().map(|m| m.len()).unwrap_or(0);
        zip.start_file(name, options.large_file(size >= u32::MAX as u64))
            .map_err(build_error)?;
        if let Err(e) = io::copy(&mut member, &mut zip) {
            tracing::debug!(path = %entry.path().display(), error = %e, "not archived");
            zip.abort_file().map_err(build_error)?;
            failed_files.push(rel_path.to_path_buf());
        }
    }

    let mut writer = zip.finish().map_err(build_error)?;
    writer.flush().map_err(|e| build_error(e.into()))?;
    drop(writer);

    let checksum = compute_file_checksum(zip_path, algorithm)?;
    let size = fs::metadata(zip_path)
        .map_err(|e| EngineError::ReadError {
            path: zip_path.to_path_buf(),
            source: e,
        })?
        .len();

    Ok(ArchivedDir {
        checksum,
        size,
        failed_files,
        failed_dirs,
    })
}

/// Create `path` and its parents if absent.
pub fn ensure_dir(path: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreateFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Relative path with `/` separators, as used in manifests and zip members.
pub fn member_name(rel_path: &Path) -> String {
    rel_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn zip_time(mtime: Option<SystemTime>) -> zip::DateTime {
    mtime
        .and_then(|t| {
            let local: DateTime<Local> = t.into();
            zip::DateTime::from_date_and_time(
                u16::try_from(local.year()).ok()?,
                local.month() as u8,
                local.day() as u8,
                local.hour() as u8,
                local.minute() as u8,
                local.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}
