//! Exclusive case lock shared by the copy engine and the daemon.
//!
//! The lock is a file `<case>.lock` next to the trigger case directory,
//! created with create-new semantics. Keeping it outside the case directory
//! leaves the case contents (and the done archive) untouched and keeps it
//! out of the daemon's directory enumeration. Dropping the guard removes it.
//! A lock left behind by a crashed process must be removed by hand.

use crate::error::EngineError;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct CaseLock {
    path: PathBuf,
}

impl CaseLock {
    /// Take the lock for `case_dir`; its parent directory must exist.
    pub fn acquire(case_dir: &Path) -> Result<Self, EngineError> {
        let path = lock_path(case_dir)?;
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid {} at {}",
                    std::process::id(),
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                );
                tracing::debug!(lock = %path.display(), "case lock acquired");
                Ok(CaseLock { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(EngineError::CaseLocked { path })
            }
            Err(e) => Err(EngineError::LockFailed { path, source: e }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CaseLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(lock = %self.path.display(), "case lock released"),
            Err(e) => tracing::warn!(lock = %self.path.display(), error = %e, "unable to remove case lock"),
        }
    }
}

fn lock_path(case_dir: &Path) -> Result<PathBuf, EngineError> {
    match (case_dir.parent(), case_dir.file_name()) {
        (Some(parent), Some(name)) => {
            let mut file_name = name.to_os_string();
            file_name.push(".lock");
            Ok(parent.join(file_name))
        }
        _ => Err(EngineError::InvalidPath {
            path: case_dir.to_path_buf(),
            reason: "case directory has no parent".to_string(),
        }),
    }
}
