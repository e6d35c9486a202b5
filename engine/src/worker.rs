//! Background copy worker.
//!
//! Front ends that must stay responsive run the copy engine on its own
//! thread and drain progress messages from a channel while it works.

use crate::config::{CopyConfig, ManifestConfig};
use crate::error::EngineError;
use crate::job::run_copy;
use crate::model::CopyReport;
use crossbeam_channel::{unbounded, Receiver};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

/// Handle to a copy run on a background thread.
pub struct CopyWorker {
    /// Progress messages in emission order; disconnects when the run ends
    pub progress: Receiver<String>,
    handle: JoinHandle<CopyReport>,
}

impl CopyWorker {
    /// Block until the run has finished.
    pub fn wait(self) -> Result<CopyReport, EngineError> {
        self.handle.join().map_err(|_| EngineError::InvalidState {
            reason: "copy worker panicked".to_string(),
        })
    }
}

/// Spawn a background thread running [`run_copy`] over `roots`.
pub fn spawn_copy(copy: CopyConfig, manifest: ManifestConfig, roots: Vec<PathBuf>) -> CopyWorker {
    let (tx, rx) = unbounded::<String>();

    let handle = thread::spawn(move || {
        let callback = move |message: &str| {
            // Receiver may be gone; the run continues regardless
            let _ = tx.send(message.to_string());
        };
        run_copy(&copy, &manifest, &roots, Some(&callback))
    });

    CopyWorker {
        progress: rx,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_worker_streams_progress_and_returns_report() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let case = temp_dir.path().join("stick/case1");
        fs::create_dir_all(&case).unwrap();
        fs::write(case.join("doc.txt"), b"hello world!").unwrap();
        let copy = CopyConfig {
            destination: temp_dir.path().join("import"),
            trigger_root: temp_dir.path().join("trigger/lab"),
            log_name: "log.txt".to_string(),
            max_path_len: 230,
            zip_depth: 2,
            zip_file_quantity: 10,
        };

        let worker = spawn_copy(copy, ManifestConfig::default(), vec![case]);
        let messages: Vec<String> = worker.progress.iter().collect();
        let report = worker.wait().expect("Worker should not panic");

        assert!(!report.failed());
        assert!(messages.iter().any(|m| m.starts_with("Copying doc.txt")));
        assert!(temp_dir.path().join("import/case1/doc.txt").is_file());
    }
}
