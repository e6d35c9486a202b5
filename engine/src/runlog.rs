//! Run log: counts warnings and errors of one copy run or daemon tick.
//!
//! Every message goes to `tracing`, is echoed to the progress callback and,
//! for copy runs, appended to the case log file in the trigger directory.

use crate::progress::{self, ProgressCallback};
use chrono::Local;
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::Path;

pub struct RunLog<'a> {
    progress: Option<&'a dyn ProgressCallback>,
    file: Option<LineWriter<File>>,
    warnings: usize,
    errors: usize,
}

impl<'a> RunLog<'a> {
    pub fn new(progress: Option<&'a dyn ProgressCallback>) -> Self {
        RunLog {
            progress,
            file: None,
            warnings: 0,
            errors: 0,
        }
    }

    /// Also write every line to `path` (truncated first).
    pub fn with_file(mut self, path: &Path) -> io::Result<Self> {
        self.file = Some(LineWriter::new(File::create(path)?));
        Ok(self)
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{message}");
        self.write_line("INFO", message);
        progress::emit(self.progress, message);
    }

    pub fn warning(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{message}");
        self.write_line("WARNING", message);
        progress::emit(self.progress, &format!("WARNING {message}"));
        self.warnings += 1;
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!("{message}");
        self.write_line("ERROR", message);
        progress::emit(self.progress, &format!("ERROR {message}"));
        self.errors += 1;
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    fn write_line(&mut self, level: &str, message: &str) {
        if let Some(file) = self.file.as_mut() {
            let now = Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
            if let Err(e) = writeln!(file, "{now} {level} {message}") {
                tracing::warn!("Unable to write case log: {e}");
                self.file = None;
            }
        }
    }
}
