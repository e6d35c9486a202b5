//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples the copy
//! engine and the daemon from whatever displays their messages (terminal,
//! GUI text area, channel to another thread).

/// Receiver of human-readable progress messages.
///
/// Called synchronously at each major step. Closures taking `&str`
/// implement it directly.
pub trait ProgressCallback: Send {
    /// Deliver one message.
    fn emit(&self, message: &str);
}

impl<F> ProgressCallback for F
where
    F: Fn(&str) + Send,
{
    fn emit(&self, message: &str) {
        self(message)
    }
}

/// Emit through an optional callback.
pub(crate) fn emit(progress: Option<&dyn ProgressCallback>, message: &str) {
    if let Some(callback) = progress {
        callback.emit(message);
    }
}

/// Human-readable byte count, e.g. `1.50 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
