//! Core data model for copy runs.
//!
//! This module defines the structures the copy engine works on:
//! - CaseJob: one source root on its way to the destination
//! - JobState: lifecycle of a CaseJob
//! - RootReport, CopyReport: what a run over several roots hands back

use crate::classify::Classification;
use crate::config::{CopyConfig, ManifestConfig};
use crate::manifest::Manifest;
use crate::scan::Tree;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;

/// One source root (a case) processed by the copy engine.
///
/// A CaseJob carries:
/// - Source, destination and trigger directories of the case
/// - The scanned tree and its classification once planned
/// - The manifest accumulated while running
/// - Warning and error counts of the run
#[derive(Debug)]
pub struct CaseJob {
    /// Unique identifier for this job
    pub id: Uuid,

    /// Source root as given by the operator
    pub source_path: PathBuf,

    /// Final component of the source root
    pub case_name: String,

    /// `<destination>/<case>`
    pub destination_path: PathBuf,

    /// `<trigger_root>/<case>`
    pub trigger_path: PathBuf,

    pub state: JobState,

    /// Scanned source tree (after planning)
    pub tree: Option<Tree>,

    /// What to create, copy and archive (after planning)
    pub plan: Option<Classification>,

    /// Entries appended while running
    pub manifest: Manifest,

    pub warnings: usize,
    pub errors: usize,

    /// When job execution started
    pub start_time: Option<SystemTime>,

    /// When job execution completed
    pub end_time: Option<SystemTime>,

    pub copy: CopyConfig,
    pub manifest_config: ManifestConfig,
}

/// The state of a case job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, not yet scanned
    Pending,
    /// Scanned and classified
    Planned,
    /// Currently executing
    Running,
    /// Finished without errors (warnings allowed)
    Succeeded,
    /// Aborted, or finished with at least one error
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Planned => write!(f, "planned"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootReport {
    pub source_path: PathBuf,
    pub state: JobState,
    pub manifest_entries: usize,
    pub warnings: usize,
    pub errors: usize,
    /// Reason the root was aborted, if it was
    pub abort_reason: Option<String>,
}

impl RootReport {
    pub(crate) fn from_job(job: &CaseJob, abort_reason: Option<String>) -> Self {
        RootReport {
            source_path: job.source_path.clone(),
            state: job.state,
            manifest_entries: job.manifest.len(),
            warnings: job.warnings,
            errors: job.errors,
            abort_reason,
        }
    }

    /// A root rejected before a job could be created.
    pub(crate) fn rejected(source_path: PathBuf, reason: String) -> Self {
        RootReport {
            source_path,
            state: JobState::Failed,
            manifest_entries: 0,
            warnings: 0,
            errors: 1,
            abort_reason: Some(reason),
        }
    }

    pub fn failed(&self) -> bool {
        self.state != JobState::Succeeded
    }
}

/// Outcome of a copy run over several roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub roots: Vec<RootReport>,
}

impl CopyReport {
    /// True if any root failed; drives the process exit code.
    pub fn failed(&self) -> bool {
        self.roots.iter().any(RootReport::failed)
    }

    pub fn warnings(&self) -> usize {
        self.roots.iter().map(|r| r.warnings).sum()
    }

    pub fn errors(&self) -> usize {
        self.roots.iter().map(|r| r.errors).sum()
    }

    pub fn summary(&self) -> String {
        let failed = self.roots.iter().filter(|r| r.failed()).count();
        format!(
            "{} root(s) processed, {} failed, {} error(s) and {} warning(s)",
            self.roots.len(),
            failed,
            self.errors(),
            self.warnings()
        )
    }
}
