//! # SlowCopy Engine - Verified Case Transfer Library
//!
//! A headless engine that copies evidence-style "cases" from source media to
//! a destination with content hashes, and a daemon that later verifies the
//! transferred copies before archiving the case's trigger directory.
//!
//! ## Overview
//!
//! The copy side:
//! - Scans a source root once (sizes, depths, descendant counts)
//! - Copies small subtrees file by file, hashing while streaming and
//!   re-reading every destination file
//! - Packs directories with many files into deterministic zip archives
//! - Writes a TSV manifest to the destination and to the trigger area
//!
//! The surveillance side polls the trigger area on a schedule, verifies
//! work and backup copies against each manifest and archives clean cases.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use slowcopy_engine::{create_job, plan_job, run_job, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("slowcopy.toml".as_ref())?;
//! let mut job = create_job("/media/stick/case1", config.copy()?, &config.manifest)?;
//!
//! // Scan and classify the source tree
//! plan_job(&mut job)?;
//!
//! // Copy, archive and write the manifests
//! run_job(&mut job, None)?;
//! println!("{}: {} manifest entries", job.state, job.manifest.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **config**: TOML configuration
//! - **scan**, **classify**: tree scanner and copy/archive classifier
//! - **fs_ops**, **checksums**: hashing copy and archive primitives
//! - **job**, **model**: copy engine lifecycle and reports
//! - **manifest**, **verify**: manifest format and verifiers
//! - **surveillance**, **schedule**: polling daemon
//! - **lock**, **runlog**, **progress**, **worker**: shared plumbing

pub mod checksums;
pub mod classify;
pub mod config;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod lock;
pub mod manifest;
pub mod model;
pub mod progress;
pub mod runlog;
pub mod scan;
pub mod schedule;
pub mod surveillance;
pub mod verify;
pub mod worker;

// Re-export main types and functions
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use config::{Config, CopyConfig, LogConfig, ManifestConfig, SurveillanceConfig};
pub use error::{ConfigError, EngineError};
pub use job::{create_job, plan_job, run_copy, run_job};
pub use manifest::Manifest;
pub use model::{CaseJob, CopyReport, JobState, RootReport};
pub use progress::{format_bytes, ProgressCallback};
pub use schedule::{Clock, Schedule, SystemClock};
pub use surveillance::{Surveillance, TickReport};
pub use verify::{ArchiveVerifier, DirectoryVerifier, Mismatch, MismatchKind, Verifier};
pub use worker::{spawn_copy, CopyWorker};
