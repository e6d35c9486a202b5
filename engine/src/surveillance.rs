//! Surveillance daemon.
//!
//! At every scheduled tick the daemon looks for case directories with a
//! manifest in each department of the trigger area. A case whose work copy
//! carries the ready marker is verified against the work area and the backup
//! area. A clean case is packed into a dated zip below the done area and,
//! if configured, its trigger directory is removed. A kept trigger directory
//! gets the archived marker and is passed over until the copy engine delivers
//! the case again. A case with discrepancies stays where it is and is checked
//! again at the next tick.
//!
//! The loop is single threaded. Time and sleeping come from a [`Clock`] and
//! a stop channel ends the loop between ticks.

use crate::config::{ManifestConfig, SurveillanceConfig};
use crate::error::{ConfigError, EngineError};
use crate::fs_ops;
use crate::lock::CaseLock;
use crate::manifest::{ExpectedFiles, Manifest};
use crate::progress::ProgressCallback;
use crate::runlog::RunLog;
use crate::schedule::{Clock, Schedule};
use crate::verify::{ArchiveVerifier, CheckReport, DirectoryVerifier, Verifier};
use chrono::NaiveDateTime;
use crossbeam_channel::Receiver;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Counts of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Case directories holding a manifest, not archived before
    pub found: usize,
    /// Kept case directories archived at an earlier tick
    pub archived: usize,
    /// Verified and archived
    pub verified: usize,
    /// Work copy not ready yet
    pub pending: usize,
    /// Unreadable manifest or locked case
    pub skipped: usize,
    /// Sum of discrepancies over all cases
    pub problems: usize,
    /// Cases whose check failed with an error
    pub errors: usize,
    /// Summary line
    pub message: String,
}

enum CaseOutcome {
    Verified,
    Pending,
    Skipped,
    Problems(usize),
}

pub struct Surveillance {
    config: SurveillanceConfig,
    manifest: ManifestConfig,
    schedule: Schedule,
}

impl Surveillance {
    pub fn new(config: SurveillanceConfig, manifest: ManifestConfig) -> Result<Self, ConfigError> {
        let schedule = config.schedule()?;
        Ok(Surveillance {
            config,
            manifest,
            schedule,
        })
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Case directory in the work area.
    pub fn work_path(&self, case: &str) -> PathBuf {
        sharded(&self.config.work_root, case, self.config.shard_len)
    }

    /// Case directory (or archive path without `.zip`) in the backup area.
    pub fn backup_path(&self, case: &str) -> PathBuf {
        sharded(&self.config.backup_root, case, self.config.shard_len)
    }

    /// Run ticks on schedule until `stop` fires. Returns the number of ticks.
    pub fn run(
        &self,
        clock: &dyn Clock,
        stop: &Receiver<()>,
        progress: Option<&dyn ProgressCallback>,
    ) -> usize {
        tracing::info!(
            "Surveilling {}",
            self.config
                .trigger_dirs()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut ticks = 0;
        loop {
            let now = clock.now();
            let next = self.schedule.next_due(now);
            tracing::debug!(%next, "waiting for next check");
            if clock.sleep(self.schedule.delay_until_next(now), stop) {
                tracing::info!(ticks, "surveillance stopped");
                return ticks;
            }
            self.tick(clock.now(), progress);
            ticks += 1;
        }
    }

    /// Check every case in the trigger area once.
    pub fn tick(&self, now: NaiveDateTime, progress: Option<&dyn ProgressCallback>) -> TickReport {
        let mut log = RunLog::new(progress);
        let mut report = TickReport::default();

        for department_dir in self.config.trigger_dirs() {
            if !department_dir.is_dir() {
                log.warning(format!("Did not find {}", department_dir.display()));
                continue;
            }
            tracing::debug!(dir = %department_dir.display(), "reading trigger directory");
            let case_dirs = match subdirectories(&department_dir) {
                Ok(dirs) => dirs,
                Err(e) => {
                    log.warning(format!("Unable to read {}: {e}", department_dir.display()));
                    continue;
                }
            };
            let department = file_name(&department_dir);

            for case_dir in case_dirs {
                if !case_dir.join(&self.manifest.file_name).is_file() {
                    continue;
                }
                let case = file_name(&case_dir);
                if case_dir.join(&self.manifest.archived_marker).is_file() {
                    tracing::debug!(case = %case, "already archived");
                    report.archived += 1;
                    continue;
                }
                report.found += 1;
                let span = tracing::info_span!("verify", case = %case);
                let _enter = span.enter();

                match self.check_case(&department, &case, &case_dir, now, &mut log) {
                    Ok(CaseOutcome::Verified) => report.verified += 1,
                    Ok(CaseOutcome::Pending) => report.pending += 1,
                    Ok(CaseOutcome::Skipped) => report.skipped += 1,
                    Ok(CaseOutcome::Problems(count)) => report.problems += count,
                    Err(e) => {
                        log.error(format!("Unable to check {}: {e}", case_dir.display()));
                        report.errors += 1;
                    }
                }
            }
        }

        report.message = self.summary(&report);
        if report.problems + report.errors > 0 {
            log.warning(&report.message);
        } else {
            log.info(&report.message);
        }
        report
    }

    fn check_case(
        &self,
        department: &str,
        case: &str,
        case_dir: &Path,
        now: NaiveDateTime,
        log: &mut RunLog<'_>,
    ) -> Result<CaseOutcome, EngineError> {
        let manifest_path = case_dir.join(&self.manifest.file_name);
        let manifest = match Manifest::read(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                log.warning(format!("Unable to read trigger of {case}: {e}"));
                return Ok(CaseOutcome::Skipped);
            }
        };

        let work_path = self.work_path(case);
        if !work_path.join(&self.manifest.ready_marker).is_file() {
            tracing::debug!(work = %work_path.display(), "case is not ready");
            return Ok(CaseOutcome::Pending);
        }

        let _lock = match CaseLock::acquire(case_dir) {
            Ok(lock) => lock,
            Err(EngineError::CaseLocked { path }) => {
                log.warning(format!("Skipping {case}, it is locked by {}", path.display()));
                return Ok(CaseOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        let expected = manifest.expected();
        let algorithm = self.manifest.algorithm;
        let mut problems = self.verify(&mut DirectoryVerifier::new(&work_path, algorithm), &expected, log);
        problems += if self.config.backup_is_archive {
            let mut zip_path = self.backup_path(case).into_os_string();
            zip_path.push(".zip");
            let mut verifier = ArchiveVerifier::open(PathBuf::from(zip_path), algorithm)?;
            self.verify(&mut verifier, &expected, log)
        } else {
            self.verify(
                &mut DirectoryVerifier::new(self.backup_path(case), algorithm),
                &expected,
                log,
            )
        };

        if problems > 0 {
            log.warning(format!(
                "{problems} problem(s) with {case}, leaving it for the next check"
            ));
            return Ok(CaseOutcome::Problems(problems));
        }

        let done_dir = self.config.done_root.join(department);
        fs_ops::ensure_dir(&done_dir)?;
        let zip_path = done_dir.join(format!("{case}_{}.zip", now.format("%Y%m%d-%H%M%S")));
        let archived = fs_ops::archive_directory(case_dir, &zip_path, algorithm)?;
        log.info(format!("Archived {} to {}", case_dir.display(), zip_path.display()));

        if !archived.failed_files.is_empty() || !archived.failed_dirs.is_empty() {
            log.warning(format!(
                "Archive {} is incomplete, keeping {}",
                zip_path.display(),
                case_dir.display()
            ));
        } else if self.config.delete_trigger {
            fs::remove_dir_all(case_dir).map_err(|e| EngineError::WriteError {
                path: case_dir.to_path_buf(),
                source: e,
            })?;
            log.info(format!("Removed {}", case_dir.display()));
        } else {
            let marker = case_dir.join(&self.manifest.archived_marker);
            fs::write(&marker, format!("{}\t{}", now, zip_path.display())).map_err(|e| {
                EngineError::WriteError {
                    path: marker.clone(),
                    source: e,
                }
            })?;
        }
        Ok(CaseOutcome::Verified)
    }

    fn verify(
        &self,
        verifier: &mut dyn Verifier,
        expected: &ExpectedFiles,
        log: &mut RunLog<'_>,
    ) -> usize {
        let report: CheckReport = verifier.check(expected);
        for mismatch in &report.mismatches {
            log.warning(format!("{mismatch} in {}", verifier.location().display()));
        }
        tracing::debug!(
            location = %verifier.location().display(),
            checked = report.checked,
            mismatches = report.mismatch_count(),
            "checked"
        );
        report.mismatch_count()
    }

    fn summary(&self, report: &TickReport) -> String {
        let problems = report.problems + report.errors;
        if report.found == 0 {
            "Check finished. Did not find new directories.".to_string()
        } else if problems == 0 && report.verified == report.found {
            format!(
                "Check finished. All {} case(s) were copied to {} and {}.",
                report.verified,
                self.config.work_root.display(),
                self.config.backup_root.display()
            )
        } else {
            format!(
                "Check finished. {} case(s) verified, {} problem(s) occurred.",
                report.verified, problems
            )
        }
    }
}

/// `<root>/<first shard_len chars of case>/<case>`, or `<root>/<case>`.
fn sharded(root: &Path, case: &str, shard_len: usize) -> PathBuf {
    if shard_len == 0 {
        return root.join(case);
    }
    let shard: String = case.chars().take(shard_len).collect();
    root.join(shard).join(case)
}

/// Immediate child directories, sorted.
fn subdirectories(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
