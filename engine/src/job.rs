//! Job orchestration module.
//!
//! This module provides the copy engine's lifecycle functions:
//! - Creating a job for one source root
//! - Planning a job (scanning, path length check, classification)
//! - Running a job (directories, files, archives, manifests, ready marker)
//! - Running a whole batch of roots with [`run_copy`]
//!
//! Per-item failures are logged and counted; only a few conditions abort a
//! root (see [`run_job`]). One aborted root never stops the others.

use crate::classify::{classify, Classification};
use crate::config::{CopyConfig, ManifestConfig};
use crate::error::EngineError;
use crate::fs_ops::{self, member_name};
use crate::lock::CaseLock;
use crate::manifest::Manifest;
use crate::model::{CaseJob, CopyReport, JobState, RootReport};
use crate::progress::{self, format_bytes, ProgressCallback};
use crate::runlog::RunLog;
use crate::scan::{scan_tree, Tree};
use chrono::Local;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

/// Create a new job for the source root `source`.
///
/// # Errors
/// `NotADirectory` if the root is missing or not a directory, `InvalidPath`
/// if it has no final component to name the case after.
pub fn create_job<P: AsRef<Path>>(
    source: P,
    copy: &CopyConfig,
    manifest_config: &ManifestConfig,
) -> Result<CaseJob, EngineError> {
    let source = source.as_ref();

    match fs::metadata(source) {
        Ok(metadata) if metadata.is_dir() => {}
        _ => {
            return Err(EngineError::NotADirectory {
                path: source.to_path_buf(),
            })
        }
    }

    let case_name = case_name(source)?;

    Ok(CaseJob {
        id: Uuid::new_v4(),
        source_path: source.to_path_buf(),
        destination_path: copy.destination.join(&case_name),
        trigger_path: copy.trigger_root.join(&case_name),
        case_name,
        state: JobState::Pending,
        tree: None,
        plan: None,
        manifest: Manifest::new(),
        warnings: 0,
        errors: 0,
        start_time: None,
        end_time: None,
        copy: copy.clone(),
        manifest_config: manifest_config.clone(),
    })
}

/// Plan a job: scan the source tree, enforce the path length limit and
/// classify into directories to create, files to copy and directories to
/// archive.
///
/// # Errors
/// `PathTooLong` if any absolute source path exceeds `max_path_len`
/// characters, `ReservedName` if a top-level source entry is named like the
/// manifest or the ready marker. Nothing has been written at that point.
pub fn plan_job(job: &mut CaseJob) -> Result<(), EngineError> {
    if job.state != JobState::Pending {
        return Err(EngineError::InvalidState {
            reason: format!("job must be pending to plan, it is {}", job.state),
        });
    }

    let tree = scan_tree(&job.source_path)?;
    check_path_lengths(&tree, job.copy.max_path_len)?;
    check_reserved_names(&tree, &job.manifest_config)?;

    let plan = classify(&tree, job.copy.zip_depth, job.copy.zip_file_quantity);
    tracing::debug!(
        case = %job.case_name,
        archive = plan.archive.len(),
        create = plan.create.len(),
        copy = plan.copy.len(),
        total = tree.total_size(),
        algorithm = %job.manifest_config.algorithm,
        "job planned"
    );

    job.tree = Some(tree);
    job.plan = Some(plan);
    job.state = JobState::Planned;
    Ok(())
}

/// Run a planned job.
///
/// Transitions the job from Planned to Running to Succeeded or Failed.
/// The case log goes to `<trigger case dir>/<log_name>`; every message is
/// also echoed to `progress`.
///
/// # Errors
/// Returns an error only when the root cannot be processed at all: the
/// destination or trigger directory cannot be created, the case is locked,
/// or a ready or archived marker left by an earlier run cannot be removed. The job is Failed in that case. File, archive and manifest
/// failures are logged and counted instead, and make the job Failed
/// without an error return.
pub fn run_job(
    job: &mut CaseJob,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    if job.state != JobState::Planned {
        return Err(EngineError::InvalidState {
            reason: format!("job must be planned to run, it is {}", job.state),
        });
    }
    let (Some(tree), Some(plan)) = (job.tree.take(), job.plan.take()) else {
        return Err(EngineError::InvalidState {
            reason: "planned job has no plan".to_string(),
        });
    };

    let span = tracing::info_span!("copy", case = %job.case_name, job_id = %job.id);
    let _enter = span.enter();

    job.state = JobState::Running;
    job.start_time = Some(SystemTime::now());

    let result = execute(job, &tree, &plan, progress_callback);

    job.tree = Some(tree);
    job.plan = Some(plan);
    job.end_time = Some(SystemTime::now());
    job.state = if result.is_ok() && job.errors == 0 {
        JobState::Succeeded
    } else {
        JobState::Failed
    };
    result
}

fn execute(
    job: &mut CaseJob,
    tree: &Tree,
    plan: &Classification,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    fs_ops::ensure_dir(&job.destination_path)?;
    fs_ops::ensure_dir(&job.trigger_path)?;
    let _lock = CaseLock::acquire(&job.trigger_path)?;
    remove_marker(&job.destination_path.join(&job.manifest_config.ready_marker))?;
    remove_marker(&job.trigger_path.join(&job.manifest_config.archived_marker))?;

    let log_path = job.trigger_path.join(&job.copy.log_name);
    let mut log = match RunLog::new(progress_callback).with_file(&log_path) {
        Ok(log) => log,
        Err(e) => {
            let mut log = RunLog::new(progress_callback);
            log.warning(format!("Unable to write case log {}: {e}", log_path.display()));
            log
        }
    };
    log.info(format!(
        "Copying {} to {}",
        job.source_path.display(),
        job.destination_path.display()
    ));

    for skipped in &tree.skipped {
        log.warning(format!(
            "Skipped {}: {}",
            skipped.path.display(),
            skipped.reason
        ));
    }

    progress::emit(
        progress_callback,
        &format!("Generating {} directories", plan.create.len()),
    );
    for rel_dir in &plan.create {
        if let Err(e) = fs_ops::ensure_dir(&job.destination_path.join(rel_dir)) {
            log.warning(e.to_string());
        }
    }

    let algorithm = job.manifest_config.algorithm;
    for rel_file in &plan.copy {
        let size = tree.files.get(rel_file).map(|f| f.size).unwrap_or(0);
        progress::emit(
            progress_callback,
            &format!("Copying {} ({})", rel_file.display(), format_bytes(size)),
        );
        let src = job.source_path.join(rel_file);
        let dst = job.destination_path.join(rel_file);
        let copied = fs_ops::copy_file(&src, &dst, algorithm).and_then(|copied| {
            job.manifest
                .push(member_name(rel_file), copied.bytes, copied.checksum.hex())
        });
        if let Err(e) = copied {
            log.error(e.to_string());
        }
    }

    // Destination names already in use at the case level and below
    let mut taken: BTreeSet<PathBuf> = plan.copy.iter().chain(&plan.create).cloned().collect();
    taken.insert(PathBuf::from(&job.manifest_config.file_name));
    taken.insert(PathBuf::from(&job.manifest_config.ready_marker));

    for rel_dir in &plan.archive {
        let rel_zip = archive_name(rel_dir);
        let zip_path = job.destination_path.join(&rel_zip);
        if !taken.insert(rel_zip.clone()) {
            log.error(
                EngineError::ArchiveNameTaken {
                    dir: job.source_path.join(rel_dir),
                    path: zip_path,
                }
                .to_string(),
            );
            continue;
        }

        let size = tree.dirs.get(rel_dir).map(|d| d.size).unwrap_or(0);
        progress::emit(
            progress_callback,
            &format!("Zipping {} ({})", rel_dir.display(), format_bytes(size)),
        );
        match fs_ops::archive_directory(&job.source_path.join(rel_dir), &zip_path, algorithm) {
            Ok(archived) => {
                if let Err(e) = job.manifest.push(
                    member_name(&rel_zip),
                    archived.size,
                    archived.checksum.hex(),
                ) {
                    log.error(e.to_string());
                }
                if !archived.failed_files.is_empty() {
                    log.warning(format!(
                        "The following file(s) could not be zipped into {}:\n{}",
                        zip_path.display(),
                        join_paths(&archived.failed_files)
                    ));
                }
                if !archived.failed_dirs.is_empty() {
                    log.warning(format!(
                        "The following dir(s) could not be built in {}:\n{}",
                        zip_path.display(),
                        join_paths(&archived.failed_dirs)
                    ));
                }
            }
            Err(e) => log.error(e.to_string()),
        }
    }

    let manifest_name = &job.manifest_config.file_name;
    for dir in [&job.destination_path, &job.trigger_path] {
        if let Err(e) = job.manifest.write(&dir.join(manifest_name)) {
            log.error(e.to_string());
        }
    }

    if log.errors() == 0 {
        let marker = job.destination_path.join(&job.manifest_config.ready_marker);
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        if let Err(e) = fs::write(&marker, stamp) {
            log.error(format!("Unable to write ready marker {}: {e}", marker.display()));
        }
    }

    job.warnings = log.warnings();
    job.errors = log.errors();
    if job.errors + job.warnings > 0 {
        log.info(format!(
            "{} error(s) and {} warning(s) occurred while processing {}",
            job.errors,
            job.warnings,
            job.source_path.display()
        ));
    } else {
        log.info(format!(
            "Finished {} with {} manifest entries",
            job.case_name,
            job.manifest.len()
        ));
    }
    Ok(())
}

/// Process every root in order with the same configuration.
///
/// Never fails as a whole; the report tells which roots failed.
pub fn run_copy(
    copy: &CopyConfig,
    manifest_config: &ManifestConfig,
    roots: &[PathBuf],
    progress_callback: Option<&dyn ProgressCallback>,
) -> CopyReport {
    let mut report = CopyReport::default();

    for root in roots {
        let mut job = match create_job(root, copy, manifest_config) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(root = %root.display(), error = %e, "root rejected");
                progress::emit(
                    progress_callback,
                    &format!("Skipping {}: {e}", root.display()),
                );
                report.roots.push(RootReport::rejected(root.clone(), e.to_string()));
                continue;
            }
        };

        let outcome = plan_job(&mut job).and_then(|()| run_job(&mut job, progress_callback));
        let abort_reason = match outcome {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    root = %root.display(),
                    error = %e,
                    os_error = ?e.raw_os_error(),
                    "root aborted"
                );
                progress::emit(
                    progress_callback,
                    &format!("ERROR Aborting {}: {e}", root.display()),
                );
                job.state = JobState::Failed;
                job.errors += 1;
                Some(e.to_string())
            }
        };
        report.roots.push(RootReport::from_job(&job, abort_reason));
    }

    tracing::info!("{}", report.summary());
    report
}

fn case_name(source: &Path) -> Result<String, EngineError> {
    let absolute = absolute(source);
    absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| EngineError::InvalidPath {
            path: source.to_path_buf(),
            reason: "root has no name to use as case name".to_string(),
        })
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn check_path_lengths(tree: &Tree, limit: usize) -> Result<(), EngineError> {
    let root = absolute(&tree.root);
    let too_long = |path: PathBuf| {
        let len = path.to_string_lossy().chars().count();
        (len > limit).then_some(EngineError::PathTooLong { path, len, limit })
    };

    if let Some(err) = too_long(root.clone()) {
        return Err(err);
    }
    for rel_path in tree.paths().filter(|p| !p.as_os_str().is_empty()) {
        if let Some(err) = too_long(root.join(rel_path)) {
            return Err(err);
        }
    }
    Ok(())
}

/// `<dir>.zip` keeping every dot of the directory name.
fn archive_name(rel_dir: &Path) -> PathBuf {
    let mut name = rel_dir.as_os_str().to_owned();
    name.push(".zip");
    PathBuf::from(name)
}

fn check_reserved_names(tree: &Tree, manifest: &ManifestConfig) -> Result<(), EngineError> {
    let reserved = [&manifest.file_name, &manifest.ready_marker];
    for rel_path in tree.paths().filter(|p| p.components().count() == 1) {
        if let Some(name) = reserved.iter().find(|name| rel_path.as_os_str() == name.as_str()) {
            return Err(EngineError::ReservedName {
                path: tree.root.join(rel_path),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Remove a marker left by an earlier run; a missing marker is fine.
fn remove_marker(path: &Path) -> Result<(), EngineError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::WriteError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
