//! SlowCopy - Command-line interface for the copy station and the daemon.
//!
//! `slowcopy copy <ROOT>...` copies source roots (one case each) into the
//! configured destination and writes the manifests. `slowcopy watch` runs
//! the surveillance loop; `--once` checks the trigger area a single time.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slowcopy_engine::{
    spawn_copy, Clock, Config, LogConfig, Surveillance, SystemClock, TickReport,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// SlowCopy - verified case transfer
#[derive(Parser, Debug)]
#[command(name = "slowcopy")]
#[command(version)]
#[command(about = "Copy cases with hashes and verify them downstream")]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = "slowcopy.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides the config
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy source roots to the destination
    Copy {
        /// Source directories, one case each
        #[arg(required = true, value_name = "ROOT")]
        roots: Vec<PathBuf>,

        /// Print every file and archive as it is processed
        #[arg(long)]
        verbose: bool,
    },
    /// Verify transferred cases on schedule
    Watch {
        /// Run a single check now and exit
        #[arg(long)]
        once: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match run_cli(&cli) {
        Ok(false) => 0,
        Ok(true) => 1,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Returns whether the run failed; errors are setup problems.
fn run_cli(cli: &Cli) -> Result<bool> {
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Unable to load {}", cli.config.display()))?;
    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    let _log_guard = init_logging(level, &config.log)?;

    match &cli.command {
        Command::Copy { roots, verbose } => copy_command(&config, roots, *verbose),
        Command::Watch { once } => watch_command(&config, *once),
    }
}

/// Console logging to stderr plus an optional log file.
fn init_logging(level: &str, log: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut guard = None;
    let file_layer = match &log.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Unable to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, format!("{}.log", log.stem));
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(guard)
}

fn copy_command(config: &Config, roots: &[PathBuf], verbose: bool) -> Result<bool> {
    let copy = config.copy()?.clone();
    let start_time = Instant::now();
    eprintln!("Copying {} root(s) to {}", roots.len(), copy.destination.display());

    let worker = spawn_copy(copy, config.manifest.clone(), roots.to_vec());
    for message in worker.progress.iter() {
        if verbose || !is_item_message(&message) {
            eprintln!("{}", message);
        }
    }
    let report = worker.wait()?;

    eprintln!();
    for root in &report.roots {
        match &root.abort_reason {
            Some(reason) => eprintln!("  {}: {} ({})", root.source_path.display(), root.state, reason),
            None => eprintln!(
                "  {}: {}, {} manifest entries",
                root.source_path.display(),
                root.state,
                root.manifest_entries
            ),
        }
    }
    eprintln!("Summary: {}", report.summary());
    eprintln!("Elapsed: {}", format_duration(start_time.elapsed()));

    Ok(report.failed())
}

fn watch_command(config: &Config, once: bool) -> Result<bool> {
    let surveillance = Surveillance::new(config.surveillance()?.clone(), config.manifest.clone())?;
    let progress = |message: &str| println!("{}", message);

    if once {
        let report = surveillance.tick(SystemClock.now(), Some(&progress));
        return Ok(tick_failed(&report));
    }

    // Held for the life of the process; the loop ends when it is killed
    let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    let ticks = surveillance.run(&SystemClock, &stop_rx, Some(&progress));
    tracing::info!(ticks, "surveillance loop ended");
    Ok(false)
}

fn tick_failed(report: &TickReport) -> bool {
    report.problems + report.errors > 0
}

/// Per-file lines, shown with `--verbose` only
fn is_item_message(message: &str) -> bool {
    (message.starts_with("Copying ") && !message.contains(" to ")) || message.starts_with("Zipping ")
}

fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir) -> Config {
        let root = dir.path();
        let content = format!(
            r#"
[copy]
destination = "{dst}"
trigger_root = "{trigger}/lab"

[surveillance]
trigger_root = "{trigger}"
trigger_subdirs = ["lab"]
work_root = "{dst}"
backup_root = "{dst}"
done_root = "{done}"
interval_secs = 60
"#,
            dst = root.join("import").display(),
            trigger = root.join("trigger").display(),
            done = root.join("done").display(),
        );
        let path = root.join("slowcopy.toml");
        std::fs::write(&path, content).expect("Failed to write config");
        Config::from_file(&path).expect("Failed to load config")
    }

    #[test]
    fn test_copy_command_with_valid_root() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = write_config(&dir);
        let case = dir.path().join("stick/case1");
        std::fs::create_dir_all(&case).expect("Failed to create case");
        std::fs::write(case.join("test.txt"), "hello").expect("Failed to write file");

        let failed = copy_command(&config, &[case], false).expect("Copy should run");

        assert!(!failed, "Copy should succeed with a valid root");
        assert!(dir.path().join("import/case1/test.txt").is_file());
    }

    #[test]
    fn test_copy_command_reports_missing_root() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = write_config(&dir);

        let failed = copy_command(&config, &[PathBuf::from("/nonexistent/path")], false)
            .expect("Copy should run");

        assert!(failed, "A missing root should fail the run");
    }

    #[test]
    fn test_watch_once_then_clean_case() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = write_config(&dir);
        let case = dir.path().join("stick/case1");
        std::fs::create_dir_all(&case).expect("Failed to create case");
        std::fs::write(case.join("test.txt"), "hello").expect("Failed to write file");
        copy_command(&config, &[case], false).expect("Copy should run");

        let failed = watch_command(&config, true).expect("Watch should run");

        assert!(!failed);
        assert!(dir.path().join("done/lab").is_dir());
        assert!(dir.path().join("trigger/lab/case1").is_dir(), "Trigger is kept by default");
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("slowcopy.toml");
        std::fs::write(&path, "[manifest]\nfile_name = \"done.txt\"\n").expect("Failed to write config");
        let config = Config::from_file(&path).expect("Failed to load config");

        assert!(copy_command(&config, &[dir.path().to_path_buf()], false).is_err());
        assert!(watch_command(&config, true).is_err());
    }

    #[test]
    fn test_item_messages_are_filtered() {
        assert!(is_item_message("Copying doc.txt (12 B)"));
        assert!(is_item_message("Zipping bulk (1.50 KB)"));
        assert!(!is_item_message("Copying /media/stick/case1 to /srv/import/case1"));
        assert!(!is_item_message("ERROR Unable to copy x"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
