//! Configuration for the copy station and the surveillance daemon.
//!
//! Loaded from a TOML file. Every component receives the section it needs as
//! an explicit value; nothing reads configuration from global state.
//!
//! ```toml
//! [manifest]
//! file_name = "done.txt"
//! ready_marker = "ready"
//! archived_marker = "archived"
//! algorithm = "sha256"
//!
//! [copy]
//! destination = "/srv/import"
//! trigger_root = "/srv/trigger/lab"
//!
//! [surveillance]
//! trigger_root = "/srv/trigger"
//! trigger_subdirs = ["lab", "field"]
//! work_root = "/srv/work"
//! backup_root = "/srv/backup"
//! done_root = "/srv/done"
//! shard_len = 2
//! times = ["06:00", "18:30"]
//! ```

use crate::checksums::ChecksumAlgorithm;
use crate::error::ConfigError;
use crate::schedule::Schedule;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// Required by the copy engine
    pub copy: Option<CopyConfig>,

    /// Required by the surveillance daemon
    pub surveillance: Option<SurveillanceConfig>,

    #[serde(default)]
    pub log: LogConfig,
}

/// Settings both sides must agree on.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestConfig {
    /// Manifest file name in destination and trigger directories
    #[serde(default = "default_manifest_name")]
    pub file_name: String,

    /// Sentinel file marking a finished case directory
    #[serde(default = "default_ready_marker")]
    pub ready_marker: String,

    /// Left in a kept trigger case directory once the case was archived
    #[serde(default = "default_archived_marker")]
    pub archived_marker: String,

    #[serde(default)]
    pub algorithm: ChecksumAlgorithm,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CopyConfig {
    /// Root under which one directory per case is created
    pub destination: PathBuf,

    /// Department directory in the trigger area
    pub trigger_root: PathBuf,

    /// Per-case log written next to the trigger manifest
    #[serde(default = "default_log_name")]
    pub log_name: String,

    /// Maximum characters of any absolute source path
    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,

    /// Directory depth at which large subtrees are archived
    #[serde(default = "default_zip_depth")]
    pub zip_depth: usize,

    /// Minimal number of files below a directory to archive it
    #[serde(default = "default_zip_file_quantity")]
    pub zip_file_quantity: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurveillanceConfig {
    pub trigger_root: PathBuf,

    /// Department directories below `trigger_root`
    pub trigger_subdirs: Vec<String>,

    pub work_root: PathBuf,
    pub backup_root: PathBuf,

    /// Archive location for verified cases
    pub done_root: PathBuf,

    /// Backup holds `<case>.zip` instead of a directory
    #[serde(default)]
    pub backup_is_archive: bool,

    /// Remove the trigger directory after archiving it (irreversible)
    #[serde(default)]
    pub delete_trigger: bool,

    /// Leading characters of the case name used as intermediate directory
    #[serde(default)]
    pub shard_len: usize,

    /// Times of day (`HH:MM`) to run a check
    #[serde(default)]
    pub times: Vec<String>,

    /// Alternative to `times`: fixed polling interval
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a log file; stderr only when unset
    pub dir: Option<PathBuf>,

    #[serde(default = "default_log_stem")]
    pub stem: String,
}

// Default values
fn default_manifest_name() -> String {
    "done.txt".to_string()
}

fn default_ready_marker() -> String {
    "ready".to_string()
}

fn default_archived_marker() -> String {
    "archived".to_string()
}

fn default_log_name() -> String {
    "log.txt".to_string()
}

fn default_max_path_len() -> usize {
    230
}

fn default_zip_depth() -> usize {
    2
}

fn default_zip_file_quantity() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_stem() -> String {
    "slowcopy".to_string()
}

impl Default for ManifestConfig {
    fn default() -> Self {
        ManifestConfig {
            file_name: default_manifest_name(),
            ready_marker: default_ready_marker(),
            archived_marker: default_archived_marker(),
            algorithm: ChecksumAlgorithm::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            dir: None,
            stem: default_log_stem(),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        content.parse()
    }

    /// The copy section, or an error naming it
    pub fn copy(&self) -> Result<&CopyConfig, ConfigError> {
        self.copy
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("missing [copy] section".to_string()))
    }

    /// The surveillance section, or an error naming it
    pub fn surveillance(&self) -> Result<&SurveillanceConfig, ConfigError> {
        self.surveillance
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("missing [surveillance] section".to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, name) in [
            ("manifest.file_name", &self.manifest.file_name),
            ("manifest.ready_marker", &self.manifest.ready_marker),
            ("manifest.archived_marker", &self.manifest.archived_marker),
        ] {
            if !is_plain_file_name(name) {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be a plain file name, got '{name}'"
                )));
            }
        }
        if let Some(copy) = &self.copy {
            copy.validate()?;
        }
        if let Some(surveillance) = &self.surveillance {
            surveillance.schedule()?;
            if surveillance.trigger_subdirs.iter().all(|s| s.trim().is_empty()) {
                return Err(ConfigError::Invalid(
                    "surveillance.trigger_subdirs must name at least one directory".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl CopyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.zip_depth == 0 {
            return Err(ConfigError::Invalid(
                "copy.zip_depth must be at least 1".to_string(),
            ));
        }
        if self.zip_file_quantity == 0 {
            return Err(ConfigError::Invalid(
                "copy.zip_file_quantity must be at least 1".to_string(),
            ));
        }
        if !is_plain_file_name(&self.log_name) {
            return Err(ConfigError::Invalid(format!(
                "copy.log_name must be a plain file name, got '{}'",
                self.log_name
            )));
        }
        Ok(())
    }
}

impl SurveillanceConfig {
    /// Build the polling schedule from `times` or `interval_secs`.
    pub fn schedule(&self) -> Result<Schedule, ConfigError> {
        match (self.times.is_empty(), self.interval_secs) {
            (false, None) => Schedule::times_of_day(&self.times),
            (true, Some(0)) => Err(ConfigError::Invalid(
                "surveillance.interval_secs must be positive".to_string(),
            )),
            (true, Some(secs)) => Ok(Schedule::Interval(Duration::from_secs(secs))),
            (false, Some(_)) => Err(ConfigError::Invalid(
                "surveillance: set either times or interval_secs, not both".to_string(),
            )),
            (true, None) => Err(ConfigError::Invalid(
                "surveillance: one of times or interval_secs is required".to_string(),
            )),
        }
    }

    /// Department directories to poll
    pub fn trigger_dirs(&self) -> Vec<PathBuf> {
        self.trigger_subdirs
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| self.trigger_root.join(s))
            .collect()
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name).file_name().map(|f| f == name).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [manifest]
        algorithm = "blake3"

        [copy]
        destination = "/srv/import"
        trigger_root = "/srv/trigger/lab"
        zip_depth = 3

        [surveillance]
        trigger_root = "/srv/trigger"
        trigger_subdirs = ["lab", " field "]
        work_root = "/srv/work"
        backup_root = "/srv/backup"
        done_root = "/srv/done"
        times = ["06:00", "18:30"]

        [log]
        level = "debug"
    "#;

    #[test]
    fn test_parse_full_config_with_defaults() {
        let config: Config = FULL.parse().expect("Failed to parse config");

        assert_eq!(config.manifest.file_name, "done.txt");
        assert_eq!(config.manifest.ready_marker, "ready");
        assert_eq!(config.manifest.archived_marker, "archived");
        assert_eq!(config.manifest.algorithm, ChecksumAlgorithm::Blake3);

        let copy = config.copy().unwrap();
        assert_eq!(copy.zip_depth, 3);
        assert_eq!(copy.zip_file_quantity, 10);
        assert_eq!(copy.max_path_len, 230);
        assert_eq!(copy.log_name, "log.txt");

        let surveillance = config.surveillance().unwrap();
        assert!(!surveillance.backup_is_archive);
        assert!(!surveillance.delete_trigger);
        assert_eq!(
            surveillance.trigger_dirs(),
            vec![
                PathBuf::from("/srv/trigger/lab"),
                PathBuf::from("/srv/trigger/field")
            ]
        );
        assert!(matches!(
            surveillance.schedule().unwrap(),
            Schedule::TimesOfDay(ref t) if t.len() == 2
        ));
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_missing_section_is_reported() {
        let config: Config = "[manifest]\nfile_name = \"hashes.tsv\"\n".parse().unwrap();
        assert!(config.copy().is_err());
        assert!(config.surveillance().is_err());
    }

    #[test]
    fn test_rejects_zero_zip_depth() {
        let content = r#"
            [copy]
            destination = "/a"
            trigger_root = "/b"
            zip_depth = 0
        "#;
        let result: Result<Config, _> = content.parse();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_ambiguous_schedule() {
        let content = r#"
            [surveillance]
            trigger_root = "/t"
            trigger_subdirs = ["lab"]
            work_root = "/w"
            backup_root = "/b"
            done_root = "/d"
            times = ["06:00"]
            interval_secs = 60
        "#;
        assert!(content.parse::<Config>().is_err());
    }

    #[test]
    fn test_rejects_bad_time_of_day() {
        let content = r#"
            [surveillance]
            trigger_root = "/t"
            trigger_subdirs = ["lab"]
            work_root = "/w"
            backup_root = "/b"
            done_root = "/d"
            times = ["25:99"]
        "#;
        assert!(content.parse::<Config>().is_err());
    }

    #[test]
    fn test_rejects_manifest_name_with_separator() {
        let content = "[manifest]\nfile_name = \"../done.txt\"\n";
        assert!(content.parse::<Config>().is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = Config::from_file(&temp_dir.path().join("slowcopy.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
