// crates/core/src/config.rs
//! Runtime configuration, validated once at process startup.
//!
//! Every knob comes from a `STEVEDORE_*` environment variable with a
//! sensible default. An unparseable value is a startup error, never a
//! silent fallback to the default.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default bound on how long a single archiver invocation may run.
pub const DEFAULT_ARCHIVER_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Default period between reaper sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default retention for temp artifacts on disk.
pub const DEFAULT_MAX_FILE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Default retention for job records in the registry.
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
/// Default cap on import archive size (2 GiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory for export artifacts and staged import archives.
    pub temp_dir: PathBuf,
    /// Period between reaper sweeps.
    pub cleanup_interval: Duration,
    /// Temp files older than this are removed by the reaper.
    pub max_file_age: Duration,
    /// Maximum accepted import archive size in bytes.
    pub max_file_size: u64,
    /// Whether the reaper runs at all.
    pub auto_cleanup: bool,
    /// The import path is disabled by default; it overwrites live data.
    pub enable_import: bool,
    /// Terminal job records older than this are swept from the registry.
    pub job_retention: Duration,
    /// Wall-clock bound on one archiver invocation.
    pub archiver_timeout: Duration,
    /// Command line prefix for the external archiver CLI.
    pub archiver_command: String,
    /// Optional key passed to the archiver for artifact encryption.
    pub encryption_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("stevedore"),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            max_file_age: DEFAULT_MAX_FILE_AGE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            auto_cleanup: true,
            enable_import: false,
            job_retention: DEFAULT_JOB_RETENTION,
            archiver_timeout: DEFAULT_ARCHIVER_TIMEOUT,
            archiver_command: "npx strapi".to_string(),
            encryption_key: None,
        }
    }
}

impl Config {
    /// Load configuration from `STEVEDORE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup (env vars in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = lookup("STEVEDORE_TEMP_DIR") {
            if dir.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "STEVEDORE_TEMP_DIR",
                    dir,
                    "must be a non-empty path",
                ));
            }
            config.temp_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("STEVEDORE_CLEANUP_INTERVAL_SECS") {
            config.cleanup_interval = parse_duration_secs("STEVEDORE_CLEANUP_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("STEVEDORE_MAX_FILE_AGE_SECS") {
            config.max_file_age = parse_duration_secs("STEVEDORE_MAX_FILE_AGE_SECS", &secs)?;
        }
        if let Some(bytes) = lookup("STEVEDORE_MAX_FILE_SIZE") {
            config.max_file_size = parse_nonzero_u64("STEVEDORE_MAX_FILE_SIZE", &bytes)?;
        }
        if let Some(flag) = lookup("STEVEDORE_AUTO_CLEANUP") {
            config.auto_cleanup = parse_bool("STEVEDORE_AUTO_CLEANUP", &flag)?;
        }
        if let Some(flag) = lookup("STEVEDORE_ENABLE_IMPORT") {
            config.enable_import = parse_bool("STEVEDORE_ENABLE_IMPORT", &flag)?;
        }
        if let Some(secs) = lookup("STEVEDORE_JOB_RETENTION_SECS") {
            config.job_retention = parse_duration_secs("STEVEDORE_JOB_RETENTION_SECS", &secs)?;
        }
        if let Some(secs) = lookup("STEVEDORE_ARCHIVER_TIMEOUT_SECS") {
            config.archiver_timeout = parse_duration_secs("STEVEDORE_ARCHIVER_TIMEOUT_SECS", &secs)?;
        }
        if let Some(command) = lookup("STEVEDORE_ARCHIVER_COMMAND") {
            config.archiver_command = command;
        }
        if let Some(key) = lookup("STEVEDORE_ENCRYPTION_KEY") {
            if !key.is_empty() {
                config.encryption_key = Some(key);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.archiver_command.trim().is_empty() {
            return Err(ConfigError::EmptyArchiverCommand);
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::ZeroNotAllowed {
                key: "STEVEDORE_MAX_FILE_SIZE",
            });
        }
        Ok(())
    }
}

fn parse_duration_secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value
        .parse()
        .map_err(|_| ConfigError::invalid(key, value, "not a whole number of seconds"))?;
    if secs == 0 {
        return Err(ConfigError::ZeroNotAllowed { key });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_nonzero_u64(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    let parsed: u64 = value
        .parse()
        .map_err(|_| ConfigError::invalid(key, value, "not an integer"))?;
    if parsed == 0 {
        return Err(ConfigError::ZeroNotAllowed { key });
    }
    Ok(parsed)
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ConfigError::invalid(key, other, "expected true/false")),
    }
}
