// crates/core/src/error.rs
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from invoking the external archiver CLI.
#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("Failed to spawn archiver command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archiver timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Archiver exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Archiver reported success but produced no artifact at {path}")]
    MissingArtifact { path: PathBuf },
}

/// Errors from validating the configuration at process startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{key} must be greater than zero")]
    ZeroNotAllowed { key: &'static str },

    #[error("Archiver command must not be empty")]
    EmptyArchiverCommand,
}

impl ConfigError {
    pub fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}
