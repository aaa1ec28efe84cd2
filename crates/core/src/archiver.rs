// crates/core/src/archiver.rs
//! The external archiver collaborator.
//!
//! Export and import are delegated to the application's own CLI (`export` /
//! `import` subcommands), invoked as a child process. The call is a black
//! box: it may run for tens of minutes and **cannot be cancelled once
//! started** — the only control we have is the wall-clock timeout, after
//! which the job is failed even though the child may still be finishing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::artifact::with_archive_ext;
use crate::config::Config;
use crate::error::ArchiverError;

/// Categories of application data the archiver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSet {
    Content,
    Files,
    Config,
}

impl DataSet {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSet::Content => "content",
            DataSet::Files => "files",
            DataSet::Config => "config",
        }
    }
}

/// Options for an export run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Include uploaded media files in the archive.
    #[serde(default)]
    pub include_files: bool,
}

/// Options for an import run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    #[serde(default)]
    pub skip_assets: bool,
    #[serde(default)]
    pub include_files: bool,
    /// Data categories to leave out of the import.
    #[serde(default)]
    pub exclude: Vec<DataSet>,
    /// If non-empty, import only these categories.
    #[serde(default)]
    pub only: Vec<DataSet>,
}

/// Captured output of a successful archiver run.
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    /// The produced artifact (export) or the consumed archive (import).
    pub artifact: PathBuf,
    pub stdout: String,
    pub stderr: String,
}

/// The archiver collaborator seam.
///
/// Implemented by [`CliArchiver`] in production and by stubs in tests.
#[async_trait]
pub trait Archiver: Send + Sync + 'static {
    /// Export the application's data to an archive at `base_path` (the
    /// archiver appends the extension itself).
    async fn export(
        &self,
        base_path: &Path,
        options: &ExportOptions,
    ) -> Result<ArchiveOutcome, ArchiverError>;

    /// Import the archive at `archive_path` into the application.
    async fn import(
        &self,
        archive_path: &Path,
        options: &ImportOptions,
    ) -> Result<ArchiveOutcome, ArchiverError>;
}

/// Production archiver that shells out to the application CLI.
pub struct CliArchiver {
    command: Vec<String>,
    timeout: Duration,
    encryption_key: Option<String>,
}

impl CliArchiver {
    pub fn new(
        command_line: &str,
        timeout: Duration,
        encryption_key: Option<String>,
    ) -> Self {
        Self {
            command: command_line.split_whitespace().map(String::from).collect(),
            timeout,
            encryption_key,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.archiver_command,
            config.archiver_timeout,
            config.encryption_key.clone(),
        )
    }

    fn export_args(&self, base_path: &Path, options: &ExportOptions) -> Vec<String> {
        let mut args = vec![
            "export".to_string(),
            "--file".to_string(),
            base_path.to_string_lossy().into_owned(),
        ];
        match &self.encryption_key {
            Some(key) => {
                args.push("--key".to_string());
                args.push(key.clone());
            }
            None => args.push("--no-encrypt".to_string()),
        }
        if !options.include_files {
            args.push("--exclude".to_string());
            args.push("files".to_string());
        }
        args
    }

    fn import_args(&self, archive_path: &Path, options: &ImportOptions) -> Vec<String> {
        let mut args = vec![
            "import".to_string(),
            "--force".to_string(),
            "--file".to_string(),
            archive_path.to_string_lossy().into_owned(),
        ];
        if let Some(key) = &self.encryption_key {
            args.push("--key".to_string());
            args.push(key.clone());
        }
        if !options.exclude.is_empty() {
            args.push("--exclude".to_string());
            args.push(join_sets(&options.exclude));
        }
        if !options.only.is_empty() {
            args.push("--only".to_string());
            args.push(join_sets(&options.only));
        }
        // Media files come along only when asked for explicitly and no
        // narrower selection was given.
        if !options.include_files && options.exclude.is_empty() && options.only.is_empty() {
            args.push("--exclude".to_string());
            args.push("files".to_string());
        }
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<(String, String), ArchiverError> {
        // An empty command is rejected by Config::validate; spawning ""
        // here would surface as a Spawn error rather than a panic.
        let program = self.command.first().map(String::as_str).unwrap_or("");
        let display = format!("{} {}", self.command.join(" "), args.join(" "));
        tracing::info!(command = %program, "Invoking archiver");
        tracing::debug!(args = ?args, "Archiver arguments");

        let mut cmd = Command::new(program);
        cmd.args(self.command.get(1..).unwrap_or_default())
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ArchiverError::Timeout {
                timeout: self.timeout,
            })?
            .map_err(|source| ArchiverError::Spawn {
                command: display,
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::error!(status = %output.status, stderr = %stderr, "Archiver failed");
            return Err(ArchiverError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok((stdout, stderr))
    }
}

fn join_sets(sets: &[DataSet]) -> String {
    sets.iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl Archiver for CliArchiver {
    async fn export(
        &self,
        base_path: &Path,
        options: &ExportOptions,
    ) -> Result<ArchiveOutcome, ArchiverError> {
        let args = self.export_args(base_path, options);
        let (stdout, stderr) = self.run(args).await?;

        // A zero exit status alone is not proof of success; the artifact
        // must actually be on disk.
        let artifact = with_archive_ext(base_path, self.encryption_key.is_some());
        if tokio::fs::metadata(&artifact).await.is_err() {
            return Err(ArchiverError::MissingArtifact { path: artifact });
        }

        Ok(ArchiveOutcome {
            artifact,
            stdout,
            stderr,
        })
    }

    async fn import(
        &self,
        archive_path: &Path,
        options: &ImportOptions,
    ) -> Result<ArchiveOutcome, ArchiverError> {
        let args = self.import_args(archive_path, options);
        let (stdout, stderr) = self.run(args).await?;
        Ok(ArchiveOutcome {
            artifact: archive_path.to_path_buf(),
            stdout,
            stderr,
        })
    }
}
