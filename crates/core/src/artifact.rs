// crates/core/src/artifact.rs
//! Naming helpers for archive artifacts in the working directory.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Extension the archiver gives unencrypted archives.
pub const TARBALL_EXT: &str = ".tar.gz";
/// Extension the archiver gives encrypted archives.
pub const ENCRYPTED_TARBALL_EXT: &str = ".tar.gz.enc";

/// Append the archive extension the archiver will use for `encrypted`.
///
/// The archiver appends the extension itself when writing; callers use this
/// to predict the final on-disk name from the base path they passed in.
pub fn with_archive_ext(base: &Path, encrypted: bool) -> PathBuf {
    let ext = if encrypted {
        ENCRYPTED_TARBALL_EXT
    } else {
        TARBALL_EXT
    };
    let mut name = base.as_os_str().to_os_string();
    name.push(ext);
    PathBuf::from(name)
}

/// Allocate a fresh, collision-free base path under the working directory.
pub fn temp_artifact_path(temp_dir: &Path, prefix: &str) -> PathBuf {
    temp_dir.join(format!("{prefix}{}", Uuid::new_v4()))
}

/// A download filename like `myapp-2024-06-01T12:00:00Z.tar.gz`.
pub fn download_file_name(project: &str, created_at: chrono::DateTime<chrono::Utc>, encrypted: bool) -> String {
    let base = format!("{project}-{}", created_at.format("%Y-%m-%dT%H:%M:%SZ"));
    with_archive_ext(Path::new(&base), encrypted)
        .to_string_lossy()
        .into_owned()
}
