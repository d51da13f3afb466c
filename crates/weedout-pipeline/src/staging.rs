//! Working directories and upload staging.
//!
//! The pipeline touches four well-known locations: intake (transient
//! uploads), processed (durable `processed_<name>` artifacts), preview (the
//! two fixed-name files a UI polls) and the session parent directory.
//!
//! Any of them may be removed by an external actor between requests, so
//! every operation calls [`StorageLayout::ensure_directories`] first instead
//! of relying on a one-off start-up step.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Fixed name of the raw-upload preview.
pub const RAW_PREVIEW_FILE: &str = "file.csv";

/// Fixed name of the processed-result preview.
pub const PROCESSED_PREVIEW_FILE: &str = "file_processed.csv";

/// Prefix of every durable artifact name.
pub const PROCESSED_PREFIX: &str = "processed_";

/// An upload as received: bytes plus the client-supplied name.
#[derive(Debug, Clone)]
pub struct UploadedDataset {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDataset {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// An upload written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    /// Sanitized file name; the artifact is named `processed_<original_name>`.
    pub original_name: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Resolved locations of the pipeline's working directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub intake_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub preview_dir: PathBuf,
    pub session_dir: PathBuf,
}

impl From<&PipelineConfig> for StorageLayout {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            intake_dir: config.intake_dir.clone(),
            processed_dir: config.processed_dir.clone(),
            preview_dir: config.preview_dir.clone(),
            session_dir: config.session_dir.clone(),
        }
    }
}

impl StorageLayout {
    /// Create any missing working directory. Safe to call repeatedly.
    pub fn ensure_directories(&self) -> Result<()> {
        ensure_directories([
            self.intake_dir.as_path(),
            self.processed_dir.as_path(),
            self.preview_dir.as_path(),
            self.session_dir.as_path(),
        ])
    }

    pub fn raw_preview_path(&self) -> PathBuf {
        self.preview_dir.join(RAW_PREVIEW_FILE)
    }

    pub fn processed_preview_path(&self) -> PathBuf {
        self.preview_dir.join(PROCESSED_PREVIEW_FILE)
    }

    /// Durable path for the result of `original_name`.
    pub fn artifact_path(&self, original_name: &str) -> PathBuf {
        self.processed_dir.join(artifact_name(original_name))
    }

    /// Write an upload into intake storage.
    pub fn stage_upload(&self, dataset: &UploadedDataset) -> Result<StagedUpload> {
        self.ensure_directories()?;
        stage_into(&self.intake_dir, dataset)
    }

    /// Directory listing payload for diagnostics.
    pub fn snapshot(&self) -> StorageSnapshot {
        StorageSnapshot {
            intake: DirectorySnapshot::of(&self.intake_dir),
            processed: DirectorySnapshot::of(&self.processed_dir),
            preview: DirectorySnapshot::of(&self.preview_dir),
            sessions: DirectorySnapshot::of(&self.session_dir),
            raw_preview_exists: self.raw_preview_path().is_file(),
            processed_preview_exists: self.processed_preview_path().is_file(),
        }
    }
}

/// Create every directory in `paths` that does not exist yet.
pub fn ensure_directories<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Result<()> {
    for path in paths {
        fs::create_dir_all(path).map_err(|e| {
            PipelineError::storage(format!("Failed to create directory {}", path.display()), e)
        })?;
    }
    Ok(())
}

/// Write `dataset` into `dir` under its sanitized name.
pub fn stage_into(dir: &Path, dataset: &UploadedDataset) -> Result<StagedUpload> {
    let name = sanitize_filename(&dataset.file_name)?;
    ensure_directories([dir])?;

    let path = dir.join(&name);
    fs::write(&path, &dataset.bytes).map_err(|e| {
        PipelineError::storage(format!("Failed to stage upload {}", path.display()), e)
    })?;

    Ok(StagedUpload {
        original_name: name,
        path,
        bytes: dataset.bytes.len() as u64,
    })
}

/// Reduce a client-supplied name to a bare file name.
///
/// Both `/` and `\` count as separators regardless of platform.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return Err(PipelineError::validation("No selected file"));
    }

    Ok(base.to_string())
}

/// Canonical artifact name for an upload.
pub fn artifact_name(original_name: &str) -> String {
    format!("{}{}", PROCESSED_PREFIX, original_name)
}

/// Sorted names of the regular files directly inside `dir`.
pub fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// State of one working directory.
#[derive(Debug, Clone, Serialize)]
pub struct DirectorySnapshot {
    pub path: PathBuf,
    pub exists: bool,
    pub files: Vec<String>,
}

impl DirectorySnapshot {
    fn of(path: &Path) -> Self {
        let exists = path.is_dir();
        let files = if exists {
            list_files(path).unwrap_or_default()
        } else {
            Vec::new()
        };
        Self {
            path: path.to_path_buf(),
            exists,
            files,
        }
    }
}

/// State of every working directory and the fixed preview files.
#[derive(Debug, Clone, Serialize)]
pub struct StorageSnapshot {
    pub intake: DirectorySnapshot,
    pub processed: DirectorySnapshot,
    pub preview: DirectorySnapshot,
    pub sessions: DirectorySnapshot,
    pub raw_preview_exists: bool,
    pub processed_preview_exists: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn layout_in(dir: &TempDir) -> StorageLayout {
        let config = PipelineConfig::builder().root_dir(dir.path()).build().unwrap();
        StorageLayout::from(&config)
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("data.csv").unwrap(), "data.csv");
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\sales.csv").unwrap(), "sales.csv");
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("   ").is_err());
        assert!(sanitize_filename("dir/..").is_err());
        assert!(sanitize_filename("uploads/").is_err());
    }

    #[test]
    fn test_ensure_directories_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);

        layout.ensure_directories().unwrap();
        layout.ensure_directories().unwrap();

        assert!(layout.intake_dir.is_dir());
        assert!(layout.processed_dir.is_dir());
        assert!(layout.preview_dir.is_dir());
        assert!(layout.session_dir.is_dir());
    }

    #[test]
    fn test_stage_upload_recreates_deleted_intake() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        layout.ensure_directories().unwrap();
        fs::remove_dir_all(&layout.intake_dir).unwrap();

        let staged = layout
            .stage_upload(&UploadedDataset::new("nested/iris.csv", b"a,b\n1,2\n".to_vec()))
            .unwrap();

        assert_eq!(staged.original_name, "iris.csv");
        assert_eq!(staged.path, layout.intake_dir.join("iris.csv"));
        assert_eq!(staged.bytes, 8);
        assert_eq!(fs::read(&staged.path).unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn test_stage_rejects_empty_name() {
        let dir = TempDir::new().unwrap();
        let err = layout_in(&dir)
            .stage_upload(&UploadedDataset::new("", b"x".to_vec()))
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "No selected file");
    }

    #[test]
    fn test_snapshot() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(&dir);
        layout.ensure_directories().unwrap();
        fs::write(layout.processed_dir.join("processed_b.csv"), "x").unwrap();
        fs::write(layout.processed_dir.join("processed_a.csv"), "x").unwrap();
        fs::write(layout.raw_preview_path(), "x").unwrap();

        let snapshot = layout.snapshot();
        assert!(snapshot.processed.exists);
        assert_eq!(
            snapshot.processed.files,
            vec!["processed_a.csv".to_string(), "processed_b.csv".to_string()]
        );
        assert!(snapshot.raw_preview_exists);
        assert!(!snapshot.processed_preview_exists);
    }

    #[test]
    fn test_snapshot_of_missing_directory() {
        let dir = TempDir::new().unwrap();
        let snapshot = layout_in(&dir).snapshot();
        assert!(!snapshot.intake.exists);
        assert!(snapshot.intake.files.is_empty());
    }
}
