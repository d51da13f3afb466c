//! Result publication.
//!
//! Ordering is the only consistency guarantee the pipeline offers:
//!
//! 1. write the full result to `processed_<name>` (fatal on failure);
//! 2. write the capped preview to the fixed preview path (logged on failure);
//! 3. only if both succeeded, reclaim the staged upload.
//!
//! A crash or error at any step therefore never leaves zero recoverable
//! copies of the data.

use polars::prelude::DataFrame;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::csv_io::write_csv;
use crate::error::{Result, ResultExt};
use crate::events::{EventSink, PipelineEvent};
use crate::preview::{PreviewArtifact, PreviewPolicy, PreviewReport, preview_of_frame, preview_of_upload};
use crate::reclaim::{ReclaimPolicy, safe_remove};
use crate::staging::{StagedUpload, StorageLayout, artifact_name, ensure_directories};

/// A durably written processed dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Outcome of [`publish`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub artifact: StoredArtifact,
    pub processed_preview: PreviewReport,
    pub original_reclaimed: bool,
}

/// Write `frame` as `processed_<original_name>` inside `dir`.
pub fn write_artifact(
    dir: &Path,
    original_name: &str,
    frame: &DataFrame,
    sink: &dyn EventSink,
) -> Result<StoredArtifact> {
    ensure_directories([dir])?;

    let file_name = artifact_name(original_name);
    let path = dir.join(&file_name);
    let mut frame = frame.clone();
    write_csv(&mut frame, &path).context("Failed to write processed artifact")?;

    sink.emit(&PipelineEvent::ArtifactWritten {
        path: path.clone(),
        rows: frame.height(),
    });

    Ok(StoredArtifact {
        file_name,
        rows: frame.height(),
        columns: frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect(),
        path,
    })
}

/// Publish a processed result and reclaim the staged upload.
pub fn publish(
    layout: &StorageLayout,
    frame: &DataFrame,
    staged: &StagedUpload,
    preview_policy: &PreviewPolicy,
    reclaim_policy: &ReclaimPolicy,
    sink: &dyn EventSink,
) -> Result<Published> {
    layout.ensure_directories()?;

    let artifact = write_artifact(&layout.processed_dir, &staged.original_name, frame, sink)?;

    let preview_path = layout.processed_preview_path();
    let processed_preview = write_preview(
        preview_of_frame(frame, preview_policy),
        preview_path,
        sink,
    );

    let original_reclaimed = if processed_preview.published {
        safe_remove(&staged.path, reclaim_policy, sink)
    } else {
        false
    };

    Ok(Published {
        artifact,
        processed_preview,
        original_reclaimed,
    })
}

/// Publish the raw-upload preview. Never fails the request.
pub fn publish_raw_preview(
    layout: &StorageLayout,
    staged: &StagedUpload,
    policy: &PreviewPolicy,
    sink: &dyn EventSink,
) -> PreviewReport {
    if let Err(e) = layout.ensure_directories() {
        let path = layout.raw_preview_path();
        sink.emit(&PipelineEvent::PreviewFailed {
            path: path.clone(),
            message: e.to_string(),
        });
        return PreviewReport::failed(path);
    }
    write_preview(
        preview_of_upload(&staged.path, policy),
        layout.raw_preview_path(),
        sink,
    )
}

fn write_preview(
    artifact: Result<PreviewArtifact>,
    path: PathBuf,
    sink: &dyn EventSink,
) -> PreviewReport {
    match artifact.and_then(|a| a.write_to(&path).map(|()| a)) {
        Ok(artifact) => {
            sink.emit(&PipelineEvent::PreviewPublished {
                path: path.clone(),
                rows: artifact.rows,
                downsampled: artifact.downsampled,
            });
            PreviewReport {
                path,
                rows: artifact.rows,
                downsampled: artifact.downsampled,
                published: true,
            }
        }
        Err(e) => {
            sink.emit(&PipelineEvent::PreviewFailed {
                path: path.clone(),
                message: e.to_string(),
            });
            PreviewReport::failed(path)
        }
    }
}
