//! Row-capped previews.
//!
//! A UI only needs a glance at the data, so large datasets are uniformly
//! sampled down to a ceiling before being published. Two independent
//! triggers exist and are deliberately kept separate:
//!
//! - the raw upload is sampled when its file size exceeds
//!   [`PreviewPolicy::raw_size_threshold_bytes`];
//! - the processed result is sampled when its row count exceeds
//!   [`PreviewPolicy::processed_row_threshold`].
//!
//! Whenever a trigger fires, the preview holds `min(ceiling, total_rows)`
//! rows and is flagged as downsampled. Sampled rows keep their original
//! relative order.

use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::csv_io::{read_csv, write_csv};
use crate::error::{PipelineError, Result, ResultExt};

/// Thresholds and ceiling for preview generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewPolicy {
    pub ceiling: usize,
    pub raw_size_threshold_bytes: u64,
    pub processed_row_threshold: usize,
    pub seed: Option<u64>,
}

impl From<&PipelineConfig> for PreviewPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            ceiling: config.preview_row_ceiling,
            raw_size_threshold_bytes: config.raw_preview_size_threshold_bytes,
            processed_row_threshold: config.processed_preview_row_threshold,
            seed: config.preview_seed,
        }
    }
}

impl Default for PreviewPolicy {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl PreviewPolicy {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// What a preview consists of.
#[derive(Debug, Clone)]
pub enum PreviewContent {
    /// The source file is small enough to be copied verbatim.
    Copy(PathBuf),
    /// An in-memory table (sampled or not).
    Frame(DataFrame),
}

/// A preview ready to be written to its published location.
#[derive(Debug, Clone)]
pub struct PreviewArtifact {
    pub content: PreviewContent,
    /// Row count when known without reading the file.
    pub rows: Option<usize>,
    pub downsampled: bool,
}

impl PreviewArtifact {
    /// Write the preview to `dest`, replacing any previous preview.
    pub fn write_to(&self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::storage(format!("Failed to create {}", parent.display()), e)
            })?;
        }

        match &self.content {
            PreviewContent::Copy(source) => {
                fs::copy(source, dest).map_err(|e| {
                    PipelineError::storage(
                        format!("Failed to copy {} to {}", source.display(), dest.display()),
                        e,
                    )
                })?;
            }
            PreviewContent::Frame(df) => {
                let mut df = df.clone();
                write_csv(&mut df, dest)?;
            }
        }
        Ok(())
    }
}

/// Outcome of publishing one preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewReport {
    pub path: PathBuf,
    pub rows: Option<usize>,
    pub downsampled: bool,
    /// False when writing the preview failed; the request still succeeds.
    pub published: bool,
}

impl PreviewReport {
    pub fn failed(path: PathBuf) -> Self {
        Self {
            path,
            rows: None,
            downsampled: false,
            published: false,
        }
    }
}

/// Preview of a raw upload, triggered by file size.
pub fn preview_of_upload(path: &Path, policy: &PreviewPolicy) -> Result<PreviewArtifact> {
    let size = fs::metadata(path)
        .map_err(|e| PipelineError::storage(format!("Failed to stat {}", path.display()), e))?
        .len();

    if size <= policy.raw_size_threshold_bytes {
        return Ok(PreviewArtifact {
            content: PreviewContent::Copy(path.to_path_buf()),
            rows: None,
            downsampled: false,
        });
    }

    let df = read_csv(path)?;
    let sampled = sample_rows(&df, policy.ceiling, &mut policy.rng())?;
    Ok(PreviewArtifact {
        rows: Some(sampled.height()),
        content: PreviewContent::Frame(sampled),
        downsampled: true,
    })
}

/// Preview of a processed result, triggered by row count.
pub fn preview_of_frame(df: &DataFrame, policy: &PreviewPolicy) -> Result<PreviewArtifact> {
    if df.height() <= policy.processed_row_threshold {
        return Ok(PreviewArtifact {
            rows: Some(df.height()),
            content: PreviewContent::Frame(df.clone()),
            downsampled: false,
        });
    }

    let sampled = sample_rows(df, policy.ceiling, &mut policy.rng())?;
    Ok(PreviewArtifact {
        rows: Some(sampled.height()),
        content: PreviewContent::Frame(sampled),
        downsampled: true,
    })
}

/// Draw `min(n, height)` distinct rows uniformly, preserving row order.
pub fn sample_rows(df: &DataFrame, n: usize, rng: &mut StdRng) -> Result<DataFrame> {
    let total = df.height();
    if n >= total {
        return Ok(df.clone());
    }

    let mut indices = rand::seq::index::sample(rng, total, n).into_vec();
    indices.sort_unstable();

    let indices: Vec<IdxSize> = indices.into_iter().map(|i| i as IdxSize).collect();
    let idx = IdxCa::from_vec("sample".into(), indices);
    df.take(&idx).context("Failed to sample preview rows")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn numbered_frame(rows: usize) -> DataFrame {
        let ids: Vec<i64> = (0..rows as i64).collect();
        df! { "id" => ids }.unwrap()
    }

    fn small_policy() -> PreviewPolicy {
        PreviewPolicy {
            ceiling: 10,
            raw_size_threshold_bytes: 64,
            processed_row_threshold: 10,
            seed: Some(7),
        }
    }

    #[test]
    fn test_frame_within_threshold_is_exact() {
        let df = numbered_frame(10);
        let preview = preview_of_frame(&df, &small_policy()).unwrap();
        assert!(!preview.downsampled);
        assert_eq!(preview.rows, Some(10));
    }

    #[test]
    fn test_frame_over_threshold_is_capped() {
        let df = numbered_frame(25);
        let preview = preview_of_frame(&df, &small_policy()).unwrap();
        assert!(preview.downsampled);
        assert_eq!(preview.rows, Some(10));
    }

    #[test]
    fn test_sampled_rows_are_distinct_and_ordered() {
        let df = numbered_frame(1000);
        let mut rng = StdRng::seed_from_u64(1);
        let sampled = sample_rows(&df, 100, &mut rng).unwrap();

        let ids: Vec<i64> = sampled
            .column("id")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(ids.len(), 100);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let df = numbered_frame(500);
        let policy = PreviewPolicy {
            processed_row_threshold: 100,
            ceiling: 50,
            ..small_policy()
        };
        let a = preview_of_frame(&df, &policy).unwrap();
        let b = preview_of_frame(&df, &policy).unwrap();
        match (a.content, b.content) {
            (PreviewContent::Frame(a), PreviewContent::Frame(b)) => assert!(a.equals(&b)),
            _ => panic!("expected sampled frames"),
        }
    }

    #[test]
    fn test_small_upload_is_copied_verbatim() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("tiny.csv");
        fs::write(&source, "id\n1\n2\n").unwrap();

        let preview = preview_of_upload(&source, &small_policy()).unwrap();
        assert!(!preview.downsampled);

        let dest = dir.path().join("public").join("file.csv");
        preview.write_to(&dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), fs::read(&source).unwrap());
    }

    #[test]
    fn test_large_upload_is_sampled() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("big.csv");
        let mut body = String::from("id\n");
        for i in 0..40 {
            body.push_str(&format!("{}\n", i));
        }
        fs::write(&source, body).unwrap();

        let preview = preview_of_upload(&source, &small_policy()).unwrap();
        assert!(preview.downsampled);
        assert_eq!(preview.rows, Some(10));

        let dest = dir.path().join("file.csv");
        preview.write_to(&dest).unwrap();
        assert_eq!(read_csv(&dest).unwrap().height(), 10);
    }

    #[test]
    fn test_large_file_with_few_rows_keeps_every_row() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("wide.csv");
        let wide = "x".repeat(200);
        fs::write(&source, format!("text\n{}\n{}\n", wide, wide)).unwrap();

        let preview = preview_of_upload(&source, &small_policy()).unwrap();
        assert!(preview.downsampled);
        assert_eq!(preview.rows, Some(2));
    }
}
