//! Configuration for the upload-to-result pipeline.
//!
//! A single [`PipelineConfig`] is built once at start-up with the builder
//! pattern, validated, and then shared by every component. Nothing in the
//! pipeline looks up folder paths or thresholds from globals.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineSamplingFormat;
use crate::params::ModelObjective;

const MIB: u64 = 1024 * 1024;

/// Configuration for the upload-to-result pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use weedout_pipeline::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .intake_dir("/var/weedout/temp")
///     .processed_dir("/var/weedout/processed")
///     .preview_row_ceiling(5_000)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding transient uploads until they are published.
    /// Default: "temp"
    pub intake_dir: PathBuf,

    /// Directory holding every `processed_<name>` artifact.
    /// Default: "processed"
    pub processed_dir: PathBuf,

    /// Directory the UI reads the latest previews from.
    /// Default: "public/files"
    pub preview_dir: PathBuf,

    /// Parent directory of per-session result folders.
    /// Default: "sessions"
    pub session_dir: PathBuf,

    /// Maximum number of rows in any preview.
    /// Default: 10 000
    pub preview_row_ceiling: usize,

    /// Raw uploads larger than this are sampled for the preview.
    /// Default: 10 MiB
    pub raw_preview_size_threshold_bytes: u64,

    /// Processed results with more rows than this are sampled for the preview.
    /// Default: 10 000
    pub processed_preview_row_threshold: usize,

    /// Number of removal attempts before a transient file is abandoned.
    /// Default: 3
    pub reclaim_attempts: u32,

    /// Pause between removal attempts after a lock or permission error.
    /// Default: 500 ms
    pub reclaim_retry_delay: Duration,

    /// Lifetime of a session result record.
    /// Default: 1 hour
    pub session_ttl: Duration,

    /// Maximum number of live session records.
    /// Default: 256
    pub session_capacity: usize,

    /// Objective used when the request does not name one.
    /// Default: Classification
    pub default_objective: ModelObjective,

    /// How the `sampling` argument is encoded for the engine.
    /// Default: Flag
    pub engine_sampling_format: EngineSamplingFormat,

    /// Largest accepted request body.
    /// Default: 200 MiB
    pub max_upload_bytes: u64,

    /// Fixed seed for preview sampling. `None` draws from entropy.
    /// Default: None
    pub preview_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            intake_dir: PathBuf::from("temp"),
            processed_dir: PathBuf::from("processed"),
            preview_dir: PathBuf::from("public/files"),
            session_dir: PathBuf::from("sessions"),
            preview_row_ceiling: 10_000,
            raw_preview_size_threshold_bytes: 10 * MIB,
            processed_preview_row_threshold: 10_000,
            reclaim_attempts: 3,
            reclaim_retry_delay: Duration::from_millis(500),
            session_ttl: Duration::from_secs(60 * 60),
            session_capacity: 256,
            default_objective: ModelObjective::Classification,
            engine_sampling_format: EngineSamplingFormat::default(),
            max_upload_bytes: 200 * MIB,
            preview_seed: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.preview_row_ceiling == 0 {
            return Err(ConfigValidationError::ZeroValue("preview_row_ceiling"));
        }

        if self.raw_preview_size_threshold_bytes == 0 {
            return Err(ConfigValidationError::ZeroValue(
                "raw_preview_size_threshold_bytes",
            ));
        }

        if self.processed_preview_row_threshold == 0 {
            return Err(ConfigValidationError::ZeroValue(
                "processed_preview_row_threshold",
            ));
        }

        if self.reclaim_attempts == 0 {
            return Err(ConfigValidationError::ZeroValue("reclaim_attempts"));
        }

        if self.session_capacity == 0 {
            return Err(ConfigValidationError::ZeroValue("session_capacity"));
        }

        if self.intake_dir == self.processed_dir {
            return Err(ConfigValidationError::SharedDirectory(
                self.intake_dir.clone(),
            ));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid value for '{0}': must be greater than zero")]
    ZeroValue(&'static str),

    #[error("Intake and processed directories must differ (both are '{}')", .0.display())]
    SharedDirectory(PathBuf),

    #[error("No preprocessing engine configured")]
    MissingEngine,
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    intake_dir: Option<PathBuf>,
    processed_dir: Option<PathBuf>,
    preview_dir: Option<PathBuf>,
    session_dir: Option<PathBuf>,
    preview_row_ceiling: Option<usize>,
    raw_preview_size_threshold_bytes: Option<u64>,
    processed_preview_row_threshold: Option<usize>,
    reclaim_attempts: Option<u32>,
    reclaim_retry_delay: Option<Duration>,
    session_ttl: Option<Duration>,
    session_capacity: Option<usize>,
    default_objective: Option<ModelObjective>,
    engine_sampling_format: Option<EngineSamplingFormat>,
    max_upload_bytes: Option<u64>,
    preview_seed: Option<u64>,
}

impl PipelineConfigBuilder {
    /// Place all four working directories under one root, using the
    /// default relative names.
    pub fn root_dir(self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let defaults = PipelineConfig::default();
        self.intake_dir(root.join(defaults.intake_dir))
            .processed_dir(root.join(defaults.processed_dir))
            .preview_dir(root.join(defaults.preview_dir))
            .session_dir(root.join(defaults.session_dir))
    }

    pub fn intake_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.intake_dir = Some(path.into());
        self
    }

    pub fn processed_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.processed_dir = Some(path.into());
        self
    }

    pub fn preview_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.preview_dir = Some(path.into());
        self
    }

    pub fn session_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_dir = Some(path.into());
        self
    }

    /// Set the maximum number of rows a preview may hold.
    pub fn preview_row_ceiling(mut self, rows: usize) -> Self {
        self.preview_row_ceiling = Some(rows);
        self
    }

    /// Set the raw-upload size above which the preview is sampled.
    pub fn raw_preview_size_threshold_bytes(mut self, bytes: u64) -> Self {
        self.raw_preview_size_threshold_bytes = Some(bytes);
        self
    }

    /// Set the processed row count above which the preview is sampled.
    pub fn processed_preview_row_threshold(mut self, rows: usize) -> Self {
        self.processed_preview_row_threshold = Some(rows);
        self
    }

    pub fn reclaim_attempts(mut self, attempts: u32) -> Self {
        self.reclaim_attempts = Some(attempts);
        self
    }

    pub fn reclaim_retry_delay(mut self, delay: Duration) -> Self {
        self.reclaim_retry_delay = Some(delay);
        self
    }

    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    pub fn session_capacity(mut self, capacity: usize) -> Self {
        self.session_capacity = Some(capacity);
        self
    }

    /// Set the objective applied when a request omits it.
    pub fn default_objective(mut self, objective: ModelObjective) -> Self {
        self.default_objective = Some(objective);
        self
    }

    /// Set how the `sampling` argument is encoded for the engine.
    pub fn engine_sampling_format(mut self, format: EngineSamplingFormat) -> Self {
        self.engine_sampling_format = Some(format);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = Some(bytes);
        self
    }

    /// Fix the preview sampling seed (reproducible previews).
    pub fn preview_seed(mut self, seed: u64) -> Self {
        self.preview_seed = Some(seed);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            intake_dir: self.intake_dir.unwrap_or(defaults.intake_dir),
            processed_dir: self.processed_dir.unwrap_or(defaults.processed_dir),
            preview_dir: self.preview_dir.unwrap_or(defaults.preview_dir),
            session_dir: self.session_dir.unwrap_or(defaults.session_dir),
            preview_row_ceiling: self
                .preview_row_ceiling
                .unwrap_or(defaults.preview_row_ceiling),
            raw_preview_size_threshold_bytes: self
                .raw_preview_size_threshold_bytes
                .unwrap_or(defaults.raw_preview_size_threshold_bytes),
            processed_preview_row_threshold: self
                .processed_preview_row_threshold
                .unwrap_or(defaults.processed_preview_row_threshold),
            reclaim_attempts: self.reclaim_attempts.unwrap_or(defaults.reclaim_attempts),
            reclaim_retry_delay: self
                .reclaim_retry_delay
                .unwrap_or(defaults.reclaim_retry_delay),
            session_ttl: self.session_ttl.unwrap_or(defaults.session_ttl),
            session_capacity: self.session_capacity.unwrap_or(defaults.session_capacity),
            default_objective: self.default_objective.unwrap_or(defaults.default_objective),
            engine_sampling_format: self
                .engine_sampling_format
                .unwrap_or(defaults.engine_sampling_format),
            max_upload_bytes: self.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
            preview_seed: self.preview_seed,
        };

        config.validate()?;
        Ok(config)
    }
}

static_assertions::assert_impl_all!(PipelineConfig: Send, Sync);
