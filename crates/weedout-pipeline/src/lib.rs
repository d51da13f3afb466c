//! WeedOut upload-to-result pipeline.
//!
//! Accepts an uploaded tabular dataset, hands it to an external
//! preprocessing engine, and publishes the transformed result together with
//! a size-capped preview for a calling UI.
//!
//! # Overview
//!
//! - **Staging** ([`staging`]): working directories, upload staging, naming
//! - **Reclaiming** ([`reclaim`]): removal of transient files with bounded retries
//! - **Previews** ([`preview`]): uniform row sampling above independent thresholds
//! - **Normalization** ([`params`]): loosely-typed form fields to a strict request
//! - **Invocation** ([`invoker`], [`engine`]): one engine call per request
//! - **Publication** ([`publisher`]): artifact, preview, then cleanup, in that order
//! - **Download** ([`archive`], [`lookup`]): zip packaging and name resolution
//! - **Sessions** ([`session`]): expiring per-client result records
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weedout_pipeline::{CommandEngine, Pipeline, PipelineConfig, RawForm, UploadedDataset};
//!
//! let pipeline = Pipeline::builder()
//!     .config(PipelineConfig::default())
//!     .engine(Arc::new(CommandEngine::new("python3").args(["engine/weedout_bridge.py"])))
//!     .build()?;
//!
//! let form = RawForm::new()
//!     .with("target_column", "target")
//!     .with("sampling_strategy", "smote");
//!
//! let outcome = pipeline.process_upload(UploadedDataset::new("data.csv", bytes), &form)?;
//! println!("{} ({} rows)", outcome.artifact.file_name, outcome.artifact.rows);
//! ```

pub mod archive;
pub mod config;
pub mod csv_io;
pub mod engine;
pub mod error;
pub mod events;
pub mod invoker;
pub mod lookup;
pub mod params;
pub mod pipeline;
pub mod preview;
pub mod publisher;
pub mod reclaim;
pub mod session;
pub mod staging;

pub use archive::{ARCHIVE_DOWNLOAD_NAME, ARCHIVE_ENTRY_NAME, build_zip};
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use engine::{
    CommandEngine, EngineCall, EngineFailure, EngineOutput, EngineSamplingFormat,
    PreprocessingEngine, SamplingArg,
};
pub use error::{PipelineError, Result, ResultExt};
pub use events::{ClosureEventSink, EventSink, PipelineEvent, RecordingEventSink, TracingEventSink};
pub use params::{
    DatasetKind, ModelObjective, PreprocessingRequest, RawForm, SamplingInput, SamplingStrategy,
    normalize,
};
pub use pipeline::{Pipeline, PipelineBuilder, ProcessOutcome};
pub use preview::{PreviewArtifact, PreviewPolicy, PreviewReport};
pub use publisher::{Published, StoredArtifact};
pub use reclaim::{ReclaimPolicy, safe_remove};
pub use session::{SessionResultRecord, SessionStore, new_session_id};
pub use staging::{StagedUpload, StorageLayout, StorageSnapshot, UploadedDataset};
