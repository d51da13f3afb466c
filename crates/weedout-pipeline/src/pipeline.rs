//! Upload-to-result orchestration.
//!
//! [`Pipeline`] wires the stages together for both request flows:
//!
//! - **direct** ([`Pipeline::process_upload`]): stage → raw preview →
//!   normalize → invoke → publish (artifact, processed preview, reclaim);
//! - **session** ([`Pipeline::process_session`]): stage into a per-session
//!   folder → normalize → invoke → write artifact → reclaim → record.
//!
//! Everything here is blocking; async callers should run it on a blocking
//! thread.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::build_zip;
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::engine::PreprocessingEngine;
use crate::error::{PipelineError, Result};
use crate::events::{ClosureEventSink, EventSink, PipelineEvent, TracingEventSink};
use crate::invoker::{build_call, invoke};
use crate::lookup::resolve;
use crate::params::{PreprocessingRequest, RawForm, normalize};
use crate::preview::{PreviewPolicy, PreviewReport};
use crate::publisher::{StoredArtifact, publish, publish_raw_preview, write_artifact};
use crate::reclaim::{ReclaimPolicy, safe_remove, safe_remove_dir};
use crate::session::{SessionResultRecord, SessionStore};
use crate::staging::{StorageLayout, StorageSnapshot, UploadedDataset, stage_into};

/// Result of a successful direct upload.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub artifact: StoredArtifact,
    /// True when either published preview is a sample rather than the full data.
    pub downsample_warning: bool,
    /// The normalized request, including the original sampling representation.
    pub options_used: PreprocessingRequest,
    pub engine_log: String,
    pub raw_preview: PreviewReport,
    pub processed_preview: PreviewReport,
    pub original_reclaimed: bool,
}

/// The upload-to-result pipeline.
///
/// Use [`Pipeline::builder()`] to create one. A single instance is shared by
/// every request.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use weedout_pipeline::{CommandEngine, Pipeline, PipelineConfig, RawForm, UploadedDataset};
///
/// let pipeline = Pipeline::builder()
///     .config(PipelineConfig::builder().root_dir("/srv/weedout").build()?)
///     .engine(Arc::new(CommandEngine::new("python3").args(["engine/weedout_bridge.py"])))
///     .build()?;
///
/// let outcome = pipeline.process_upload(
///     UploadedDataset::new("iris.csv", bytes),
///     &RawForm::new().with("target_column", "species"),
/// )?;
/// println!("{}", outcome.artifact.file_name);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    layout: StorageLayout,
    preview_policy: PreviewPolicy,
    reclaim_policy: ReclaimPolicy,
    engine: Arc<dyn PreprocessingEngine>,
    sink: Arc<dyn EventSink>,
    sessions: SessionStore,
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run the direct flow for one upload.
    ///
    /// On an engine failure the staged upload is left in intake storage.
    pub fn process_upload(&self, upload: UploadedDataset, form: &RawForm) -> Result<ProcessOutcome> {
        let sink = self.sink.as_ref();

        let staged = self.layout.stage_upload(&upload)?;
        sink.emit(&PipelineEvent::UploadStaged {
            path: staged.path.clone(),
            bytes: staged.bytes,
        });

        let raw_preview = publish_raw_preview(&self.layout, &staged, &self.preview_policy, sink);

        let request = normalize(form, self.config.default_objective)?;
        let call = build_call(&staged.path, &request, self.config.engine_sampling_format);
        let output = invoke(self.engine.as_ref(), &call, sink)?;

        let published = publish(
            &self.layout,
            &output.frame,
            &staged,
            &self.preview_policy,
            &self.reclaim_policy,
            sink,
        )?;

        Ok(ProcessOutcome {
            artifact: published.artifact,
            downsample_warning: raw_preview.downsampled || published.processed_preview.downsampled,
            options_used: request,
            engine_log: output.diagnostics,
            raw_preview,
            processed_preview: published.processed_preview,
            original_reclaimed: published.original_reclaimed,
        })
    }

    /// Run the session flow and record the result under `session_id`.
    ///
    /// The result folder is removed again if any step fails, since no record
    /// would ever point at it.
    pub fn process_session(
        &self,
        session_id: &str,
        upload: UploadedDataset,
        form: &RawForm,
    ) -> Result<SessionResultRecord> {
        let sink = self.sink.as_ref();

        self.layout.ensure_directories()?;
        let result_dir = self.layout.session_dir.join(uuid::Uuid::new_v4().to_string());

        let record = match self.run_session(&result_dir, upload, form) {
            Ok(record) => record,
            Err(err) => {
                safe_remove_dir(&result_dir, &self.reclaim_policy, sink);
                return Err(err);
            }
        };

        let displaced = self.sessions.insert(session_id, record.clone());
        sink.emit(&PipelineEvent::SessionStored {
            session_id: session_id.to_string(),
        });
        for (id, old) in displaced {
            sink.emit(&PipelineEvent::SessionEvicted { session_id: id });
            safe_remove_dir(&old.result_dir, &self.reclaim_policy, sink);
        }

        Ok(record)
    }

    fn run_session(
        &self,
        result_dir: &Path,
        upload: UploadedDataset,
        form: &RawForm,
    ) -> Result<SessionResultRecord> {
        let sink = self.sink.as_ref();

        let staged = stage_into(result_dir, &upload)?;
        sink.emit(&PipelineEvent::UploadStaged {
            path: staged.path.clone(),
            bytes: staged.bytes,
        });

        let request = normalize(form, self.config.default_objective)?;
        let call = build_call(&staged.path, &request, self.config.engine_sampling_format);
        let output = invoke(self.engine.as_ref(), &call, sink)?;

        let artifact = write_artifact(result_dir, &staged.original_name, &output.frame, sink)?;
        safe_remove(&staged.path, &self.reclaim_policy, sink);

        Ok(SessionResultRecord {
            request,
            diagnostics: output.diagnostics,
            result_dir: result_dir.to_path_buf(),
            result_path: artifact.path,
            original_name: staged.original_name,
            created_at: Utc::now(),
        })
    }

    /// The stored result for `session_id`.
    pub fn session_result(&self, session_id: &str) -> Result<SessionResultRecord> {
        self.sessions
            .get(session_id)
            .ok_or(PipelineError::SessionNotFound)
    }

    /// Zip the stored result for `session_id`.
    pub fn session_archive(&self, session_id: &str) -> Result<Vec<u8>> {
        let record = self.session_result(session_id)?;
        build_zip(&record.result_path)
    }

    /// Remove expired session records and their folders.
    pub fn purge_expired_sessions(&self) -> usize {
        let expired = self.sessions.purge_expired();
        let count = expired.len();
        for (id, record) in expired {
            self.sink.emit(&PipelineEvent::SessionEvicted { session_id: id });
            safe_remove_dir(&record.result_dir, &self.reclaim_policy, self.sink.as_ref());
        }
        count
    }

    /// Locate a processed artifact by a possibly inexact name.
    pub fn resolve_download(&self, requested: &str) -> Result<PathBuf> {
        resolve(&self.layout, requested)
    }

    /// Directory state for diagnostics.
    pub fn snapshot(&self) -> StorageSnapshot {
        self.layout.snapshot()
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    engine: Option<Arc<dyn PreprocessingEngine>>,
    sink: Option<Arc<dyn EventSink>>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the preprocessing engine. Required.
    pub fn engine(mut self, engine: Arc<dyn PreprocessingEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the event sink. Defaults to [`TracingEventSink`].
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Receive events through a closure.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(ClosureEventSink::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid or no engine was set.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let engine = self.engine.ok_or(ConfigValidationError::MissingEngine)?;

        Ok(Pipeline {
            layout: StorageLayout::from(&config),
            preview_policy: PreviewPolicy::from(&config),
            reclaim_policy: ReclaimPolicy::from(&config),
            sessions: SessionStore::from_config(&config),
            engine,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingEventSink)),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, EngineFailure, EngineOutput};

    struct EchoEngine;

    impl PreprocessingEngine for EchoEngine {
        fn name(&self) -> &str {
            "echo"
        }

        fn run(&self, call: &EngineCall) -> std::result::Result<EngineOutput, EngineFailure> {
            let frame = crate::csv_io::read_csv(&call.file_path)
                .map_err(|e| EngineFailure::new(e.to_string()))?;
            Ok(EngineOutput {
                frame,
                diagnostics: String::new(),
            })
        }
    }

    #[test]
    fn test_builder_requires_engine() {
        assert!(matches!(
            Pipeline::builder().build(),
            Err(ConfigValidationError::MissingEngine)
        ));
    }

    #[test]
    fn test_builder_validates_config() {
        let result = Pipeline::builder()
            .engine(Arc::new(EchoEngine))
            .config(PipelineConfig {
                reclaim_attempts: 0,
                ..PipelineConfig::default()
            })
            .build();
        assert!(matches!(result, Err(ConfigValidationError::ZeroValue(_))));
    }

    #[test]
    fn test_on_event_receives_events() {
        let dir = tempfile::TempDir::new().unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_by_sink = seen.clone();

        let pipeline = Pipeline::builder()
            .config(PipelineConfig::builder().root_dir(dir.path()).build().unwrap())
            .engine(Arc::new(EchoEngine))
            .on_event(move |event| seen_by_sink.lock().push(event.kind()))
            .build()
            .unwrap();

        let outcome = pipeline
            .process_upload(
                UploadedDataset::new("a.csv", b"x,y\n1,2\n".to_vec()),
                &RawForm::new(),
            )
            .unwrap();

        assert_eq!(outcome.artifact.rows, 1);
        let kinds = seen.lock().clone();
        assert_eq!(kinds.first(), Some(&"upload_staged"));
        assert!(kinds.contains(&"engine_finished"));
        assert_eq!(kinds.last(), Some(&"reclaimed"));
    }

    #[test]
    fn test_missing_session_is_reported() {
        let pipeline = Pipeline::builder().engine(Arc::new(EchoEngine)).build().unwrap();
        let err = pipeline.session_result("nobody").unwrap_err();
        assert_eq!(err.error_code(), "SESSION_NOT_FOUND");
    }
}
