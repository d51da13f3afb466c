//! Structured pipeline events.
//!
//! Pipeline stages never print. They emit [`PipelineEvent`]s into an
//! [`EventSink`] supplied by the caller; the server installs a
//! [`TracingEventSink`], tests install a [`RecordingEventSink`].
//!
//! # Example
//!
//! ```rust,ignore
//! use weedout_pipeline::Pipeline;
//!
//! let pipeline = Pipeline::builder()
//!     .engine(engine)
//!     .on_event(|event| eprintln!("{:?}", event))
//!     .build()?;
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Something noteworthy that happened while handling a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The upload was written to intake storage.
    UploadStaged { path: PathBuf, bytes: u64 },

    /// A preview was written to the preview directory.
    PreviewPublished {
        path: PathBuf,
        rows: Option<usize>,
        downsampled: bool,
    },

    /// Writing a preview failed. Not fatal.
    PreviewFailed { path: PathBuf, message: String },

    /// The engine is about to be called.
    EngineInvoked {
        engine: String,
        file_path: PathBuf,
        strategy_passed: bool,
    },

    /// The engine returned a dataset.
    EngineFinished { rows: usize, columns: usize },

    /// The engine raised.
    EngineFailed { message: String },

    /// A processed artifact was durably written.
    ArtifactWritten { path: PathBuf, rows: usize },

    /// Removing a transient file hit a lock or permission error.
    ReclaimRetry {
        path: PathBuf,
        attempt: u32,
        message: String,
    },

    /// A transient file was removed (or was already gone).
    Reclaimed { path: PathBuf },

    /// A transient file could not be removed.
    ReclaimFailed { path: PathBuf, message: String },

    /// A session result record was stored.
    SessionStored { session_id: String },

    /// A session result record was displaced by expiry, capacity or replacement.
    SessionEvicted { session_id: String },
}

impl PipelineEvent {
    /// Short machine name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UploadStaged { .. } => "upload_staged",
            Self::PreviewPublished { .. } => "preview_published",
            Self::PreviewFailed { .. } => "preview_failed",
            Self::EngineInvoked { .. } => "engine_invoked",
            Self::EngineFinished { .. } => "engine_finished",
            Self::EngineFailed { .. } => "engine_failed",
            Self::ArtifactWritten { .. } => "artifact_written",
            Self::ReclaimRetry { .. } => "reclaim_retry",
            Self::Reclaimed { .. } => "reclaimed",
            Self::ReclaimFailed { .. } => "reclaim_failed",
            Self::SessionStored { .. } => "session_stored",
            Self::SessionEvicted { .. } => "session_evicted",
        }
    }
}

/// Receiver of [`PipelineEvent`]s.
///
/// Implementations must be `Send + Sync`: the pipeline runs on blocking
/// worker threads while the sink is owned by shared server state.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Forwards events to `tracing` at a level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::UploadStaged { path, bytes } => {
                tracing::info!(path = %path.display(), bytes, "Upload staged");
            }
            PipelineEvent::PreviewPublished {
                path,
                rows,
                downsampled,
            } => {
                tracing::info!(path = %path.display(), ?rows, downsampled, "Preview published");
            }
            PipelineEvent::PreviewFailed { path, message } => {
                tracing::warn!(path = %path.display(), "Preview not published: {}", message);
            }
            PipelineEvent::EngineInvoked {
                engine,
                file_path,
                strategy_passed,
            } => {
                tracing::info!(
                    engine = %engine,
                    file = %file_path.display(),
                    strategy_passed,
                    "Invoking preprocessing engine"
                );
            }
            PipelineEvent::EngineFinished { rows, columns } => {
                tracing::info!(rows, columns, "Engine finished");
            }
            PipelineEvent::EngineFailed { message } => {
                tracing::error!("Engine failed: {}", message);
            }
            PipelineEvent::ArtifactWritten { path, rows } => {
                tracing::info!(path = %path.display(), rows, "Processed artifact written");
            }
            PipelineEvent::ReclaimRetry {
                path,
                attempt,
                message,
            } => {
                tracing::debug!(path = %path.display(), attempt, "Removal blocked, retrying: {}", message);
            }
            PipelineEvent::Reclaimed { path } => {
                tracing::debug!(path = %path.display(), "Transient file removed");
            }
            PipelineEvent::ReclaimFailed { path, message } => {
                tracing::warn!(path = %path.display(), "Could not remove transient file: {}", message);
            }
            PipelineEvent::SessionStored { session_id } => {
                tracing::debug!(session = %session_id, "Session result stored");
            }
            PipelineEvent::SessionEvicted { session_id } => {
                tracing::debug!(session = %session_id, "Session result evicted");
            }
        }
    }
}

/// Wrapper that implements [`EventSink`] using a closure.
pub struct ClosureEventSink<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureEventSink<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventSink for ClosureEventSink<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    fn emit(&self, event: &PipelineEvent) {
        (self.callback)(event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    /// Kinds of the events recorded so far, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(PipelineEvent::kind).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.lock().push(event.clone());
    }
}

static_assertions::assert_impl_all!(TracingEventSink: Send, Sync);
static_assertions::assert_impl_all!(RecordingEventSink: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_sink() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let sink = ClosureEventSink::new(move |_event: &PipelineEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sink.emit(&PipelineEvent::EngineFinished { rows: 5, columns: 3 });
        sink.emit(&PipelineEvent::SessionStored {
            session_id: "abc".to_string(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        sink.emit(&PipelineEvent::EngineFailed {
            message: "boom".to_string(),
        });
        sink.emit(&PipelineEvent::Reclaimed {
            path: PathBuf::from("temp/a.csv"),
        });

        assert_eq!(sink.kinds(), vec!["engine_failed", "reclaimed"]);
        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = PipelineEvent::ArtifactWritten {
            path: PathBuf::from("processed/processed_a.csv"),
            rows: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "artifact_written");
        assert_eq!(json["rows"], 5);
    }

    #[test]
    fn test_tracing_sink_accepts_every_event() {
        let sink = TracingEventSink;
        sink.emit(&PipelineEvent::PreviewFailed {
            path: PathBuf::from("public/files/file.csv"),
            message: "disk full".to_string(),
        });
    }
}
