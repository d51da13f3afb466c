//! Error types for the upload-to-result pipeline.
//!
//! This module provides the error hierarchy shared by every pipeline stage,
//! built with `thiserror`. Errors carry a stable error code so the HTTP layer
//! can map them onto status codes without string matching.
//!
//! Errors are serializable as `{code, message}` so they can be returned to a
//! calling UI unchanged.
//!
//! Note that failing to delete a transient file is deliberately *not* an
//! error: the reclaimer reports it through [`crate::events::PipelineEvent`]
//! and a boolean instead.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The request was malformed: missing file part, empty filename,
    /// or a form field that could not be parsed.
    #[error("{0}")]
    Validation(String),

    /// The external preprocessing engine rejected the call or crashed.
    ///
    /// `diagnostics` holds whatever the engine emitted before failing.
    #[error("{message}")]
    Engine {
        message: String,
        diagnostics: String,
    },

    /// A directory could not be created or a file could not be written.
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// No processed artifact matched the requested name.
    ///
    /// `available` lists every file in processed storage so the caller can
    /// see what *does* exist.
    #[error("File not found: {requested}")]
    NotFound {
        requested: String,
        available: Vec<String>,
    },

    /// No result has been recorded for the calling session.
    #[error("No results found for this session")]
    SessionNotFound,

    /// Building the download archive failed.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Internal error (e.g., a blocking task could not be joined).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Shorthand for a [`PipelineError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation(message.into())
    }

    /// Wrap an IO error raised while touching durable storage.
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for client-side handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Engine { .. } => "ENGINE_ERROR",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::Archive(_) => "ARCHIVE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Returns the innermost error, skipping any context wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the caller is at fault (maps to HTTP 400).
    pub fn is_client_error(&self) -> bool {
        matches!(self.root(), Self::Validation(_))
    }

    /// Whether the requested resource does not exist (maps to HTTP 404).
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. } | Self::SessionNotFound)
    }

    /// Engine diagnostics attached to this error, if any.
    pub fn engine_diagnostics(&self) -> Option<&str> {
        match self.root() {
            Self::Engine { diagnostics, .. } => Some(diagnostics.as_str()),
            _ => None,
        }
    }

    /// Listing of processed files attached to a lookup miss, if any.
    pub fn available_files(&self) -> Option<&[String]> {
        match self.root() {
            Self::NotFound { available, .. } => Some(available.as_slice()),
            _ => None,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            PipelineError::validation("No file uploaded").error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(PipelineError::SessionNotFound.error_code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn test_status_classes() {
        assert!(PipelineError::validation("bad").is_client_error());
        let missing = PipelineError::NotFound {
            requested: "x.csv".to_string(),
            available: vec!["processed_a.csv".to_string()],
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_client_error());
        assert_eq!(
            missing.available_files(),
            Some(&["processed_a.csv".to_string()][..])
        );
    }

    #[test]
    fn test_engine_diagnostics_survive_context() {
        let error = PipelineError::Engine {
            message: "target column 'y' not found".to_string(),
            diagnostics: "loading data...".to_string(),
        }
        .with_context("During invocation");

        assert_eq!(error.error_code(), "ENGINE_ERROR");
        assert_eq!(error.engine_diagnostics(), Some("loading data..."));
        assert!(error.to_string().contains("During invocation"));
    }

    #[test]
    fn test_error_serialization() {
        let error = PipelineError::validation("No selected file");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("VALIDATION_ERROR"));
        assert!(json.contains("No selected file"));
    }
}
