//! HTTP error envelope.
//!
//! Every failure leaves the server as a JSON body with an `error` field and
//! a stable `code`. Lookup misses add `processed_files`; engine failures add
//! `engine_log`.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Value, json};
use thiserror::Error;
use weedout_pipeline::PipelineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Multipart(e) => e.status(),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Pipeline(e) => e.error_code(),
            ApiError::Multipart(_) | ApiError::BadRequest(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
        }
    }

    fn body(&self) -> Value {
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let ApiError::Pipeline(e) = self {
            if let Some(files) = e.available_files() {
                body["processed_files"] = json!(files);
            }
            if let Some(log) = e.engine_diagnostics() {
                body["engine_log"] = json!(log);
            }
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        } else {
            tracing::warn!(code = self.code(), "{}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(PipelineError::validation("No file part")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PipelineError::SessionNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(PipelineError::Internal("Worker task failed: panicked".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_lookup_miss_lists_files() {
        let err = ApiError::from(PipelineError::NotFound {
            requested: "x.csv".into(),
            available: vec!["processed_a.csv".into()],
        });
        let body = err.body();
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["processed_files"], json!(["processed_a.csv"]));
        assert!(body.get("engine_log").is_none());
    }

    #[test]
    fn test_engine_failure_carries_log() {
        let err = ApiError::from(
            PipelineError::Engine {
                message: "target column missing".into(),
                diagnostics: "loading...\n".into(),
            }
            .with_context("Preprocessing failed"),
        );
        let body = err.body();
        assert_eq!(body["code"], "ENGINE_ERROR");
        assert_eq!(body["engine_log"], "loading...\n");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
