//! Session-keyed flow: process now, read the result back later.

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use weedout_pipeline::{
    ARCHIVE_DOWNLOAD_NAME, PipelineError, PreprocessingRequest, SamplingInput, new_session_id,
};

use super::attachment;
use crate::error::ApiError;
use crate::form::read_upload;
use crate::state::AppState;

/// Cookie holding the opaque session token.
pub const SESSION_COOKIE: &str = "weedout_session";

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub parameters: PreprocessingRequest,
    pub sampling_input: SamplingInput,
    pub engine_log: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

fn session_id(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string())
}

fn no_results() -> ApiError {
    ApiError::from(PipelineError::SessionNotFound)
}

/// `POST /api/preprocess`
pub async fn preprocess(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let form = read_upload(multipart).await?;

    let (id, jar) = match session_id(&jar) {
        Some(id) => (id, jar),
        None => {
            let id = new_session_id();
            let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
                .path("/")
                .http_only(true);
            (id, jar.add(cookie))
        }
    };

    let session = id.clone();
    let record = state
        .run(move |pipeline| pipeline.process_session(&session, form.dataset, &form.fields))
        .await?;
    tracing::info!(session = %id, file = %record.original_name, "Session result stored");

    Ok((jar, Json(json!({ "success": true }))))
}

/// `GET /api/results`
pub async fn results(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<ResultsResponse>, ApiError> {
    let id = session_id(&jar).ok_or_else(no_results)?;
    let record = state.pipeline.session_result(&id)?;

    let filename = record
        .result_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Json(ResultsResponse {
        sampling_input: record.request.sampling_input.clone(),
        parameters: record.request,
        engine_log: record.diagnostics,
        filename,
        created_at: record.created_at,
    }))
}

/// `GET /download_zip`
pub async fn download_zip(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let id = session_id(&jar).ok_or_else(no_results)?;
    let archive = state
        .run(move |pipeline| pipeline.session_archive(&id))
        .await
        .map_err(|e| match e {
            ApiError::Pipeline(ref err) if matches!(err.root(), PipelineError::NotFound { .. }) => {
                ApiError::NotFound("Processed file not found".to_string())
            }
            other => other,
        })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, attachment(ARCHIVE_DOWNLOAD_NAME)),
        ],
        archive,
    ))
}
