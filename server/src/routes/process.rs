use axum::Json;
use axum::extract::{Multipart, State};
use serde::Serialize;
use weedout_pipeline::PreprocessingRequest;

use crate::error::ApiError;
use crate::form::read_upload;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub message: &'static str,
    pub filename: String,
    pub downsample_warning: bool,
    pub options_used: PreprocessingRequest,
    pub engine_log: String,
}

/// `POST /process`: run the direct flow for one upload.
pub async fn process(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, ApiError> {
    let form = read_upload(multipart).await?;
    let outcome = state
        .run(move |pipeline| pipeline.process_upload(form.dataset, &form.fields))
        .await?;

    tracing::info!(
        file = %outcome.artifact.file_name,
        rows = outcome.artifact.rows,
        downsampled = outcome.downsample_warning,
        "Upload processed"
    );

    Ok(Json(ProcessResponse {
        message: "File processed successfully",
        filename: outcome.artifact.file_name,
        downsample_warning: outcome.downsample_warning,
        options_used: outcome.options_used,
        engine_log: outcome.engine_log,
    }))
}
