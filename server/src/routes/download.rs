use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use tokio_util::io::ReaderStream;
use weedout_pipeline::PipelineError;

use super::attachment;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /download/:filename`: stream a processed artifact as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state
        .run(move |pipeline| pipeline.resolve_download(&filename))
        .await?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| PipelineError::storage(format!("Failed to open {}", path.display()), e))?;
    let resolved = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, attachment(&resolved)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}
