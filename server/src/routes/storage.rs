use axum::Json;
use axum::extract::State;
use weedout_pipeline::StorageSnapshot;

use crate::state::AppState;

/// Directory listing for debugging deployments.
pub async fn check_files(State(state): State<AppState>) -> Json<StorageSnapshot> {
    Json(state.pipeline.snapshot())
}
