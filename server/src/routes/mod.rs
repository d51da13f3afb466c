//! Route table.

mod download;
mod health;
mod process;
mod session;
mod storage;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.pipeline.config().max_upload_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(health::index))
        .route("/process", post(process::process))
        .route("/download/:filename", get(download::download))
        .route("/check-files", get(storage::check_files))
        .route("/api/preprocess", post(session::preprocess))
        .route("/api/results", get(session::results))
        .route("/download_zip", get(session::download_zip))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `Content-Disposition` value for a download named `file_name`.
///
/// Quotes and backslashes are escaped and control characters dropped, so the
/// value is always a valid quoted-string.
pub(crate) fn attachment(file_name: &str) -> String {
    let mut quoted = String::with_capacity(file_name.len());
    for c in file_name.chars().filter(|c| !c.is_control()) {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    format!("attachment; filename=\"{}\"", quoted)
}
