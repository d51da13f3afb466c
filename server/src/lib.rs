//! HTTP front end for the WeedOut preprocessing pipeline.
//!
//! The router exposes the direct flow (`/process`, `/download/:filename`),
//! the session flow (`/api/preprocess`, `/api/results`, `/download_zip`)
//! and two diagnostics endpoints (`/`, `/check-files`). All pipeline work
//! runs on blocking threads.

pub mod error;
pub mod form;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
