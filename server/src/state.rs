use std::sync::Arc;

use weedout_pipeline::{Pipeline, PipelineError};

/// Shared handler state. One pipeline serves every request.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Run a blocking pipeline call off the async runtime.
    pub async fn run<T, F>(&self, job: F) -> Result<T, crate::error::ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Pipeline) -> weedout_pipeline::Result<T> + Send + 'static,
    {
        let pipeline = self.pipeline.clone();
        let result = tokio::task::spawn_blocking(move || job(&pipeline))
            .await
            .map_err(|e| PipelineError::Internal(format!("Worker task failed: {}", e)))?;
        Ok(result?)
    }
}
