//! Engine invocation.
//!
//! Translates a [`PreprocessingRequest`] into the engine's positional
//! contract and calls the engine exactly once. The optional
//! `strategy_sample` argument is passed only when a real strategy was
//! requested: engines raise on an unrecognized placeholder strategy, so
//! "no sampling" must omit it rather than send `none`.

use std::path::Path;

use crate::engine::{EngineCall, EngineOutput, EngineSamplingFormat, PreprocessingEngine};
use crate::error::{PipelineError, Result};
use crate::events::{EventSink, PipelineEvent};
use crate::params::PreprocessingRequest;

/// Build the engine call for a staged upload.
pub fn build_call(
    staged_path: &Path,
    request: &PreprocessingRequest,
    format: EngineSamplingFormat,
) -> EngineCall {
    let strategy_sample = if request.sampling.is_none() {
        None
    } else {
        Some(request.sampling.label().to_string())
    };

    EngineCall {
        file_path: staged_path.to_path_buf(),
        target_column: request.target_column.clone(),
        dropped_columns: request.dropped_columns.clone(),
        untouched_columns: request.untouched_columns.clone(),
        type_dataset: request.dataset_kind.code(),
        sampling: format.encode(request.sampling),
        classification: request.objective.code(),
        strategy_sample,
    }
}

/// Run the engine once, converting a failure into [`PipelineError::Engine`].
pub fn invoke(
    engine: &dyn PreprocessingEngine,
    call: &EngineCall,
    sink: &dyn EventSink,
) -> Result<EngineOutput> {
    sink.emit(&PipelineEvent::EngineInvoked {
        engine: engine.name().to_string(),
        file_path: call.file_path.clone(),
        strategy_passed: call.strategy_sample.is_some(),
    });

    match engine.run(call) {
        Ok(output) => {
            sink.emit(&PipelineEvent::EngineFinished {
                rows: output.frame.height(),
                columns: output.frame.width(),
            });
            Ok(output)
        }
        Err(failure) => {
            sink.emit(&PipelineEvent::EngineFailed {
                message: failure.message.clone(),
            });
            Err(PipelineError::Engine {
                message: failure.message,
                diagnostics: failure.diagnostics,
            })
        }
    }
}
