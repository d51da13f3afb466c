//! The preprocessing engine seam.
//!
//! Feature engineering, encoding and resampling are owned by an external
//! engine with a fixed call contract:
//!
//! ```text
//! preprocess_pipeline(file_path, target_column, dropped_columns,
//!                     untouched_columns, type_dataset, sampling,
//!                     classification[, strategy_sample])
//! ```
//!
//! [`EngineCall`] mirrors that argument list in order. The engine returns an
//! [`EngineOutput`] pairing the transformed table with whatever diagnostic
//! text it produced, so nothing has to intercept a global output stream.
//!
//! [`CommandEngine`] is the production adapter (a subprocess speaking JSON on
//! stdin); tests substitute their own [`PreprocessingEngine`].

mod command;

pub use command::CommandEngine;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::params::SamplingStrategy;

/// How the positional `sampling` argument is encoded.
///
/// Engine releases disagree: the documented contract takes a 0/1 flag,
/// others take the 0-3 strategy code or the label directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineSamplingFormat {
    /// 0 = no sampling, 1 = sampling.
    #[default]
    Flag,
    /// Strategy code 0-3.
    Code,
    /// Strategy label (`none`, `smote`, ...).
    Label,
}

impl EngineSamplingFormat {
    pub fn encode(self, strategy: SamplingStrategy) -> SamplingArg {
        match self {
            Self::Flag => SamplingArg::Number(u8::from(!strategy.is_none())),
            Self::Code => SamplingArg::Number(strategy.code()),
            Self::Label => SamplingArg::Text(strategy.label().to_string()),
        }
    }
}

impl fmt::Display for EngineSamplingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flag => "flag",
            Self::Code => "code",
            Self::Label => "label",
        })
    }
}

impl FromStr for EngineSamplingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flag" => Ok(Self::Flag),
            "code" => Ok(Self::Code),
            "label" => Ok(Self::Label),
            other => Err(format!(
                "unknown sampling format '{}' (expected flag, code or label)",
                other
            )),
        }
    }
}

/// Encoded `sampling` argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SamplingArg {
    Number(u8),
    Text(String),
}

/// One engine invocation, arguments in contract order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCall {
    pub file_path: PathBuf,
    pub target_column: String,
    pub dropped_columns: Vec<String>,
    pub untouched_columns: Vec<String>,
    /// 0 = cross-sectional, 1 = time series.
    pub type_dataset: u8,
    pub sampling: SamplingArg,
    /// 0 = regression, 1 = classification.
    pub classification: u8,
    /// Present only when a real strategy was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_sample: Option<String>,
}

/// Successful engine result.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub frame: DataFrame,
    /// Text the engine emitted while running, kept verbatim.
    pub diagnostics: String,
}

/// Engine rejection or crash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineFailure {
    pub message: String,
    pub diagnostics: String,
}

impl EngineFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            diagnostics: String::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = diagnostics.into();
        self
    }
}

/// A black-box preprocessing engine.
pub trait PreprocessingEngine: Send + Sync {
    /// Name used in events and logs.
    fn name(&self) -> &str;

    /// Run the engine once.
    fn run(&self, call: &EngineCall) -> Result<EngineOutput, EngineFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sampling_formats() {
        let flag = EngineSamplingFormat::Flag;
        assert_eq!(flag.encode(SamplingStrategy::None), SamplingArg::Number(0));
        assert_eq!(flag.encode(SamplingStrategy::Smote), SamplingArg::Number(1));
        assert_eq!(
            EngineSamplingFormat::Code.encode(SamplingStrategy::Oversampling),
            SamplingArg::Number(2)
        );
        assert_eq!(
            EngineSamplingFormat::Label.encode(SamplingStrategy::None),
            SamplingArg::Text("none".to_string())
        );
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("Code".parse::<EngineSamplingFormat>(), Ok(EngineSamplingFormat::Code));
        assert!("bits".parse::<EngineSamplingFormat>().is_err());
    }

    #[test]
    fn test_call_omits_absent_strategy() {
        let call = EngineCall {
            file_path: PathBuf::from("temp/a.csv"),
            target_column: "target".to_string(),
            dropped_columns: vec![],
            untouched_columns: vec![],
            type_dataset: 0,
            sampling: SamplingArg::Number(0),
            classification: 1,
            strategy_sample: None,
        };
        let json = serde_json::to_value(&call).unwrap();
        assert!(json.get("strategy_sample").is_none());
        assert_eq!(json["sampling"], 0);
    }
}
