//! Request parameter normalization.
//!
//! Uploads arrive with loosely-typed form fields whose names and encodings
//! changed several times over the life of the service: column lists are sent
//! either as a JSON array or as a comma-separated string, and the sampling
//! strategy is sent either as an integer code or as a free-text label.
//!
//! [`normalize`] maps any of those shapes onto one strict
//! [`PreprocessingRequest`]. Missing fields take defaults; fields that are
//! present but unreadable are a [`PipelineError::Validation`].
//!
//! # Sampling encodings
//!
//! | Code | Labels                          | Strategy                      |
//! |------|---------------------------------|-------------------------------|
//! | 0    | `none`, `no sampling`           | [`SamplingStrategy::None`]    |
//! | 1    | `undersampling`                 | [`SamplingStrategy::Undersampling`] |
//! | 2    | `oversampling`                  | [`SamplingStrategy::Oversampling`]  |
//! | 3    | `smote`                         | [`SamplingStrategy::Smote`]   |
//!
//! A non-blank label field (`sampling_strategy` and its aliases) takes
//! precedence over the `sampling` field. The representation that was
//! actually used is kept in [`SamplingInput`] for echoing back to the client.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// =============================================================================
// Field aliases
// =============================================================================

const TARGET_FIELDS: &[&str] = &["target_column", "targetColumn", "target"];
const DROPPED_FIELDS: &[&str] = &[
    "drop_columns",
    "dropped_columns",
    "dropColumns",
    "droppedColumns",
];
const UNTOUCHED_FIELDS: &[&str] = &["untouched_columns", "untouchedColumns"];
const DATASET_KIND_FIELDS: &[&str] = &["dataset_type", "datasetType", "type_dataset"];
const OBJECTIVE_FIELDS: &[&str] = &["model_type", "modelType", "classification"];
const SAMPLING_LABEL_FIELDS: &[&str] = &["sampling_strategy", "samplingStrategy", "strategy_sample"];
const SAMPLING_FIELDS: &[&str] = &["sampling"];

// =============================================================================
// Enums
// =============================================================================

/// Shape of the uploaded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    #[default]
    CrossSectional,
    TimeSeries,
}

impl DatasetKind {
    /// Integer code expected by the engine (`type_dataset`).
    pub fn code(self) -> u8 {
        match self {
            Self::CrossSectional => 0,
            Self::TimeSeries => 1,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "0" | "cross-sectional" | "cross_sectional" | "crosssectional" | "cross sectional" => {
                Some(Self::CrossSectional)
            }
            "1" | "time-series" | "time_series" | "timeseries" | "time series" => {
                Some(Self::TimeSeries)
            }
            _ => None,
        }
    }
}

/// What the downstream model will predict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelObjective {
    Regression,
    #[default]
    Classification,
}

impl ModelObjective {
    /// Integer code expected by the engine (`classification`).
    pub fn code(self) -> u8 {
        match self {
            Self::Regression => 0,
            Self::Classification => 1,
        }
    }

    /// Parse a configuration or form value.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "0" | "regression" => Some(Self::Regression),
            "1" | "classification" => Some(Self::Classification),
            _ => None,
        }
    }
}

/// Class-imbalance resampling technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    #[default]
    None,
    Undersampling,
    Oversampling,
    Smote,
}

impl SamplingStrategy {
    /// Resolve an integer code (0-3).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Undersampling),
            2 => Some(Self::Oversampling),
            3 => Some(Self::Smote),
            _ => None,
        }
    }

    /// Resolve a free-text label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "none" | "no sampling" | "no_sampling" => Some(Self::None),
            "undersampling" => Some(Self::Undersampling),
            "oversampling" => Some(Self::Oversampling),
            "smote" => Some(Self::Smote),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Undersampling => 1,
            Self::Oversampling => 2,
            Self::Smote => 3,
        }
    }

    /// Canonical label, as the engine spells it.
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Undersampling => "undersampling",
            Self::Oversampling => "oversampling",
            Self::Smote => "smote",
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The sampling value exactly as the client sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SamplingInput {
    /// Integer code from the `sampling` field.
    Code(i64),
    /// Free-text label from a label field (or a non-numeric `sampling`).
    Label(String),
    /// Nothing was sent; the default applied.
    Default,
}

// =============================================================================
// Raw form
// =============================================================================

/// Text form fields of an upload request, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawForm {
    fields: BTreeMap<String, String>,
}

impl RawForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field. A repeated field keeps its last value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// First non-blank value among `aliases`, with the alias that matched.
    fn first_of(&self, aliases: &[&'static str]) -> Option<(&'static str, &str)> {
        aliases.iter().find_map(|alias| {
            self.get(alias)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (*alias, value))
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawForm {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut form = RawForm::new();
        for (k, v) in iter {
            form.insert(k, v);
        }
        form
    }
}

// =============================================================================
// Normalized request
// =============================================================================

/// Strict parameter bundle handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessingRequest {
    /// Target column; empty means "none selected".
    pub target_column: String,
    /// Columns to drop, in the order given. Duplicates are kept.
    pub dropped_columns: Vec<String>,
    /// Columns to leave unscaled and unencoded, in the order given.
    pub untouched_columns: Vec<String>,
    pub dataset_kind: DatasetKind,
    pub objective: ModelObjective,
    pub sampling: SamplingStrategy,
    /// Original representation of `sampling`.
    pub sampling_input: SamplingInput,
}

impl PreprocessingRequest {
    /// Request with every field at its default.
    pub fn defaults(objective: ModelObjective) -> Self {
        Self {
            target_column: String::new(),
            dropped_columns: Vec::new(),
            untouched_columns: Vec::new(),
            dataset_kind: DatasetKind::default(),
            objective,
            sampling: SamplingStrategy::None,
            sampling_input: SamplingInput::Default,
        }
    }
}

/// Map a raw form onto a [`PreprocessingRequest`].
///
/// `default_objective` applies when no objective field is present.
pub fn normalize(form: &RawForm, default_objective: ModelObjective) -> Result<PreprocessingRequest> {
    let mut request = PreprocessingRequest::defaults(default_objective);

    if let Some((_, target)) = form.first_of(TARGET_FIELDS) {
        request.target_column = target.trim().to_string();
    }

    if let Some((field, raw)) = form.first_of(DROPPED_FIELDS) {
        request.dropped_columns = parse_column_list(field, raw)?;
    }

    if let Some((field, raw)) = form.first_of(UNTOUCHED_FIELDS) {
        request.untouched_columns = parse_column_list(field, raw)?;
    }

    if let Some((field, raw)) = form.first_of(DATASET_KIND_FIELDS) {
        request.dataset_kind = DatasetKind::parse(raw).ok_or_else(|| {
            PipelineError::validation(format!("Invalid value for '{}': {}", field, raw))
        })?;
    }

    if let Some((field, raw)) = form.first_of(OBJECTIVE_FIELDS) {
        request.objective = ModelObjective::parse(raw).ok_or_else(|| {
            PipelineError::validation(format!("Invalid value for '{}': {}", field, raw))
        })?;
    }

    let (sampling, input) = parse_sampling(form)?;
    request.sampling = sampling;
    request.sampling_input = input;

    Ok(request)
}

fn parse_sampling(form: &RawForm) -> Result<(SamplingStrategy, SamplingInput)> {
    if let Some((field, raw)) = form.first_of(SAMPLING_LABEL_FIELDS) {
        let strategy = SamplingStrategy::from_label(raw).ok_or_else(|| {
            PipelineError::validation(format!("Unknown sampling strategy in '{}': {}", field, raw))
        })?;
        return Ok((strategy, SamplingInput::Label(raw.trim().to_string())));
    }

    let Some((field, raw)) = form.first_of(SAMPLING_FIELDS) else {
        return Ok((SamplingStrategy::None, SamplingInput::Default));
    };

    let trimmed = raw.trim();
    if let Ok(code) = trimmed.parse::<i64>() {
        let strategy = SamplingStrategy::from_code(code).ok_or_else(|| {
            PipelineError::validation(format!(
                "Invalid sampling code in '{}': {} (expected 0-3)",
                field, code
            ))
        })?;
        return Ok((strategy, SamplingInput::Code(code)));
    }

    let strategy = SamplingStrategy::from_label(trimmed).ok_or_else(|| {
        PipelineError::validation(format!("Unknown sampling strategy in '{}': {}", field, raw))
    })?;
    Ok((strategy, SamplingInput::Label(trimmed.to_string())))
}

/// Parse a column list sent either as a JSON array or comma-separated text.
///
/// Entries are trimmed and empty entries dropped; order and duplicates are
/// preserved.
pub fn parse_column_list(field: &str, raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();

    let entries: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<String>>(trimmed).map_err(|e| {
            PipelineError::validation(format!("Invalid column list in '{}': {}", field, e))
        })?
    } else {
        trimmed.split(',').map(str::to_string).collect()
    };

    Ok(entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect())
}
