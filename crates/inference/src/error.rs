use std::path::PathBuf;

use data_contracts::{ContractError, ErrorRecord};
use models::TargetLayer;
use thiserror::Error;
use vision_core::VisionError;

/// Failures while invoking or loading a classifier.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("checkpoint {} not found", path.display())]
    MissingCheckpoint { path: PathBuf },
    #[error("failed to load checkpoint {}: {message}", path.display())]
    Load { path: PathBuf, message: String },
    #[error("failed to save checkpoint {}: {message}", path.display())]
    Save { path: PathBuf, message: String },
    #[error("model `{model}` lock poisoned")]
    Poisoned { model: String },
    #[error("model `{model}` failed: {message}")]
    Model { model: String, message: String },
    #[error("model `{model}` produced invalid scores: {source}")]
    Scores {
        model: String,
        #[source]
        source: ContractError,
    },
}

/// Failures while producing a class-activation overlay.
#[derive(Debug, Error)]
pub enum ExplanationError {
    #[error("target layer {layer:?} does not exist (model has {feature_count} feature blocks)")]
    TargetLayer {
        layer: TargetLayer,
        feature_count: usize,
    },
    #[error("class index {index} out of range for {classes} classes")]
    ClassIndex { index: usize, classes: usize },
    #[error("gradient capture failed: {0}")]
    Gradient(String),
    #[error("activation map is inconsistent: {0}")]
    Map(#[source] VisionError),
    #[error("overlay rendering failed: {0}")]
    Render(#[source] VisionError),
    #[error("model `{model}` is unavailable: {message}")]
    Model { model: String, message: String },
}

/// Failures while persisting or resolving overlays.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("overlay io at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("overlay encode failed: {0}")]
    Encode(#[from] VisionError),
    #[error("invalid overlay name `{0}`")]
    InvalidName(String),
    #[error("overlay `{0}` not found")]
    NotFound(String),
}

/// Any failure of a screening request, tagged with a stable `kind()`.
#[derive(Debug, Error)]
pub enum ScreeningError {
    #[error(transparent)]
    Normalize(#[from] VisionError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Explanation(#[from] ExplanationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScreeningError {
    /// Machine-readable error kind used in batch JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            ScreeningError::Normalize(VisionError::UnsupportedFormat(_)) => "unsupported_format",
            ScreeningError::Normalize(_) => "decode",
            ScreeningError::Inference(_) => "inference",
            ScreeningError::Contract(ContractError::InvalidLabel(_)) => "invalid_label",
            ScreeningError::Contract(ContractError::MissingField(_)) => "missing_field",
            ScreeningError::Contract(_) => "inference",
            ScreeningError::Explanation(_) => "explanation",
            ScreeningError::Storage(_) => "storage",
            ScreeningError::Read { .. } => "read",
        }
    }

    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}
