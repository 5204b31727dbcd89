use thiserror::Error;

/// Violations of the screening data contracts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("label `{0}` is not part of the label set")]
    InvalidLabel(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("expected {expected} class scores, got {actual}")]
    LabelCount { expected: usize, actual: usize },
    #[error("class scores contain non-finite values")]
    NonFinite,
    #[error("probability {value} at index {index} outside [0, 1]")]
    ProbabilityRange { index: usize, value: f32 },
    #[error("probabilities sum to {sum}, expected 1")]
    Distribution { sum: f32 },
    #[error("cascade gating violated: {0}")]
    Gating(&'static str),
}
