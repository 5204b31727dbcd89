//! Shared data contracts for screening results: label sets, classifier outcomes,
//! referral tiers, result artifacts and their wire records.

pub mod error;
pub mod labels;
pub mod report;
pub mod screening;

pub use error::ContractError;
pub use labels::{ClassLabel, Stage1Label, Stage2Label};
pub use report::{
    BatchFailure, BatchRecord, BatchResponse, BatchSummary, ErrorRecord, ScreeningRecord,
};
pub use screening::{
    softmax, stable_argmax, validate_distribution, CascadeResult, ClassifierOutcome,
    OverlayRef, ProbabilityMap, ReferralTier, ResultArtifact, ResultArtifactBuilder,
    DISTRIBUTION_TOLERANCE,
};
