//! Referral rule over stage-1 outcomes.

use data_contracts::{ClassLabel, ContractError, ReferralTier, Stage1Label};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Normal/Earwax predictions below this confidence are referred routinely.
    pub confidence_threshold: f32,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl TriageConfig {
    pub fn new(confidence_threshold: f32) -> Result<Self, ConfigError> {
        let cfg = Self {
            confidence_threshold,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.confidence_threshold;
        if t.is_finite() && (0.0..=1.0).contains(&t) {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {t}"
            )))
        }
    }
}

/// Abnormal is always urgent; otherwise the threshold (inclusive) separates
/// routine from no referral. A NaN confidence never clears the threshold.
pub fn triage(label: Stage1Label, confidence: f32, cfg: &TriageConfig) -> ReferralTier {
    match label {
        Stage1Label::Abnormal => ReferralTier::Urgent,
        Stage1Label::Normal | Stage1Label::Earwax => {
            if confidence >= cfg.confidence_threshold {
                ReferralTier::NoReferral
            } else {
                ReferralTier::Routine
            }
        }
    }
}

/// String entry point; anything outside the stage-1 label set is rejected.
pub fn triage_label(
    label: &str,
    confidence: f32,
    cfg: &TriageConfig,
) -> Result<ReferralTier, ContractError> {
    Ok(triage(Stage1Label::parse(label)?, confidence, cfg))
}
