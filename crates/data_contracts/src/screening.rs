use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;

use crate::labels::{ClassLabel, Stage1Label, Stage2Label};
use crate::ContractError;

/// Allowed drift of a probability distribution's sum from 1.
pub const DISTRIBUTION_TOLERANCE: f32 = 1e-4;

/// Numerically stable softmax (max-subtracted).
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Index of the maximum value; on exact ties the earliest index wins.
pub fn stable_argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Check that `probabilities` is a distribution: entries in [0, 1], sum 1 within tolerance.
pub fn validate_distribution(probabilities: &[f32]) -> Result<(), ContractError> {
    for (index, &value) in probabilities.iter().enumerate() {
        if !value.is_finite() {
            return Err(ContractError::NonFinite);
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ContractError::ProbabilityRange { index, value });
        }
    }
    let sum: f32 = probabilities.iter().sum();
    if (sum - 1.0).abs() > DISTRIBUTION_TOLERANCE {
        return Err(ContractError::Distribution { sum });
    }
    Ok(())
}

/// Result of one classifier invocation over a closed label set.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOutcome<L: ClassLabel> {
    label: L,
    confidence: f32,
    probabilities: Vec<f32>,
}

impl<L: ClassLabel> ClassifierOutcome<L> {
    /// Softmax raw logits and take the stable argmax.
    pub fn from_logits(logits: &[f32]) -> Result<Self, ContractError> {
        if logits.len() != L::ALL.len() {
            return Err(ContractError::LabelCount {
                expected: L::ALL.len(),
                actual: logits.len(),
            });
        }
        if logits.iter().any(|v| !v.is_finite()) {
            return Err(ContractError::NonFinite);
        }
        Self::from_probabilities(softmax(logits))
    }

    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self, ContractError> {
        if probabilities.len() != L::ALL.len() {
            return Err(ContractError::LabelCount {
                expected: L::ALL.len(),
                actual: probabilities.len(),
            });
        }
        validate_distribution(&probabilities)?;
        let index = stable_argmax(&probabilities).ok_or(ContractError::LabelCount {
            expected: L::ALL.len(),
            actual: 0,
        })?;
        let label = L::from_index(index).ok_or(ContractError::LabelCount {
            expected: L::ALL.len(),
            actual: probabilities.len(),
        })?;
        Ok(Self {
            label,
            confidence: probabilities[index],
            probabilities,
        })
    }

    pub fn label(&self) -> L {
        self.label
    }

    /// Probability of the predicted label.
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Probabilities in label enumeration order.
    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }

    pub fn probability(&self, label: L) -> f32 {
        self.probabilities[label.index()]
    }

    pub fn probability_map(&self) -> ProbabilityMap<L> {
        ProbabilityMap::new(self.probabilities.clone())
    }
}

/// `{label: probability}` in enumeration order on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap<L: ClassLabel> {
    values: Vec<f32>,
    _labels: PhantomData<L>,
}

impl<L: ClassLabel> ProbabilityMap<L> {
    fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            _labels: PhantomData,
        }
    }

    pub fn get(&self, label: L) -> Option<f32> {
        self.values.get(label.index()).copied()
    }
}

impl<L: ClassLabel> Serialize for ProbabilityMap<L> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (label, value) in L::ALL.iter().zip(&self.values) {
            map.serialize_entry(label.as_str(), value)?;
        }
        map.end()
    }
}

/// Stage-1 outcome plus the stage-2 outcome when stage 1 flagged an abnormality.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeResult {
    stage1: ClassifierOutcome<Stage1Label>,
    stage2: Option<ClassifierOutcome<Stage2Label>>,
}

impl CascadeResult {
    /// Enforces the gating invariant: stage 2 is present iff stage 1 is `Abnormal`.
    pub fn new(
        stage1: ClassifierOutcome<Stage1Label>,
        stage2: Option<ClassifierOutcome<Stage2Label>>,
    ) -> Result<Self, ContractError> {
        match (stage1.label(), &stage2) {
            (Stage1Label::Abnormal, None) => Err(ContractError::Gating(
                "abnormal stage 1 result without a stage 2 outcome",
            )),
            (Stage1Label::Normal | Stage1Label::Earwax, Some(_)) => Err(ContractError::Gating(
                "stage 2 outcome for a non-abnormal stage 1 result",
            )),
            _ => Ok(Self { stage1, stage2 }),
        }
    }

    pub fn stage1(&self) -> &ClassifierOutcome<Stage1Label> {
        &self.stage1
    }

    pub fn stage2(&self) -> Option<&ClassifierOutcome<Stage2Label>> {
        self.stage2.as_ref()
    }
}

/// Clinical urgency derived from the stage-1 outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferralTier {
    Urgent,
    Routine,
    #[serde(rename = "No Referral")]
    NoReferral,
}

impl ReferralTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralTier::Urgent => "Urgent",
            ReferralTier::Routine => "Routine",
            ReferralTier::NoReferral => "No Referral",
        }
    }
}

impl fmt::Display for ReferralTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the explanation overlay lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayRef {
    /// Base64-encoded PNG carried in the result itself.
    Inline { png_base64: String },
    /// Persisted PNG plus the URL it is served from.
    Stored { path: PathBuf, url: String },
}

/// Everything produced for one screened image. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultArtifact {
    source_id: Option<String>,
    cascade: CascadeResult,
    referral: ReferralTier,
    overlay: OverlayRef,
    explained_by: String,
    original_image: Option<String>,
}

impl ResultArtifact {
    pub fn builder() -> ResultArtifactBuilder {
        ResultArtifactBuilder::default()
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn cascade(&self) -> &CascadeResult {
        &self.cascade
    }

    pub fn referral(&self) -> ReferralTier {
        self.referral
    }

    pub fn overlay(&self) -> &OverlayRef {
        &self.overlay
    }

    /// Identifier of the model whose activations produced the overlay.
    pub fn explained_by(&self) -> &str {
        &self.explained_by
    }

    /// Base64 PNG of the decoded input, when echoed back.
    pub fn original_image(&self) -> Option<&str> {
        self.original_image.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct ResultArtifactBuilder {
    source_id: Option<String>,
    cascade: Option<CascadeResult>,
    referral: Option<ReferralTier>,
    overlay: Option<OverlayRef>,
    explained_by: Option<String>,
    original_image: Option<String>,
}

impl ResultArtifactBuilder {
    pub fn source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    pub fn cascade(mut self, cascade: CascadeResult) -> Self {
        self.cascade = Some(cascade);
        self
    }

    pub fn referral(mut self, referral: ReferralTier) -> Self {
        self.referral = Some(referral);
        self
    }

    pub fn overlay(mut self, overlay: OverlayRef, explained_by: impl Into<String>) -> Self {
        self.overlay = Some(overlay);
        self.explained_by = Some(explained_by.into());
        self
    }

    pub fn original_image(mut self, png_base64: impl Into<String>) -> Self {
        self.original_image = Some(png_base64.into());
        self
    }

    pub fn build(self) -> Result<ResultArtifact, ContractError> {
        Ok(ResultArtifact {
            source_id: self.source_id,
            cascade: self.cascade.ok_or(ContractError::MissingField("cascade"))?,
            referral: self.referral.ok_or(ContractError::MissingField("referral"))?,
            overlay: self.overlay.ok_or(ContractError::MissingField("overlay"))?,
            explained_by: self
                .explained_by
                .ok_or(ContractError::MissingField("explained_by"))?,
            original_image: self.original_image,
        })
    }
}
