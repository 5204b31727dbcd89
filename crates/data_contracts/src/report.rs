//! JSON records handed to the serving layer.

use serde::Serialize;

use crate::labels::{Stage1Label, Stage2Label};
use crate::screening::{OverlayRef, ProbabilityMap, ReferralTier, ResultArtifact};

/// One screened image on the wire.
///
/// Single-image responses carry the overlay inline (`gradcam`); batch responses
/// add the echo fields and point at the stored overlay (`gradcam_url`).
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub stage1_prediction: Stage1Label,
    pub stage1_probabilities: ProbabilityMap<Stage1Label>,
    pub referral: ReferralTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage2_prediction: Option<Stage2Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage2_probabilities: Option<ProbabilityMap<Stage2Label>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage2_confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradcam: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradcam_url: Option<String>,
}

impl ScreeningRecord {
    /// Shape returned for a single-image request.
    pub fn single(artifact: &ResultArtifact) -> Self {
        Self::from_artifact(artifact, false)
    }

    /// Shape of one successful batch entry.
    pub fn batch(artifact: &ResultArtifact) -> Self {
        Self::from_artifact(artifact, true)
    }

    fn from_artifact(artifact: &ResultArtifact, batch: bool) -> Self {
        let cascade = artifact.cascade();
        let stage1 = cascade.stage1();
        let stage2 = cascade.stage2();
        let (gradcam, gradcam_url) = match artifact.overlay() {
            OverlayRef::Inline { png_base64 } => (Some(png_base64.clone()), None),
            OverlayRef::Stored { url, .. } => (None, Some(url.clone())),
        };
        Self {
            filename: batch.then(|| artifact.source_id().unwrap_or_default().to_string()),
            stage1_prediction: stage1.label(),
            stage1_probabilities: stage1.probability_map(),
            referral: artifact.referral(),
            confidence: batch.then(|| stage1.confidence()),
            original_image: if batch {
                artifact.original_image().map(str::to_string)
            } else {
                None
            },
            stage2_prediction: stage2.map(|o| o.label()),
            stage2_probabilities: stage2.map(|o| o.probability_map()),
            stage2_confidence: if batch {
                stage2.map(|o| o.confidence())
            } else {
                None
            },
            gradcam,
            gradcam_url,
        }
    }
}

/// Typed error attached to one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Machine-readable kind (`decode`, `unsupported_format`, `inference`, ...).
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub filename: String,
    pub error: ErrorRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchRecord {
    Screened(ScreeningRecord),
    Failed(BatchFailure),
}

/// Aggregate counts over a batch, as used by the batch report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub screened: usize,
    pub failed: usize,
    pub urgent: usize,
    pub routine: usize,
    pub no_referral: usize,
    pub aom: usize,
    pub com: usize,
}

impl BatchSummary {
    pub fn from_records(records: &[BatchRecord]) -> Self {
        let mut summary = BatchSummary {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            let BatchRecord::Screened(rec) = record else {
                summary.failed += 1;
                continue;
            };
            summary.screened += 1;
            match rec.referral {
                ReferralTier::Urgent => summary.urgent += 1,
                ReferralTier::Routine => summary.routine += 1,
                ReferralTier::NoReferral => summary.no_referral += 1,
            }
            match rec.stage2_prediction {
                Some(Stage2Label::Aom) => summary.aom += 1,
                Some(Stage2Label::Com) => summary.com += 1,
                None => {}
            }
        }
        summary
    }
}

/// Batch response body: per-item records in input order plus the summary.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchRecord>,
    pub summary: BatchSummary,
}

impl BatchResponse {
    pub fn new(results: Vec<BatchRecord>) -> Self {
        let summary = BatchSummary::from_records(&results);
        Self { results, summary }
    }
}
