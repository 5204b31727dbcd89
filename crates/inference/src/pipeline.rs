//! Single-image screening and order-preserving batch orchestration.

use std::sync::Arc;
use std::time::Instant;

use data_contracts::{
    BatchFailure, BatchRecord, BatchResponse, CascadeResult, OverlayRef, ResultArtifact,
    ScreeningRecord,
};
use rayon::prelude::*;
use tracing::{info, warn};
use vision_core::encode::{encode_png, encode_png_base64};
use vision_core::interfaces::{ExplanationOverlay, SourceImage};
use vision_core::{normalize, NormalizeConfig};

use crate::cascade::Cascade;
use crate::config::PipelineConfig;
use crate::error::{ExplanationError, ScreeningError, StorageError};
use crate::explain::explain_decision;
use crate::factory::ClassifierFactory;
use crate::storage::{DirOverlayStore, OverlayStore};
use crate::triage::{triage, TriageConfig};

/// One batch input: caller-supplied id (usually the filename) and raw bytes.
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub id: String,
    pub bytes: Vec<u8>,
}

impl BatchInput {
    pub fn new(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            bytes,
        }
    }
}

/// Outcome of one batch slot, in input order.
#[derive(Debug)]
pub struct BatchItem {
    pub id: String,
    pub result: Result<ResultArtifact, ScreeningError>,
}

impl BatchItem {
    pub fn to_record(&self) -> BatchRecord {
        match &self.result {
            Ok(artifact) => BatchRecord::Screened(ScreeningRecord::batch(artifact)),
            Err(err) => BatchRecord::Failed(BatchFailure {
                filename: self.id.clone(),
                error: err.to_record(),
            }),
        }
    }
}

struct Analysis {
    cascade: CascadeResult,
    overlay: ExplanationOverlay,
    source: SourceImage,
}

pub struct ScreeningPipeline {
    cascade: Cascade,
    triage: TriageConfig,
    normalize: NormalizeConfig,
    store: Arc<dyn OverlayStore>,
    workers: usize,
}

impl ScreeningPipeline {
    pub fn new(
        cascade: Cascade,
        triage: TriageConfig,
        normalize: NormalizeConfig,
        store: Arc<dyn OverlayStore>,
    ) -> Self {
        Self {
            cascade,
            triage,
            normalize,
            store,
            workers: 1,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Load both models and the overlay directory from a validated config.
    pub fn from_config(
        cfg: &PipelineConfig,
        factory: &ClassifierFactory,
    ) -> Result<Self, ScreeningError> {
        let cascade = factory.load_cascade(&cfg.stage1, &cfg.stage2)?;
        let store = DirOverlayStore::new(&cfg.overlay_dir, cfg.overlay_url_prefix.clone())?;
        Ok(Self::new(cascade, cfg.triage(), cfg.normalize.clone(), Arc::new(store))
            .with_workers(cfg.workers))
    }

    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    pub fn store(&self) -> &dyn OverlayStore {
        self.store.as_ref()
    }

    fn analyze(&self, bytes: &[u8]) -> Result<Analysis, ScreeningError> {
        let normalized = normalize(bytes, &self.normalize)?;
        let cascade = self.cascade.classify(&normalized.tensor)?;
        let decision = self.cascade.decide(&cascade);
        let overlay = explain_decision(decision, &normalized.tensor, &normalized.source)?;
        Ok(Analysis {
            cascade,
            overlay,
            source: normalized.source,
        })
    }

    fn assemble(
        &self,
        id: Option<&str>,
        analysis: Analysis,
        overlay: OverlayRef,
        original: Option<String>,
    ) -> Result<ResultArtifact, ScreeningError> {
        let stage1 = analysis.cascade.stage1();
        let referral = triage(stage1.label(), stage1.confidence(), &self.triage);
        info!(
            id = id.unwrap_or("-"),
            stage1 = %stage1.label(),
            confidence = stage1.confidence(),
            stage2 = ?analysis.cascade.stage2().map(|o| o.label()),
            referral = %referral,
            explained_by = analysis.overlay.model_id(),
            "screened"
        );
        let mut builder = ResultArtifact::builder()
            .referral(referral)
            .overlay(overlay, analysis.overlay.model_id())
            .cascade(analysis.cascade);
        if let Some(id) = id {
            builder = builder.source_id(id);
        }
        if let Some(original) = original {
            builder = builder.original_image(original);
        }
        Ok(builder.build()?)
    }

    /// Screen one image; the overlay is returned inline as base64 PNG.
    pub fn screen(&self, bytes: &[u8], id: Option<&str>) -> Result<ResultArtifact, ScreeningError> {
        let analysis = self.analyze(bytes)?;
        let png_base64 =
            encode_png_base64(analysis.overlay.image()).map_err(ExplanationError::Render)?;
        self.assemble(id, analysis, OverlayRef::Inline { png_base64 }, None)
    }

    /// Screen one image and persist its overlay; the artifact carries the
    /// stored path and URL plus the decoded original as base64 PNG.
    pub fn screen_stored(&self, id: &str, bytes: &[u8]) -> Result<ResultArtifact, ScreeningError> {
        let analysis = self.analyze(bytes)?;
        let png = encode_png(analysis.overlay.image()).map_err(StorageError::Encode)?;
        let stored = self.store.persist(id, &png)?;
        let original = encode_png_base64(analysis.source.rgb()).map_err(StorageError::Encode)?;
        self.assemble(Some(id), analysis, stored.into(), Some(original))
    }

    /// Screen every input; one failing item never affects the others.
    /// The returned items are in input order.
    pub fn process_batch(&self, inputs: &[BatchInput]) -> Vec<BatchItem> {
        let started = Instant::now();
        info!(items = inputs.len(), workers = self.workers, "batch started");
        let run = |input: &BatchInput| BatchItem {
            id: input.id.clone(),
            result: self.screen_stored(&input.id, &input.bytes),
        };

        let items: Vec<BatchItem> = if self.workers <= 1 || inputs.len() <= 1 {
            inputs.iter().map(run).collect()
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
            {
                Ok(pool) => {
                    let mut indexed: Vec<(usize, BatchItem)> = pool.install(|| {
                        inputs
                            .par_iter()
                            .enumerate()
                            .map(|(i, input)| (i, run(input)))
                            .collect()
                    });
                    indexed.sort_by_key(|(i, _)| *i);
                    indexed.into_iter().map(|(_, item)| item).collect()
                }
                Err(err) => {
                    warn!(error = %err, "worker pool unavailable; processing sequentially");
                    inputs.iter().map(run).collect()
                }
            }
        };

        let failed = items.iter().filter(|item| item.result.is_err()).count();
        for item in &items {
            if let Err(err) = &item.result {
                warn!(id = %item.id, kind = err.kind(), error = %err, "batch item failed");
            }
        }
        info!(
            items = items.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch finished"
        );
        items
    }

    pub fn batch_response(items: &[BatchItem]) -> BatchResponse {
        BatchResponse::new(items.iter().map(BatchItem::to_record).collect())
    }
}
