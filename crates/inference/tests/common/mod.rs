#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};
use inference::{
    Cascade, Classifier, DirOverlayStore, ExplanationError, InferenceError, ScreeningPipeline,
    TriageConfig,
};
use models::TargetLayer;
use vision_core::encode::encode_png;
use vision_core::interfaces::{ActivationMap, NormalizedImage};
use vision_core::NormalizeConfig;

/// Classifier returning fixed logits and recording every call.
pub struct MockClassifier {
    id: String,
    logits: Vec<f32>,
    pub logit_calls: AtomicUsize,
    pub explained: Mutex<Vec<(TargetLayer, usize)>>,
}

impl MockClassifier {
    pub fn new(id: &str, logits: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            logits,
            logit_calls: AtomicUsize::new(0),
            explained: Mutex::new(Vec::new()),
        })
    }

    /// Logits whose softmax is exactly `probabilities`.
    pub fn with_probabilities(id: &str, probabilities: &[f32]) -> Arc<Self> {
        Self::new(id, probabilities.iter().map(|p| p.ln()).collect())
    }

    pub fn calls(&self) -> usize {
        self.logit_calls.load(Ordering::SeqCst)
    }

    pub fn explanations(&self) -> Vec<(TargetLayer, usize)> {
        self.explained.lock().unwrap().clone()
    }
}

impl Classifier for MockClassifier {
    fn id(&self) -> &str {
        &self.id
    }

    fn class_count(&self) -> usize {
        self.logits.len()
    }

    fn target_layer(&self) -> TargetLayer {
        TargetLayer::Last
    }

    fn logits(&self, _image: &NormalizedImage) -> Result<Vec<f32>, InferenceError> {
        self.logit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.logits.clone())
    }

    fn activation_map(
        &self,
        _image: &NormalizedImage,
        layer: TargetLayer,
        class_index: usize,
    ) -> Result<ActivationMap, ExplanationError> {
        self.explained.lock().unwrap().push((layer, class_index));
        let values = (0..16).map(|i| i as f32).collect();
        ActivationMap::new(values, 4, 4).map_err(ExplanationError::Map)
    }
}

pub const NORMAL: [f32; 3] = [0.95, 0.025, 0.025];
pub const ABNORMAL: [f32; 3] = [0.1, 0.8, 0.1];
pub const EARWAX: [f32; 3] = [0.2, 0.3, 0.5];
pub const COM: [f32; 2] = [0.3, 0.7];

pub fn cascade(stage1: &Arc<MockClassifier>, stage2: &Arc<MockClassifier>) -> Cascade {
    let s1: Arc<dyn Classifier> = stage1.clone();
    let s2: Arc<dyn Classifier> = stage2.clone();
    Cascade::new(s1, s2).unwrap()
}

pub fn small_normalize() -> NormalizeConfig {
    NormalizeConfig {
        width: 16,
        height: 16,
        ..Default::default()
    }
}

pub fn pipeline(cascade: Cascade, overlay_dir: &std::path::Path, workers: usize) -> ScreeningPipeline {
    let store = DirOverlayStore::new(overlay_dir, "/outputs").unwrap();
    ScreeningPipeline::new(cascade, TriageConfig::default(), small_normalize(), Arc::new(store))
        .with_workers(workers)
}

/// Reddish otoscope-like frame: bright center, dark rim.
pub fn ear_png(seed: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(40, 30, |x, y| {
        let dx = x as i32 - 20;
        let dy = y as i32 - 15;
        let d = ((dx * dx + dy * dy) as f32).sqrt();
        let v = (255.0 - d * 10.0).max(0.0) as u8;
        Rgb([v, (v / 2).wrapping_add(seed), v / 3])
    });
    encode_png(&img).unwrap()
}
