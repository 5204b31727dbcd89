#![recursion_limit = "256"]
//! Screening runtime: classifier cascade, referral triage, Grad-CAM explanations,
//! overlay storage and the single-image/batch pipeline.

pub mod cascade;
pub mod classifier;
pub mod config;
pub mod error;
pub mod explain;
pub mod factory;
pub mod gradcam;
pub mod pipeline;
pub mod storage;
pub mod triage;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

/// Backend used for gradient capture; wraps the inference backend.
pub type ExplainBackend = burn::backend::Autodiff<InferenceBackend>;

pub type InferenceModel<B> = models::OtoscopeNet<B>;
pub type InferenceModelConfig = models::OtoscopeNetConfig;

pub use cascade::{Cascade, Decision};
pub use classifier::{run_stage, BurnClassifier, Classifier};
pub use config::{ConfigError, PipelineConfig};
pub use error::{ExplanationError, InferenceError, ScreeningError, StorageError};
pub use explain::{explain, explain_decision};
pub use factory::{save_checkpoint, ClassifierFactory, ModelSpec};
pub use pipeline::{BatchInput, BatchItem, ScreeningPipeline};
pub use storage::{DirOverlayStore, OverlayStore, StoredOverlay};
pub use triage::{triage, triage_label, TriageConfig};

pub mod prelude {
    pub use crate::cascade::{Cascade, Decision};
    pub use crate::classifier::{BurnClassifier, Classifier};
    pub use crate::config::PipelineConfig;
    pub use crate::error::ScreeningError;
    pub use crate::factory::{ClassifierFactory, ModelSpec};
    pub use crate::pipeline::{BatchInput, BatchItem, ScreeningPipeline};
    pub use crate::storage::{DirOverlayStore, OverlayStore};
    pub use crate::triage::{triage, TriageConfig};
    pub use crate::{ExplainBackend, InferenceBackend, InferenceModel, InferenceModelConfig};
}
