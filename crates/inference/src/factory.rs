use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use models::{OtoscopeNetConfig, OtoscopeNetRecord, TargetLayer};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cascade::Cascade;
use crate::classifier::{BurnClassifier, Classifier};
use crate::error::InferenceError;
use crate::{ExplainBackend, InferenceModel};

/// One classifier to load: its identity, checkpoint and architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    /// Burn binary record; the `.bin` extension is implied.
    pub checkpoint: PathBuf,
    #[serde(default)]
    pub arch: OtoscopeNetConfig,
    #[serde(default)]
    pub target_layer: TargetLayer,
}

impl ModelSpec {
    pub fn stage1() -> Self {
        Self {
            id: "stage1".into(),
            checkpoint: PathBuf::from("weights/stage1"),
            arch: OtoscopeNetConfig::with_classes(3),
            target_layer: TargetLayer::Last,
        }
    }

    pub fn stage2() -> Self {
        Self {
            id: "stage2".into(),
            checkpoint: PathBuf::from("weights/stage2"),
            arch: OtoscopeNetConfig::with_classes(2),
            target_layer: TargetLayer::Last,
        }
    }

    /// File burn reads for this checkpoint.
    pub fn checkpoint_file(&self) -> PathBuf {
        self.checkpoint.with_extension("bin")
    }
}

/// Loads Burn checkpoints into shared, read-only classifier handles.
pub struct ClassifierFactory {
    device: <ExplainBackend as Backend>::Device,
}

impl Default for ClassifierFactory {
    fn default() -> Self {
        Self {
            device: Default::default(),
        }
    }
}

impl ClassifierFactory {
    pub fn new(device: <ExplainBackend as Backend>::Device) -> Self {
        Self { device }
    }

    /// A missing or unreadable checkpoint is an error; there is no fallback model.
    /// So are weights whose shapes disagree with `spec.arch`.
    pub fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn Classifier>, InferenceError> {
        let file = spec.checkpoint_file();
        if !file.exists() {
            return Err(InferenceError::MissingCheckpoint { path: file });
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let record: OtoscopeNetRecord<ExplainBackend> = recorder
            .load(spec.checkpoint.clone(), &self.device)
            .map_err(|err| InferenceError::Load {
                path: file.clone(),
                message: format!("{err:?}"),
            })?;
        let model = InferenceModel::<ExplainBackend>::new(spec.arch.clone(), &self.device)
            .load_checked(record)
            .map_err(|err| InferenceError::Load {
                path: file.clone(),
                message: format!("checkpoint does not match the `{}` architecture: {err}", spec.id),
            })?;
        info!(
            model = %spec.id,
            checkpoint = %file.display(),
            features = model.feature_count(),
            classes = model.num_classes(),
            "classifier loaded"
        );
        Ok(Arc::new(BurnClassifier::new(
            spec.id.clone(),
            model,
            spec.target_layer,
            self.device.clone(),
        )))
    }

    pub fn load_cascade(
        &self,
        stage1: &ModelSpec,
        stage2: &ModelSpec,
    ) -> Result<Cascade, InferenceError> {
        Cascade::new(self.load(stage1)?, self.load(stage2)?)
    }
}

/// Write a model as a checkpoint `load` can read back.
pub fn save_checkpoint(
    model: &InferenceModel<ExplainBackend>,
    path: &Path,
) -> Result<(), InferenceError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|err| InferenceError::Save {
            path: path.to_path_buf(),
            message: format!("{err:?}"),
        })
}
