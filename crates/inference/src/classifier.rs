//! The classifier seam used by the cascade and the explanation generator.

use std::sync::{Arc, Mutex};

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Tensor, TensorData};
use data_contracts::{ClassLabel, ClassifierOutcome};
use models::{OtoscopeNet, TargetLayer};
use vision_core::interfaces::{ActivationMap, NormalizedImage};

use crate::error::{ExplanationError, InferenceError};
use crate::gradcam::class_activation_map;

/// A loaded, read-only image classifier.
pub trait Classifier: Send + Sync {
    fn id(&self) -> &str;

    fn class_count(&self) -> usize;

    /// Layer used for explanations unless the caller overrides it.
    fn target_layer(&self) -> TargetLayer;

    /// Raw logits for one image, in label enumeration order.
    fn logits(&self, image: &NormalizedImage) -> Result<Vec<f32>, InferenceError>;

    /// Non-negative importance map at `layer` for the logit of `class_index`.
    fn activation_map(
        &self,
        image: &NormalizedImage,
        layer: TargetLayer,
        class_index: usize,
    ) -> Result<ActivationMap, ExplanationError>;
}

/// Run one cascade stage: logits, softmax, stable argmax over `L`.
pub fn run_stage<L: ClassLabel>(
    model: &dyn Classifier,
    image: &NormalizedImage,
) -> Result<ClassifierOutcome<L>, InferenceError> {
    let logits = model.logits(image)?;
    ClassifierOutcome::from_logits(&logits).map_err(|source| InferenceError::Scores {
        model: model.id().to_string(),
        source,
    })
}

/// Burn-backed classifier. Weights live on the autodiff backend so the same
/// handle serves both plain inference and gradient capture.
pub struct BurnClassifier<B: AutodiffBackend> {
    id: String,
    model: Arc<Mutex<OtoscopeNet<B>>>,
    classes: usize,
    target_layer: TargetLayer,
    device: B::Device,
}

impl<B: AutodiffBackend> BurnClassifier<B> {
    pub fn new(
        id: impl Into<String>,
        model: OtoscopeNet<B>,
        target_layer: TargetLayer,
        device: B::Device,
    ) -> Self {
        Self {
            id: id.into(),
            classes: model.num_classes(),
            model: Arc::new(Mutex::new(model)),
            target_layer,
            device,
        }
    }

    /// Clone the weights out of the lock so forward passes never hold it.
    fn snapshot(&self) -> Option<OtoscopeNet<B>> {
        self.model.lock().ok().map(|model| model.clone())
    }

    fn input_data(image: &NormalizedImage) -> TensorData {
        TensorData::new(image.data().to_vec(), image.shape())
    }
}

impl<B: AutodiffBackend> Classifier for BurnClassifier<B> {
    fn id(&self) -> &str {
        &self.id
    }

    fn class_count(&self) -> usize {
        self.classes
    }

    fn target_layer(&self) -> TargetLayer {
        self.target_layer
    }

    fn logits(&self, image: &NormalizedImage) -> Result<Vec<f32>, InferenceError> {
        let model = self.snapshot().ok_or_else(|| InferenceError::Poisoned {
            model: self.id.clone(),
        })?;
        let model = model.valid();
        let input = Tensor::<B::InnerBackend, 4>::from_data(Self::input_data(image), &self.device);
        let logits = model.forward(input);
        let values = logits
            .into_data()
            .to_vec::<f32>()
            .map_err(|err| InferenceError::Model {
                model: self.id.clone(),
                message: format!("{err:?}"),
            })?;
        if values.len() != model.num_classes() {
            return Err(InferenceError::Model {
                model: self.id.clone(),
                message: format!(
                    "expected {} logits, got {}",
                    model.num_classes(),
                    values.len()
                ),
            });
        }
        Ok(values)
    }

    fn activation_map(
        &self,
        image: &NormalizedImage,
        layer: TargetLayer,
        class_index: usize,
    ) -> Result<ActivationMap, ExplanationError> {
        let model = self.snapshot().ok_or_else(|| ExplanationError::Model {
            model: self.id.clone(),
            message: "lock poisoned".into(),
        })?;
        let input = Tensor::<B, 4>::from_data(Self::input_data(image), &self.device);
        class_activation_map(&model, input, layer, class_index)
    }
}
