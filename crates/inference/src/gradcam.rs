//! Gradient-weighted class activation maps on the autodiff backend.

use burn::tensor::activation::relu;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;
use models::{OtoscopeNet, TargetLayer};
use vision_core::interfaces::ActivationMap;

use crate::error::ExplanationError;

/// Grad-CAM for a single image (`input` is `[1, 3, H, W]`).
///
/// Activations at the target block become a gradient leaf; the class logit is
/// backpropagated to them, channel weights are the spatial mean of the
/// gradient, and the map is the ReLU of the weighted channel sum, at the
/// block's own resolution.
pub fn class_activation_map<B: AutodiffBackend>(
    model: &OtoscopeNet<B>,
    input: Tensor<B, 4>,
    layer: TargetLayer,
    class_index: usize,
) -> Result<ActivationMap, ExplanationError> {
    let feature_count = model.feature_count();
    let block = layer
        .resolve(feature_count)
        .ok_or(ExplanationError::TargetLayer {
            layer,
            feature_count,
        })?;
    let classes = model.num_classes();
    if class_index >= classes {
        return Err(ExplanationError::ClassIndex {
            index: class_index,
            classes,
        });
    }

    let acts = model
        .forward_features(input, block)
        .detach()
        .require_grad();
    let logits = model.forward_head(acts.clone(), block);
    let score = logits.slice([0..1, class_index..class_index + 1]).sum();
    let grads = score.backward();
    let grad = acts
        .grad(&grads)
        .ok_or_else(|| ExplanationError::Gradient("no gradient reached the target layer".into()))?;

    let acts = acts.inner();
    let weights = grad.mean_dim(3).mean_dim(2);
    let cam = relu((acts * weights).sum_dim(1));
    let [_, _, height, width] = cam.dims();
    let values = cam
        .into_data()
        .to_vec::<f32>()
        .map_err(|err| ExplanationError::Gradient(format!("{err:?}")))?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ExplanationError::Gradient("non-finite activation map".into()));
    }
    ActivationMap::new(values, width, height).map_err(ExplanationError::Map)
}
