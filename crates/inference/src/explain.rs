use models::TargetLayer;
use vision_core::interfaces::{ExplanationOverlay, NormalizedImage, SourceImage};
use vision_core::overlay::render_overlay;

use crate::cascade::Decision;
use crate::classifier::Classifier;
use crate::error::ExplanationError;

/// Grad-CAM overlay of `class_index` from `model`, rendered over the decoded original.
pub fn explain(
    model: &dyn Classifier,
    target_layer: TargetLayer,
    image: &NormalizedImage,
    original: &SourceImage,
    class_index: usize,
) -> Result<ExplanationOverlay, ExplanationError> {
    let map = model.activation_map(image, target_layer, class_index)?;
    let rendered = render_overlay(original.rgb(), &map).map_err(ExplanationError::Render)?;
    Ok(ExplanationOverlay::new(rendered, model.id()))
}

/// Explain the deciding model's prediction at its configured target layer.
pub fn explain_decision(
    decision: Decision<'_>,
    image: &NormalizedImage,
    original: &SourceImage,
) -> Result<ExplanationOverlay, ExplanationError> {
    explain(
        decision.model,
        decision.model.target_layer(),
        image,
        original,
        decision.class_index,
    )
}
