use std::sync::Arc;

use data_contracts::{CascadeResult, ClassLabel, Stage1Label, Stage2Label};
use tracing::debug;
use vision_core::interfaces::NormalizedImage;

use crate::classifier::{run_stage, Classifier};
use crate::error::{InferenceError, ScreeningError};

/// Two-stage classifier cascade: triage over {Normal, Abnormal, Earwax}, then
/// {AOM, COM} only for abnormal findings.
#[derive(Clone)]
pub struct Cascade {
    stage1: Arc<dyn Classifier>,
    stage2: Arc<dyn Classifier>,
}

/// The model whose prediction is final for a cascade result, and the class to explain.
#[derive(Clone, Copy)]
pub struct Decision<'a> {
    pub model: &'a dyn Classifier,
    pub class_index: usize,
}

impl Cascade {
    pub fn new(
        stage1: Arc<dyn Classifier>,
        stage2: Arc<dyn Classifier>,
    ) -> Result<Self, InferenceError> {
        check_classes::<Stage1Label>(stage1.as_ref())?;
        check_classes::<Stage2Label>(stage2.as_ref())?;
        Ok(Self { stage1, stage2 })
    }

    pub fn stage1(&self) -> &dyn Classifier {
        self.stage1.as_ref()
    }

    pub fn stage2(&self) -> &dyn Classifier {
        self.stage2.as_ref()
    }

    /// Stage 2 runs on the same tensor iff stage 1 says Abnormal.
    pub fn classify(&self, image: &NormalizedImage) -> Result<CascadeResult, ScreeningError> {
        let stage1 = run_stage::<Stage1Label>(self.stage1(), image)?;
        debug!(
            model = self.stage1.id(),
            label = %stage1.label(),
            confidence = stage1.confidence(),
            "stage 1"
        );
        let stage2 = if stage1.label() == Stage1Label::Abnormal {
            let outcome = run_stage::<Stage2Label>(self.stage2(), image)?;
            debug!(
                model = self.stage2.id(),
                label = %outcome.label(),
                confidence = outcome.confidence(),
                "stage 2"
            );
            Some(outcome)
        } else {
            None
        };
        Ok(CascadeResult::new(stage1, stage2)?)
    }

    /// Stage-2 model when stage 2 ran, otherwise stage 1.
    pub fn decide(&self, result: &CascadeResult) -> Decision<'_> {
        match result.stage2() {
            Some(outcome) => Decision {
                model: self.stage2(),
                class_index: outcome.label().index(),
            },
            None => Decision {
                model: self.stage1(),
                class_index: result.stage1().label().index(),
            },
        }
    }
}

fn check_classes<L: ClassLabel>(model: &dyn Classifier) -> Result<(), InferenceError> {
    if model.class_count() == L::ALL.len() {
        return Ok(());
    }
    Err(InferenceError::Model {
        model: model.id().to_string(),
        message: format!(
            "expected {} classes, model has {}",
            L::ALL.len(),
            model.class_count()
        ),
    })
}
