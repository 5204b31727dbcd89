//! Burn classifiers for otoscopy screening.
//!
//! `OtoscopeNet` is a MobileNet-style stack of depthwise-separable feature blocks,
//! a global average pool and a linear head. The forward pass can be split at any
//! feature block so callers can capture activations at a target layer (Grad-CAM).
//!
//! These are pure Burn modules; the `inference` crate wraps them behind the
//! `Classifier` trait.

use burn::module::{Ignored, Module};
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtoscopeNetConfig {
    pub num_classes: usize,
    /// Output channels of each feature block; every block halves the spatial size.
    pub channels: Vec<usize>,
}

impl OtoscopeNetConfig {
    pub fn with_classes(num_classes: usize) -> Self {
        Self {
            num_classes,
            ..Default::default()
        }
    }

    /// Output channels per block; an empty list means the default stack.
    pub fn block_channels(&self) -> Vec<usize> {
        if self.channels.is_empty() {
            OtoscopeNetConfig::default().channels
        } else {
            self.channels.clone()
        }
    }
}

/// Loaded weights whose shapes disagree with the configured architecture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchitectureMismatch {
    #[error("checkpoint has {found} feature blocks, architecture expects {expected}")]
    BlockCount { expected: usize, found: usize },
    #[error("feature block {block} has widths {found:?}, architecture expects {expected:?}")]
    Block {
        block: usize,
        expected: [usize; 3],
        found: [usize; 3],
    },
    #[error("head maps {found:?} features to classes, architecture expects {expected:?}")]
    Head {
        expected: [usize; 2],
        found: [usize; 2],
    },
}

impl Default for OtoscopeNetConfig {
    fn default() -> Self {
        Self {
            num_classes: 3,
            channels: vec![16, 32, 64, 96, 128],
        }
    }
}

/// Which feature block a Grad-CAM pass reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetLayer {
    /// The last feature block (`features[-1]`).
    #[default]
    Last,
    Index(usize),
}

impl TargetLayer {
    /// Concrete block index, or `None` when the model has no such block.
    pub fn resolve(self, feature_count: usize) -> Option<usize> {
        match self {
            TargetLayer::Last => feature_count.checked_sub(1),
            TargetLayer::Index(i) if i < feature_count => Some(i),
            TargetLayer::Index(_) => None,
        }
    }
}

/// Depthwise 3x3 (stride 2) followed by a pointwise 1x1, both ReLU-activated.
#[derive(Debug, Module)]
pub struct FeatureBlock<B: Backend> {
    depthwise: Conv2d<B>,
    pointwise: Conv2d<B>,
}

impl<B: Backend> FeatureBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let depthwise = Conv2dConfig::new([in_channels, in_channels], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_groups(in_channels)
            .init(device);
        let pointwise = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);
        Self {
            depthwise,
            pointwise,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.depthwise.forward(input));
        relu(self.pointwise.forward(x))
    }

    /// `[depthwise in, pointwise in, pointwise out]` as stored in the weights.
    pub fn widths(&self) -> [usize; 3] {
        let [dw_in, ..] = self.depthwise.weight.val().dims();
        let [pw_out, pw_in, ..] = self.pointwise.weight.val().dims();
        [dw_in, pw_in, pw_out]
    }
}

#[derive(Debug, Module)]
pub struct OtoscopeNet<B: Backend> {
    features: Vec<FeatureBlock<B>>,
    head: nn::Linear<B>,
    pub config: Ignored<OtoscopeNetConfig>,
}

impl<B: Backend> OtoscopeNet<B> {
    pub fn new(cfg: OtoscopeNetConfig, device: &B::Device) -> Self {
        let channels = cfg.block_channels();
        let mut features = Vec::with_capacity(channels.len());
        let mut in_channels = 3;
        for &out_channels in &channels {
            features.push(FeatureBlock::new(in_channels, out_channels, device));
            in_channels = out_channels;
        }
        let head = nn::LinearConfig::new(in_channels, cfg.num_classes.max(1)).init(device);
        Self {
            features,
            head,
            config: Ignored(cfg),
        }
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn num_classes(&self) -> usize {
        self.config.num_classes.max(1)
    }

    /// Head weight, `[features, classes]`.
    pub fn head_weight(&self) -> Tensor<B, 2> {
        self.head.weight.val()
    }

    /// Load `record`, rejecting weights that do not fit `config`. Plain
    /// `load_record` takes any tensor shape and panics on a block count mismatch.
    pub fn load_checked(self, record: OtoscopeNetRecord<B>) -> Result<Self, ArchitectureMismatch> {
        if record.features.len() != self.features.len() {
            return Err(ArchitectureMismatch::BlockCount {
                expected: self.features.len(),
                found: record.features.len(),
            });
        }
        let loaded = self.load_record(record);
        loaded.check_shapes()?;
        Ok(loaded)
    }

    /// Compare the weight shapes against `config`.
    pub fn check_shapes(&self) -> Result<(), ArchitectureMismatch> {
        let channels = self.config.block_channels();
        if channels.len() != self.features.len() {
            return Err(ArchitectureMismatch::BlockCount {
                expected: channels.len(),
                found: self.features.len(),
            });
        }
        let mut in_channels = 3;
        for (block, (feature, &out_channels)) in self.features.iter().zip(&channels).enumerate() {
            let expected = [in_channels, in_channels, out_channels];
            let found = feature.widths();
            if found != expected {
                return Err(ArchitectureMismatch::Block {
                    block,
                    expected,
                    found,
                });
            }
            in_channels = out_channels;
        }
        let expected = [in_channels, self.num_classes()];
        let found = self.head_weight().dims();
        if found != expected {
            return Err(ArchitectureMismatch::Head { expected, found });
        }
        Ok(())
    }

    /// Full forward pass: `[B, 3, H, W]` to logits `[B, num_classes]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let last = self.features.len() - 1;
        let acts = self.forward_features(input, last);
        self.forward_head(acts, last)
    }

    /// Run the feature stack up to and including block `layer`.
    ///
    /// `layer` must be below `feature_count()`.
    pub fn forward_features(&self, input: Tensor<B, 4>, layer: usize) -> Tensor<B, 4> {
        self.features[..=layer]
            .iter()
            .fold(input, |x, block| block.forward(x))
    }

    /// Continue from activations of block `layer` to logits.
    pub fn forward_head(&self, acts: Tensor<B, 4>, layer: usize) -> Tensor<B, 2> {
        let x = self.features[layer + 1..]
            .iter()
            .fold(acts, |x, block| block.forward(x));
        let [batch, channels, _, _] = x.dims();
        let pooled = x.mean_dim(3).mean_dim(2).reshape([batch, channels]);
        self.head.forward(pooled)
    }
}

pub mod prelude {
    pub use super::{ArchitectureMismatch, FeatureBlock, OtoscopeNet, OtoscopeNetConfig, TargetLayer};
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type TestBackend = burn_ndarray::NdArray<f32>;

    fn input(h: usize, w: usize) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        let data: Vec<f32> = (0..3 * h * w).map(|i| ((i % 17) as f32 - 8.0) / 8.0).collect();
        Tensor::from_data(TensorData::new(data, [1, 3, h, w]), &device)
    }

    #[test]
    fn forward_produces_one_logit_per_class() {
        let device = Default::default();
        let model = OtoscopeNet::<TestBackend>::new(OtoscopeNetConfig::with_classes(2), &device);
        let logits = model.forward(input(24, 20));
        assert_eq!(logits.dims(), [1, 2]);
    }

    #[test]
    fn split_forward_matches_full_forward() {
        let device = Default::default();
        let model = OtoscopeNet::<TestBackend>::new(
            OtoscopeNetConfig {
                num_classes: 3,
                channels: vec![8, 12, 16],
            },
            &device,
        );
        let full = model.forward(input(16, 16)).into_data().to_vec::<f32>().unwrap();
        for layer in 0..model.feature_count() {
            let acts = model.forward_features(input(16, 16), layer);
            let split = model
                .forward_head(acts, layer)
                .into_data()
                .to_vec::<f32>()
                .unwrap();
            for (a, b) in full.iter().zip(&split) {
                assert!((a - b).abs() < 1e-5);
            }
        }
        // Each block halves the spatial size: 16 -> 8 -> 4 -> 2.
        assert_eq!(model.forward_features(input(16, 16), 2).dims(), [1, 16, 2, 2]);
    }

    #[test]
    fn target_layer_resolution() {
        assert_eq!(TargetLayer::Last.resolve(5), Some(4));
        assert_eq!(TargetLayer::Index(2).resolve(5), Some(2));
        assert_eq!(TargetLayer::Index(5).resolve(5), None);
        assert_eq!(TargetLayer::Last.resolve(0), None);
    }

    #[test]
    fn empty_channel_list_falls_back_to_default_stack() {
        let device = Default::default();
        let model = OtoscopeNet::<TestBackend>::new(
            OtoscopeNetConfig {
                num_classes: 3,
                channels: Vec::new(),
            },
            &device,
        );
        assert_eq!(model.feature_count(), OtoscopeNetConfig::default().channels.len());
    }

    fn net(num_classes: usize, channels: Vec<usize>) -> OtoscopeNet<TestBackend> {
        let device = Default::default();
        OtoscopeNet::new(
            OtoscopeNetConfig {
                num_classes,
                channels,
            },
            &device,
        )
    }

    #[test]
    fn fresh_models_match_their_config() {
        let model = net(3, vec![4, 8, 8]);
        assert!(model.check_shapes().is_ok());
        assert_eq!(model.head_weight().dims(), [8, 3]);
    }

    #[test]
    fn load_checked_rejects_foreign_weights() {
        let wrong_head = net(2, vec![4, 8, 8]).into_record();
        assert_eq!(
            net(3, vec![4, 8, 8]).load_checked(wrong_head).unwrap_err(),
            ArchitectureMismatch::Head {
                expected: [8, 3],
                found: [8, 2],
            }
        );

        let wrong_width = net(3, vec![4, 8, 8]).into_record();
        assert_eq!(
            net(3, vec![4, 8, 16]).load_checked(wrong_width).unwrap_err(),
            ArchitectureMismatch::Block {
                block: 2,
                expected: [8, 8, 16],
                found: [8, 8, 8],
            }
        );

        let wrong_depth = net(3, vec![4, 8]).into_record();
        assert_eq!(
            net(3, vec![4, 8, 8]).load_checked(wrong_depth).unwrap_err(),
            ArchitectureMismatch::BlockCount {
                expected: 3,
                found: 2,
            }
        );

        let same = net(3, vec![4, 8, 8]).into_record();
        assert!(net(3, vec![4, 8, 8]).load_checked(same).is_ok());
    }
}
