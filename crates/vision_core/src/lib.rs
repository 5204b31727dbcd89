//! vision_core: image normalization, heatmap overlays and the image types shared
//! by the screening pipeline.

pub mod encode;
pub mod error;
pub mod interfaces;
pub mod normalize;
pub mod overlay;

pub use error::VisionError;
pub use normalize::{normalize, IntensityPolicy, NormalizeConfig, Normalized};

pub mod prelude {
    pub use crate::encode::{encode_png, encode_png_base64, to_base64};
    pub use crate::interfaces::*;
    pub use crate::normalize::{decode, normalize, IntensityPolicy, NormalizeConfig, Normalized};
    pub use crate::overlay::render_overlay;
    pub use crate::VisionError;
}
