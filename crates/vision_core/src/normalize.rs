//! Raw bytes to classifier input: decode, RGB, channel-first, area resize, standardize.

use image::{ImageError, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::interfaces::{NormalizedImage, SourceImage};
use crate::VisionError;

/// Encodings accepted at the pipeline boundary.
pub const ACCEPTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Inputs larger than this are rejected before decoding.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 50 * 1024 * 1024;

/// How intensities are standardized after resizing.
///
/// The pretrained weights expect `Global`; changing it requires retrained models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityPolicy {
    /// One mean/std over all channels together.
    Global,
    /// A mean/std per channel.
    ChannelWise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Target tensor width.
    pub width: u32,
    /// Target tensor height.
    pub height: u32,
    pub intensity: IntensityPolicy,
    pub max_input_bytes: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            width: 500,
            height: 500,
            intensity: IntensityPolicy::Global,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

/// The classifier tensor together with the decoded original it came from.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub tensor: NormalizedImage,
    pub source: SourceImage,
}

/// Decode and normalize one image. Pure: identical bytes give identical tensors.
pub fn normalize(bytes: &[u8], cfg: &NormalizeConfig) -> Result<Normalized, VisionError> {
    let source = decode(bytes, cfg.max_input_bytes)?;
    let tensor = to_tensor(&source, cfg)?;
    Ok(Normalized { tensor, source })
}

/// Decode accepted encodings into 8-bit RGB (alpha dropped, gray expanded).
pub fn decode(bytes: &[u8], max_input_bytes: usize) -> Result<SourceImage, VisionError> {
    if bytes.is_empty() {
        return Err(VisionError::Decode("empty input".to_string()));
    }
    if bytes.len() > max_input_bytes {
        return Err(VisionError::Decode(format!(
            "input of {} bytes exceeds limit of {max_input_bytes}",
            bytes.len()
        )));
    }
    let format = image::guess_format(bytes)
        .map_err(|e| VisionError::Decode(format!("unrecognised image data: {e}")))?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(VisionError::UnsupportedFormat(format!("{format:?}")));
    }
    let decoded = image::load_from_memory_with_format(bytes, format).map_err(|e| match e {
        ImageError::Unsupported(inner) => VisionError::UnsupportedFormat(inner.to_string()),
        other => VisionError::Decode(other.to_string()),
    })?;
    let rgb = decoded.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(VisionError::Decode("image has no pixels".to_string()));
    }
    Ok(SourceImage::new(rgb))
}

/// Channel-first planes of the decoded image, resized and standardized.
pub fn to_tensor(source: &SourceImage, cfg: &NormalizeConfig) -> Result<NormalizedImage, VisionError> {
    let (out_w, out_h) = (cfg.width as usize, cfg.height as usize);
    let planes = channel_planes(source.rgb());
    let (in_w, in_h) = source.dimensions();
    let mut data = Vec::with_capacity(NormalizedImage::CHANNELS * out_w * out_h);
    for plane in &planes {
        data.extend(resize_area(plane, in_w as usize, in_h as usize, out_w, out_h));
    }
    match cfg.intensity {
        IntensityPolicy::Global => standardize(&mut data),
        IntensityPolicy::ChannelWise => {
            for plane in data.chunks_mut(out_w * out_h) {
                standardize(plane);
            }
        }
    }
    NormalizedImage::new(data, cfg.width, cfg.height)
}

fn channel_planes(rgb: &RgbImage) -> [Vec<f32>; 3] {
    let n = rgb.width() as usize * rgb.height() as usize;
    let mut planes = [Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n)];
    for px in rgb.pixels() {
        planes[0].push(px[0] as f32);
        planes[1].push(px[1] as f32);
        planes[2].push(px[2] as f32);
    }
    planes
}

/// Source span `[start, end)` averaged into each output cell (adaptive average pooling).
fn area_spans(input: usize, output: usize) -> Vec<(usize, usize)> {
    (0..output)
        .map(|o| {
            let start = (o * input) / output;
            let end = ((o + 1) * input).div_ceil(output);
            (start, end.max(start + 1))
        })
        .collect()
}

/// Exact area resize of one row-major plane; aspect ratio is not preserved.
pub fn resize_area(plane: &[f32], in_w: usize, in_h: usize, out_w: usize, out_h: usize) -> Vec<f32> {
    let cols = area_spans(in_w, out_w);
    let rows = area_spans(in_h, out_h);

    let mut horizontal = vec![0f32; in_h * out_w];
    for y in 0..in_h {
        let row = &plane[y * in_w..(y + 1) * in_w];
        for (ox, &(x0, x1)) in cols.iter().enumerate() {
            let sum: f64 = row[x0..x1].iter().map(|v| *v as f64).sum();
            horizontal[y * out_w + ox] = (sum / (x1 - x0) as f64) as f32;
        }
    }

    let mut out = vec![0f32; out_h * out_w];
    for (oy, &(y0, y1)) in rows.iter().enumerate() {
        for ox in 0..out_w {
            let sum: f64 = (y0..y1).map(|y| horizontal[y * out_w + ox] as f64).sum();
            out[oy * out_w + ox] = (sum / (y1 - y0) as f64) as f32;
        }
    }
    out
}

/// Zero mean, unit (population) variance in place; a flat input keeps divisor 1.
fn standardize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|v| {
            let d = *v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = if var > 0.0 { var.sqrt() } else { 1.0 };
    for v in values.iter_mut() {
        *v = ((*v as f64 - mean) / std) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn gradient_png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, ((x + y) * 3) as u8]));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    fn small_cfg() -> NormalizeConfig {
        NormalizeConfig {
            width: 8,
            height: 6,
            ..Default::default()
        }
    }

    #[test]
    fn area_resize_averages_spans() {
        // 4x4 -> 2x2: each output is a 2x2 block mean.
        let plane: Vec<f32> = (0..16).map(|v| v as f32).collect();
        assert_eq!(resize_area(&plane, 4, 4, 2, 2), vec![2.5, 4.5, 10.5, 12.5]);
        // Overlapping spans when the ratio is fractional.
        assert_eq!(resize_area(&[0.0, 3.0, 6.0], 3, 1, 2, 1), vec![1.5, 4.5]);
        // Upscaling a single pixel replicates it.
        assert_eq!(resize_area(&[9.0], 1, 1, 3, 2), vec![9.0; 6]);
    }

    #[test]
    fn normalized_tensor_has_fixed_shape_and_unit_stats() {
        let out = normalize(&gradient_png(37, 21), &small_cfg()).unwrap();
        assert_eq!(out.tensor.shape(), [1, 3, 6, 8]);
        assert_eq!(out.source.dimensions(), (37, 21));
        let data = out.tensor.data();
        let n = data.len() as f64;
        let mean = data.iter().map(|v| *v as f64).sum::<f64>() / n;
        let var = data.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 1e-5, "mean {mean}");
        assert!((var - 1.0).abs() < 1e-4, "var {var}");
    }

    #[test]
    fn normalization_is_bit_identical_across_runs() {
        let bytes = gradient_png(19, 23);
        let a = normalize(&bytes, &small_cfg()).unwrap();
        let b = normalize(&bytes, &small_cfg()).unwrap();
        let bits = |t: &NormalizedImage| t.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a.tensor), bits(&b.tensor));
    }

    #[test]
    fn single_pixel_and_flat_images_are_accepted() {
        let one = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([10, 200, 30]))),
            ImageFormat::Png,
        );
        let out = normalize(&one, &small_cfg()).unwrap();
        assert_eq!(out.tensor.data().len(), 3 * 8 * 6);

        let flat = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 5, Rgb([90, 90, 90]))),
            ImageFormat::Png,
        );
        let out = normalize(&flat, &small_cfg()).unwrap();
        assert!(out.tensor.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn gray_and_alpha_inputs_become_rgb() {
        let gray = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 3, Luma([77]))),
            ImageFormat::Png,
        );
        let src = decode(&gray, DEFAULT_MAX_INPUT_BYTES).unwrap();
        assert_eq!(src.rgb().get_pixel(0, 0), &Rgb([77, 77, 77]));

        let rgba = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 0]))),
            ImageFormat::Png,
        );
        let src = decode(&rgba, DEFAULT_MAX_INPUT_BYTES).unwrap();
        assert_eq!(src.rgb().get_pixel(1, 1), &Rgb([1, 2, 3]));
    }

    #[test]
    fn channel_wise_policy_standardizes_each_plane() {
        let cfg = NormalizeConfig {
            intensity: IntensityPolicy::ChannelWise,
            ..small_cfg()
        };
        let out = normalize(&gradient_png(16, 16), &cfg).unwrap();
        for plane in out.tensor.data().chunks(8 * 6) {
            let mean: f32 = plane.iter().sum::<f32>() / plane.len() as f32;
            assert!(mean.abs() < 1e-4);
        }
    }

    #[test]
    fn rejects_garbage_empty_and_oversized_input() {
        assert!(matches!(
            decode(b"definitely not an image", DEFAULT_MAX_INPUT_BYTES),
            Err(VisionError::Decode(_))
        ));
        assert!(matches!(
            decode(&[], DEFAULT_MAX_INPUT_BYTES),
            Err(VisionError::Decode(_))
        ));
        assert!(matches!(
            decode(&gradient_png(4, 4), 8),
            Err(VisionError::Decode(_))
        ));
        // Valid PNG signature with a truncated body.
        let truncated = &gradient_png(8, 8)[..40];
        assert!(matches!(
            decode(truncated, DEFAULT_MAX_INPUT_BYTES),
            Err(VisionError::Decode(_))
        ));
    }

    #[test]
    fn recognised_but_unaccepted_formats_are_unsupported() {
        let bmp = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, Rgb([1, 1, 1]))),
            ImageFormat::Bmp,
        );
        assert!(matches!(
            decode(&bmp, DEFAULT_MAX_INPUT_BYTES),
            Err(VisionError::UnsupportedFormat(_))
        ));
    }
}
