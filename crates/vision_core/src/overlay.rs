//! Class-activation heatmaps: normalize, upsample, colorize and blend onto the source.

use image::{Rgb, RgbImage};

use crate::interfaces::ActivationMap;
use crate::VisionError;

/// Share of the original image in the blend; the heatmap gets the rest.
pub const IMAGE_WEIGHT: f32 = 0.5;

/// Bilinear resample of an activation map to `width x height` (half-pixel centers).
pub fn upsample_bilinear(map: &ActivationMap, width: u32, height: u32) -> Vec<f32> {
    let (in_w, in_h) = (map.width(), map.height());
    let (out_w, out_h) = (width as usize, height as usize);
    let src = map.values();
    let scale_x = in_w as f32 / out_w as f32;
    let scale_y = in_h as f32 / out_h as f32;
    let sample = |coord: f32, len: usize| -> (usize, usize, f32) {
        let c = coord.clamp(0.0, (len - 1) as f32);
        let lo = c.floor() as usize;
        let hi = (lo + 1).min(len - 1);
        (lo, hi, c - lo as f32)
    };

    let mut out = Vec::with_capacity(out_w * out_h);
    for y in 0..out_h {
        let (y0, y1, fy) = sample((y as f32 + 0.5) * scale_y - 0.5, in_h);
        for x in 0..out_w {
            let (x0, x1, fx) = sample((x as f32 + 0.5) * scale_x - 0.5, in_w);
            let top = src[y0 * in_w + x0] * (1.0 - fx) + src[y0 * in_w + x1] * fx;
            let bottom = src[y1 * in_w + x0] * (1.0 - fx) + src[y1 * in_w + x1] * fx;
            out.push(top * (1.0 - fy) + bottom * fy);
        }
    }
    out
}

/// Min-max scale into [0, 1]. A flat input becomes all zeros.
pub fn normalize_unit(values: &mut [f32]) {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    for v in values.iter_mut() {
        *v = ((*v - min) / range).clamp(0.0, 1.0);
    }
}

/// Importance in [0, 1] at `width x height`: the map is min-max scaled at its
/// own resolution, then resampled.
pub fn heatmap(map: &ActivationMap, width: u32, height: u32) -> Result<Vec<f32>, VisionError> {
    let mut scaled = map.values().to_vec();
    normalize_unit(&mut scaled);
    let scaled = ActivationMap::new(scaled, map.width(), map.height())?;
    let mut heat = upsample_bilinear(&scaled, width, height);
    heat.iter_mut().for_each(|v| *v = v.clamp(0.0, 1.0));
    Ok(heat)
}

/// Jet color scale: blue for 0, red for 1.
pub fn jet(value: f32) -> [f32; 3] {
    let v = value.clamp(0.0, 1.0);
    let channel = |center: f32| (1.5 - (4.0 * v - center).abs()).clamp(0.0, 1.0);
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Render the explanation overlay at the source resolution.
///
/// The importance map goes through [`heatmap`]; the source is scaled
/// with its own extrema; both are blended and the result is rescaled by its max.
pub fn render_overlay(source: &RgbImage, map: &ActivationMap) -> Result<RgbImage, VisionError> {
    let (w, h) = source.dimensions();
    if w == 0 || h == 0 {
        return Err(VisionError::Shape {
            expected: 1,
            actual: 0,
        });
    }
    let heat = heatmap(map, w, h)?;

    let (lo, hi) = source
        .as_raw()
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi.saturating_sub(lo) as f32;
    let scale_source = |v: u8| {
        if range > 0.0 {
            (v - lo) as f32 / range
        } else {
            0.0
        }
    };

    let mut blended = Vec::with_capacity(heat.len() * 3);
    for (px, &importance) in source.pixels().zip(&heat) {
        // Quantize the mask before colorizing, as an 8-bit color map would.
        let color = jet((importance * 255.0).floor() / 255.0);
        for c in 0..3 {
            blended.push((1.0 - IMAGE_WEIGHT) * color[c] + IMAGE_WEIGHT * scale_source(px[c]));
        }
    }
    let peak = blended.iter().copied().fold(0.0f32, f32::max);
    let to_u8 = |v: f32| {
        if peak > 0.0 {
            (255.0 * v / peak) as u8
        } else {
            0
        }
    };

    let mut out = RgbImage::new(w, h);
    for (i, px) in out.pixels_mut().enumerate() {
        *px = Rgb([
            to_u8(blended[i * 3]),
            to_u8(blended[i * 3 + 1]),
            to_u8(blended[i * 3 + 2]),
        ]);
    }
    Ok(out)
}
