use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

use crate::VisionError;

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, VisionError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|source| VisionError::Encode { source })?;
    Ok(buf)
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// PNG-encode and base64 the result, for inline transport.
pub fn encode_png_base64(image: &RgbImage) -> Result<String, VisionError> {
    encode_png(image).map(|png| to_base64(&png))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn png_round_trips_through_decoder() {
        let img = RgbImage::from_pixel(3, 2, Rgb([12, 34, 56]));
        let png = encode_png(&img).unwrap();
        let back = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(back, img);
        let b64 = encode_png_base64(&img).unwrap();
        assert_eq!(STANDARD.decode(b64).unwrap(), png);
    }
}
