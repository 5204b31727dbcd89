use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("png encode failed: {source}")]
    Encode {
        #[source]
        source: image::ImageError,
    },
    #[error("shape mismatch: expected {expected} values, got {actual}")]
    Shape { expected: usize, actual: usize },
}
