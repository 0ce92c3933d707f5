//! Error types for tile decoding.

use thiserror::Error;

/// Errors that can occur while decoding a layer's tile bytes.
///
/// These never cross a worker boundary: the collector downgrades them to
/// "no contribution" for the affected layer.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes could not be decoded as an image.
    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),

    /// The decoded image does not fit the tile buffer.
    #[error("Decoded image {width}×{height} exceeds tile size {max}")]
    Dimensions { width: u32, height: u32, max: u32 },

    /// Decoding panicked and was contained.
    #[error("Decoder panicked: {0}")]
    Panicked(String),

    /// The decode task was dropped before finishing (pool shutting down).
    #[error("Decode aborted")]
    Aborted,
}
