//! Tile source trait and error types.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur while fetching tile bytes.
///
/// None of these are fatal to the pipeline: a failed fetch simply makes the
/// layer contribute nothing to the tile.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// HTTP transport error or unexpected status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// A location template is missing a placeholder or is malformed.
    #[error("Invalid template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        ProviderError::Io(e.to_string())
    }
}

/// Capability of a layer to supply encoded tile images.
///
/// Given a pyramid cell, a source yields the encoded bytes (PNG, JPEG, ...),
/// `Ok(None)` when it has no tile there, or an error. Implementations must be
/// thread-safe: several collector workers call the same source concurrently.
///
/// # Dyn Compatibility
///
/// `fetch` returns a boxed future so heterogeneous sources can be stacked as
/// `Arc<dyn TileSource>` layers.
///
/// # Implementors
///
/// - [`FileTileSource`](super::FileTileSource) - Reads tiles from a directory tree
/// - [`HttpTileSource`](super::HttpTileSource) - Downloads tiles from a URL template
pub trait TileSource: Send + Sync + 'static {
    /// Fetch the encoded image for `(row, col)` at pyramid level `zoom`.
    fn fetch(&self, row: u32, col: u32, zoom: u8) -> BoxFuture<'_, Result<Option<Bytes>, ProviderError>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
