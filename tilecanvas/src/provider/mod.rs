//! Tile source abstraction
//!
//! This module provides the [`TileSource`] capability that layers use to
//! obtain encoded tile images, and implementations reading from the local
//! file system or over HTTP.
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilecanvas::provider::{AsyncReqwestClient, FileTileSource, HttpTileSource, TileSource};
//!
//! let local: Arc<dyn TileSource> = Arc::new(FileTileSource::new("/data/pyramid"));
//! let remote: Arc<dyn TileSource> = Arc::new(HttpTileSource::new(
//!     AsyncReqwestClient::new()?,
//!     "https://tiles.example.com/{zoom}/{row}/{col}.png",
//! )?);
//! ```

mod file;
mod http;
mod template;
mod types;

pub use file::{FileTileSource, DEFAULT_FILE_TEMPLATE};
pub use http::{AsyncHttpClient, AsyncReqwestClient, HttpTileSource, DEFAULT_HTTP_TIMEOUT_SECS};
pub use template::TileTemplate;
pub use types::{BoxFuture, ProviderError, TileSource};

#[cfg(test)]
pub use http::tests::MockAsyncHttpClient;
