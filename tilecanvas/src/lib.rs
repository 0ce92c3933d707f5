//! TileCanvas - multi-resolution tile pipeline
//!
//! This library keeps the tiles of a deep-zoom image pyramid in sync with a
//! moving, zooming and rotating view:
//!
//! - [`resolver`] turns a viewport and scale into the set of visible tiles
//! - [`collector`] fetches, decodes and composites tiles on a bounded worker pool
//! - [`canvas`] caches tiles, evicts those no longer needed and publishes
//!   render snapshots
//! - [`map`] ties a view model to the pipeline
//!
//! Tiles come from [`provider::TileSource`] implementations, one per
//! [`layer::Layer`].

pub mod canvas;
pub mod collector;
pub mod layer;
pub mod logging;
pub mod map;
pub mod pool;
pub mod provider;
pub mod resolver;
pub mod telemetry;
pub mod tile;

pub use canvas::{DrawableTile, RenderSnapshot, TileCanvasState};
pub use collector::TileCollector;
pub use layer::{Layer, LayerId, LayerStack};
pub use map::{MapConfig, MapError, MapState};
pub use pool::BufferPool;
pub use provider::{ProviderError, TileSource};
pub use resolver::{Viewport, VisibleTilesResolver};
pub use tile::{PixelFormat, Tile, TileBuffer, TileSpec};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
