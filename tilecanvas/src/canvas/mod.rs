//! Tile canvas: the cache and the reactor that keeps it in sync with the view.
//!
//! - [`TileCache`] holds composited tiles and decides what to evict
//! - [`TileCanvasState`] runs the reactor task that owns the cache, feeds
//!   the collector and publishes [`RenderSnapshot`]s for renderers

mod cache;
mod snapshot;
mod state;
mod throttle;

pub use cache::{
    EvictionPolicy, Insertion, PassOutcome, TileCache, DEFAULT_GRACE_PASSES,
    DEFAULT_MAX_LEVEL_DISTANCE,
};
pub use snapshot::{DrawableTile, RenderSnapshot};
pub use state::{CanvasConfig, TileCanvasState};
pub use throttle::DEFAULT_RENDER_THROTTLE;
