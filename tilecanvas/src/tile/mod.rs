//! Tile value types.
//!
//! - [`TileSpec`] identifies one cell of the tile pyramid
//! - [`TileBuffer`] holds decoded pixels in a [`PixelFormat`]
//! - [`Tile`] is a composited result, ready to draw

mod buffer;
mod composed;
mod error;
mod spec;

pub use buffer::{PixelFormat, TileBuffer};
pub use composed::Tile;
pub use error::DecodeError;
pub use spec::{MapRegion, TileSpec};
