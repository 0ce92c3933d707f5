//! Read model consumed by renderers.

use std::sync::Arc;

use crate::layer::LayerId;
use crate::tile::{MapRegion, TileBuffer, TileSpec};

/// One tile ready to draw.
#[derive(Debug, Clone)]
pub struct DrawableTile {
    pub spec: TileSpec,
    pub buffer: Arc<TileBuffer>,
    /// Alphas the tile was composited with, base layer first.
    pub alphas: Vec<f32>,
    pub layer_ids: Vec<LayerId>,
}

impl DrawableTile {
    /// Area covered in full-resolution map pixels.
    pub fn region(&self, tile_size: u32, level_count: u8) -> MapRegion {
        self.spec.map_region(tile_size, level_count)
    }
}

/// Atomic, read-only view of what should be on screen.
///
/// Tiles are ordered so that drawing them in sequence is correct: tiles
/// from other levels that fill gaps come first (coarse before fine), tiles
/// of the selected level last.
#[derive(Debug, Clone, Default)]
pub struct RenderSnapshot {
    /// Increases with every published snapshot.
    pub generation: u64,
    /// Latest view or layer update reflected here.
    pub revision: u64,
    /// Selected pyramid level, `None` before the first layout.
    pub level: Option<u8>,
    pub tiles: Vec<DrawableTile>,
    /// True when nothing is pending or in flight for the current view.
    pub settled: bool,
}

impl RenderSnapshot {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DrawableTile> {
        self.tiles.iter()
    }

    pub fn contains(&self, spec: &TileSpec) -> bool {
        self.tiles.iter().any(|t| &t.spec == spec)
    }
}
