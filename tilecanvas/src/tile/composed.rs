//! Composited tiles.

use std::sync::Arc;

use super::buffer::TileBuffer;
use super::spec::TileSpec;
use crate::layer::{LayerId, LayerStack};

/// A tile composited from one or more layers.
///
/// Created by a collector worker once the base layer decoded. The tile is
/// owned by exactly one stage at a time (worker, output queue, cache); the
/// buffer is shared read-only with render snapshots and goes back to the
/// pool when the cache evicts the tile and no snapshot still holds it.
#[derive(Debug, Clone)]
pub struct Tile {
    spec: TileSpec,
    layer_ids: Vec<LayerId>,
    source_stamps: Vec<u64>,
    alphas: Vec<f32>,
    buffer: Arc<TileBuffer>,
}

impl Tile {
    /// Wrap `buffer`, composited from `layers`, as the tile for `spec`.
    pub fn new(spec: TileSpec, layers: &LayerStack, buffer: TileBuffer) -> Self {
        Self {
            spec,
            layer_ids: layers.ids(),
            source_stamps: layers.source_stamps(),
            alphas: layers.alphas(),
            buffer: Arc::new(buffer),
        }
    }

    pub fn spec(&self) -> TileSpec {
        self.spec
    }

    /// Ids of the layers this tile was composited from, base first.
    pub fn layer_ids(&self) -> &[LayerId] {
        &self.layer_ids
    }

    /// Alphas used for each layer, parallel to [`Tile::layer_ids`].
    pub fn alphas(&self) -> &[f32] {
        &self.alphas
    }

    pub fn buffer(&self) -> &Arc<TileBuffer> {
        &self.buffer
    }

    /// Returns true if the tile was composited from exactly these layers,
    /// over the same sources and with the same alphas.
    pub fn matches_layers(&self, layers: &LayerStack) -> bool {
        let layer_list = layers.layers();
        self.layer_ids.len() == layer_list.len()
            && layer_list.iter().enumerate().all(|(i, layer)| {
                self.layer_ids[i] == *layer.id()
                    && self.source_stamps[i] == layer.source_stamp()
                    && self.alphas[i] == layer.alpha()
            })
    }

    /// Consume the tile, returning its buffer.
    ///
    /// Fails with the shared buffer while a snapshot still holds it.
    pub fn into_buffer(self) -> Result<TileBuffer, Arc<TileBuffer>> {
        Arc::try_unwrap(self.buffer)
    }
}
