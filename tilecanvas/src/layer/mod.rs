//! Tile layers.
//!
//! A [`Layer`] binds a [`TileSource`] to a blend weight. Layers are stacked in
//! order: the first is the base layer, which must decode for a tile to exist;
//! every following layer is drawn over it with its own alpha.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::provider::TileSource;

/// Global counter for generated layer ids.
static LAYER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Global counter stamping each layer construction.
static SOURCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier of a layer.
///
/// Ids are cheap to clone and compare. Generated ids are unique for the
/// lifetime of the process. An id names a layer, not its source: an explicit
/// id may be reused for a new source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(Arc<str>);

impl LayerId {
    /// Generates a fresh, process-unique id.
    pub fn generate() -> Self {
        let n = LAYER_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(Arc::from(format!("layer-{}", n)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LayerId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for LayerId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tile source contributing to composited tiles with a blend weight.
///
/// Every constructed layer carries a process-unique source stamp. Clones and
/// [`Layer::with_alpha`] keep it, so two layers with the same id but built
/// over different sources never compare as the same source.
#[derive(Clone)]
pub struct Layer {
    id: LayerId,
    source: Arc<dyn TileSource>,
    source_stamp: u64,
    alpha: f32,
}

impl Layer {
    /// Create a fully opaque layer with a generated id.
    pub fn new(source: Arc<dyn TileSource>) -> Self {
        Self::with_id(LayerId::generate(), source, 1.0)
    }

    /// Create a layer with an explicit id and alpha.
    ///
    /// Alpha is clamped into `[0, 1]`; NaN becomes 0.
    pub fn with_id(id: impl Into<LayerId>, source: Arc<dyn TileSource>, alpha: f32) -> Self {
        Self {
            id: id.into(),
            source,
            source_stamp: SOURCE_COUNTER.fetch_add(1, Ordering::Relaxed),
            alpha: clamp_alpha(alpha),
        }
    }

    /// Returns a copy of this layer with a different alpha.
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = clamp_alpha(alpha);
        self
    }

    pub fn id(&self) -> &LayerId {
        &self.id
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    pub fn source_stamp(&self) -> u64 {
        self.source_stamp
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("source", &self.source.name())
            .field("source_stamp", &self.source_stamp)
            .field("alpha", &self.alpha)
            .finish()
    }
}

fn clamp_alpha(alpha: f32) -> f32 {
    if alpha.is_nan() {
        0.0
    } else {
        alpha.clamp(0.0, 1.0)
    }
}

/// Immutable, ordered list of layers shared between the canvas and workers.
///
/// A stack is replaced as a whole whenever layers or alphas change; workers
/// take the current stack when they start a spec and record its ids, source
/// stamps and alphas in the resulting tile.
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// The base layer, if any.
    pub fn primary(&self) -> Option<&Layer> {
        self.layers.first()
    }

    pub fn ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|l| l.id.clone()).collect()
    }

    pub fn source_stamps(&self) -> Vec<u64> {
        self.layers.iter().map(|l| l.source_stamp).collect()
    }

    pub fn alphas(&self) -> Vec<f32> {
        self.layers.iter().map(|l| l.alpha).collect()
    }

    /// Returns a stack whose base layer is replaced by a new layer over `source`.
    ///
    /// Overlays are kept.
    pub fn with_primary(&self, source: Arc<dyn TileSource>) -> Self {
        let mut layers = Vec::with_capacity(self.layers.len().max(1));
        layers.push(Layer::new(source));
        layers.extend(self.layers.iter().skip(1).cloned());
        Self { layers }
    }

    /// Returns a stack with the alpha of layer `id` replaced.
    ///
    /// Returns `None` if no layer has that id.
    pub fn with_alpha(&self, id: &LayerId, alpha: f32) -> Option<Self> {
        let index = self.layers.iter().position(|l| &l.id == id)?;
        let mut layers = self.layers.clone();
        layers[index] = layers[index].clone().with_alpha(alpha);
        Some(Self { layers })
    }
}
