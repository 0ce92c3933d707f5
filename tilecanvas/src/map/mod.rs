//! Map facade.
//!
//! [`MapState`] ties a [`ViewState`] to a running tile pipeline. Every view
//! change recomputes the viewport and hands it to the canvas, which resolves
//! and fetches in the background and publishes render snapshots.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tilecanvas::map::{MapConfig, MapState};
//! use tilecanvas::provider::FileTileSource;
//!
//! # async fn run() -> Result<(), tilecanvas::map::MapError> {
//! let source = Arc::new(FileTileSource::new("/data/tiles"));
//! let map = MapState::new(MapConfig::new(5, 8192, 8192), source)?;
//! map.set_layout_size(1280, 720);
//! map.set_scale(0.5);
//! let snapshot = map.wait_settled().await;
//! println!("{} tiles to draw", snapshot.len());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod view;

pub use config::{ConfigError, MapConfig, DEFAULT_MAX_SCALE, FIT_MIN_SCALE, MAX_LEVEL_COUNT};
pub use error::MapError;
pub use view::{BoundingBox, ScreenOffset, ViewState, VisibleArea};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::canvas::{RenderSnapshot, TileCanvasState};
use crate::collector::TileCollector;
use crate::layer::{Layer, LayerId, LayerStack};
use crate::pool::BufferPool;
use crate::provider::TileSource;
use crate::telemetry::PipelineMetrics;

/// A map view backed by a tile pipeline.
pub struct MapState {
    config: MapConfig,
    view: Mutex<ViewState>,
    layout_tx: watch::Sender<Option<(u32, u32)>>,
    canvas: TileCanvasState,
}

impl MapState {
    /// Validate `config` and start the pipeline with `primary_source` as the
    /// only layer.
    ///
    /// Must be called from within a tokio runtime; the canvas reactor is
    /// spawned on it while tile workers get a runtime of their own.
    pub fn new(config: MapConfig, primary_source: Arc<dyn TileSource>) -> Result<Self, MapError> {
        config.validate()?;
        let handle = Handle::try_current().map_err(|e| MapError::Runtime(e.to_string()))?;

        let pool = Arc::new(BufferPool::new(config.pool_capacity));
        let metrics = Arc::new(PipelineMetrics::new());
        let layers = LayerStack::new(vec![Layer::new(primary_source)]);

        let (collector, tiles_rx) = TileCollector::start(
            config.collector_config(),
            layers,
            Arc::clone(&pool),
            metrics,
        )?;
        let canvas =
            TileCanvasState::start(&handle, config.canvas_config(), collector, tiles_rx, pool);

        let view = ViewState::new(
            config.full_width,
            config.full_height,
            config.min_scale,
            config.max_scale,
            config.padding,
        );
        let (layout_tx, _) = watch::channel(None);

        info!(
            levels = config.level_count,
            width = config.full_width,
            height = config.full_height,
            tile_size = config.tile_size,
            "Map started"
        );

        Ok(Self {
            config,
            view: Mutex::new(view),
            layout_tx,
            canvas,
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Apply `update` to the view and push the resulting viewport.
    fn update_view(&self, update: impl FnOnce(&mut ViewState)) {
        if self.canvas.is_shut_down() {
            return;
        }
        let (viewport, scale) = {
            let mut view = self.view.lock();
            update(&mut view);
            (view.viewport(), view.scale())
        };
        self.canvas.set_viewport(viewport, scale);
    }

    async fn wait_layout(&self) {
        let mut rx = self.layout_tx.subscribe();
        let _ = rx.wait_for(Option::is_some).await;
    }

    /// Record a new layout measurement. Zero sizes are ignored.
    pub fn set_layout_size(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.update_view(|view| view.set_layout_size(width, height));
        self.layout_tx.send_if_modified(|layout| {
            let changed = *layout != Some((width, height));
            *layout = Some((width, height));
            changed
        });
        debug!(width, height, "Layout size changed");
    }

    pub fn set_scale(&self, scale: f64) {
        self.update_view(|view| view.set_scale(scale));
    }

    /// Set the rotation, in degrees.
    pub fn set_rotation(&self, degrees: f64) {
        self.update_view(|view| view.set_rotation(degrees));
    }

    pub fn scroll_by(&self, dx: f64, dy: f64) {
        self.update_view(|view| view.scroll_by(dx, dy));
    }

    pub fn scale(&self) -> f64 {
        self.view.lock().scale()
    }

    pub fn rotation(&self) -> f64 {
        self.view.lock().rotation()
    }

    pub fn scroll(&self) -> (f64, f64) {
        self.view.lock().scroll()
    }

    /// Copy of the current view.
    pub fn view(&self) -> ViewState {
        self.view.lock().clone()
    }

    /// Scroll to `(x, y)` in scaled pixels, once the layout is known.
    pub async fn set_scroll(&self, x: f64, y: f64) {
        self.wait_layout().await;
        self.update_view(|view| view.set_scroll(x, y));
    }

    /// Bring the normalised point `(x, y)` to `offset` on the layout, once
    /// the layout is known.
    pub async fn snap_scroll_to(&self, x: f64, y: f64, offset: ScreenOffset) {
        self.wait_layout().await;
        self.update_view(|view| view.snap_scroll_to(x, y, offset));
    }

    /// Normalised bounding box of the visible area.
    pub async fn visible_bounding_box(&self) -> BoundingBox {
        self.wait_layout().await;
        let view = self.view.lock();
        // Layout is set before the watch is, so the box exists here.
        view.visible_bounding_box().unwrap_or(BoundingBox {
            x_left: 0.0,
            y_top: 0.0,
            x_right: 0.0,
            y_bottom: 0.0,
        })
    }

    pub async fn layout_size(&self) -> (u32, u32) {
        let mut rx = self.layout_tx.subscribe();
        let size = match rx.wait_for(Option::is_some).await {
            Ok(layout) => (*layout).unwrap_or_default(),
            Err(_) => (0, 0),
        };
        size
    }

    /// Replace the base layer, keeping overlays.
    pub fn set_primary_layer(&self, source: Arc<dyn TileSource>) {
        self.canvas.update_layers(|layers| Some(layers.with_primary(source)));
    }

    /// Replace every layer.
    pub fn set_layers(&self, layers: Vec<Layer>) {
        self.canvas.set_layers(LayerStack::new(layers));
    }

    /// Change the blend weight of one layer. Returns `false` if no layer has
    /// that id.
    pub fn set_layer_alpha(&self, id: &LayerId, alpha: f32) -> bool {
        self.canvas.update_layers(|layers| layers.with_alpha(id, alpha))
    }

    pub fn layers(&self) -> Arc<LayerStack> {
        self.canvas.layers()
    }

    /// Drop every cached tile and fetch the visible ones again.
    pub fn redraw_tiles(&self) {
        self.canvas.redraw();
    }

    pub fn snapshot(&self) -> Arc<RenderSnapshot> {
        self.canvas.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<RenderSnapshot>> {
        self.canvas.subscribe()
    }

    /// Wait for a settled snapshot reflecting every update made so far.
    pub async fn wait_settled(&self) -> Arc<RenderSnapshot> {
        self.canvas.wait_settled().await
    }

    pub fn is_idle(&self) -> bool {
        self.canvas.is_idle()
    }

    pub async fn wait_idle(&self) {
        self.canvas.wait_idle().await;
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        self.canvas.metrics()
    }

    pub fn is_shut_down(&self) -> bool {
        self.canvas.is_shut_down()
    }

    /// Stop the pipeline. Later updates are ignored.
    pub fn shutdown(&self) {
        if !self.canvas.is_shut_down() {
            info!("Map shutting down");
        }
        self.canvas.shutdown();
    }

    /// Stop the pipeline and wait for cached tiles to be released.
    pub async fn shutdown_and_wait(&self) {
        self.shutdown();
        self.canvas.shutdown_and_wait().await;
    }
}

impl std::fmt::Debug for MapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapState")
            .field("view", &*self.view.lock())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
