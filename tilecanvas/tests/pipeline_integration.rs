//! Integration tests for the tile pipeline.
//!
//! These tests drive the public API end to end with in-memory sources:
//! - Collector: fetch, composite and deliver tiles, then go idle
//! - Canvas: resolve, cache and publish snapshots as the view moves
//! - Retention: coarse tiles keep covering regions the current level lacks
//! - File source: tiles read from a directory tree
//!
//! Run with: `cargo test --test pipeline_integration`

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tempfile::TempDir;
use tokio::runtime::Handle;
use tokio::time::timeout;

use tilecanvas::canvas::{CanvasConfig, RenderSnapshot, TileCanvasState};
use tilecanvas::collector::{CollectorConfig, TileCollector};
use tilecanvas::layer::{Layer, LayerStack};
use tilecanvas::pool::BufferPool;
use tilecanvas::provider::{BoxFuture, FileTileSource, ProviderError, TileSource};
use tilecanvas::resolver::Viewport;
use tilecanvas::telemetry::PipelineMetrics;
use tilecanvas::tile::{Tile, TileSpec};

// ============================================================================
// Helper Functions
// ============================================================================

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

/// Geometry shared by the canvas tests: two levels over a 64×64 map of
/// 16-pixel tiles.
const LEVELS: u8 = 2;
const SIZE: u32 = 64;
const TILE: u32 = 16;

fn png(color: [u8; 4]) -> Bytes {
    let image = RgbaImage::from_pixel(TILE, TILE, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    Bytes::from(out.into_inner())
}

/// In-memory pyramid with optional per-tile latency.
#[derive(Default)]
struct MemorySource {
    tiles: Mutex<HashMap<(u32, u32, u8), Bytes>>,
    delays: Mutex<HashMap<(u32, u32, u8), Duration>>,
    fetches: AtomicUsize,
}

impl MemorySource {
    /// Every tile of `zoom` filled with `color`.
    fn with_level(self, zoom: u8, color: [u8; 4]) -> Self {
        let cells = SIZE / (TILE << (LEVELS - 1 - zoom));
        let data = png(color);
        {
            let mut tiles = self.tiles.lock();
            for row in 0..cells {
                for col in 0..cells {
                    tiles.insert((row, col, zoom), data.clone());
                }
            }
        }
        self
    }

    fn with_delay(self, row: u32, col: u32, zoom: u8, delay: Duration) -> Self {
        self.delays.lock().insert((row, col, zoom), delay);
        self
    }
}

impl TileSource for MemorySource {
    fn fetch(&self, row: u32, col: u32, zoom: u8) -> BoxFuture<'_, Result<Option<Bytes>, ProviderError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let data = self.tiles.lock().get(&(row, col, zoom)).cloned();
        let delay = self.delays.lock().get(&(row, col, zoom)).copied();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(data)
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn single_layer(source: Arc<dyn TileSource>) -> LayerStack {
    LayerStack::new(vec![Layer::with_id("base", source, 1.0)])
}

fn start_collector(layers: LayerStack) -> (TileCollector, tokio::sync::mpsc::Receiver<Tile>) {
    let config = CollectorConfig::default()
        .with_worker_count(3)
        .with_tile_size(TILE);
    TileCollector::start(
        config,
        layers,
        Arc::new(BufferPool::new(16)),
        Arc::new(PipelineMetrics::new()),
    )
    .unwrap()
}

fn start_canvas(layers: LayerStack) -> TileCanvasState {
    let pool = Arc::new(BufferPool::new(32));
    let config = CollectorConfig::default()
        .with_worker_count(3)
        .with_tile_size(TILE);
    let (collector, tiles) = TileCollector::start(
        config,
        layers,
        Arc::clone(&pool),
        Arc::new(PipelineMetrics::new()),
    )
    .unwrap();
    TileCanvasState::start(
        &Handle::current(),
        CanvasConfig::new(LEVELS, SIZE, SIZE, TILE),
        collector,
        tiles,
        pool,
    )
}

async fn settled(canvas: &TileCanvasState) -> Arc<RenderSnapshot> {
    timeout(Duration::from_secs(5), canvas.wait_settled())
        .await
        .expect("canvas did not settle")
}

fn specs(snapshot: &RenderSnapshot) -> Vec<TileSpec> {
    snapshot.iter().map(|t| t.spec).collect()
}

// ============================================================================
// Collector
// ============================================================================

#[tokio::test]
async fn test_collector_delivers_every_submitted_spec() {
    let source = Arc::new(MemorySource::default().with_level(1, RED));
    let (collector, mut tiles) = start_collector(single_layer(source));

    let mut submitted: Vec<TileSpec> = (0..4)
        .flat_map(|row| (0..2).map(move |col| TileSpec::new(1, row, col)))
        .collect();
    submitted.shuffle(&mut rand::rng());

    let receiver = tokio::spawn(async move {
        let mut received = Vec::new();
        while received.len() < 8 {
            match tiles.recv().await {
                Some(tile) => received.push(tile),
                None => break,
            }
        }
        received
    });
    for spec in &submitted {
        collector.submit(*spec).await.unwrap();
    }

    let received = timeout(Duration::from_secs(5), receiver)
        .await
        .expect("tiles not delivered")
        .unwrap();
    let mut got: Vec<TileSpec> = received.iter().map(|t| t.spec()).collect();
    got.sort();
    let mut want = submitted.clone();
    want.sort();
    assert_eq!(got, want);
    assert!(received
        .iter()
        .all(|t| t.buffer().pixel(0, 0) == Some(RED)));

    timeout(Duration::from_secs(5), collector.wait_idle())
        .await
        .expect("collector did not go idle");
    let metrics = collector.metrics().snapshot();
    assert_eq!(metrics.tiles_completed, 8);
    assert_eq!(metrics.tiles_failed, 0);
}

#[tokio::test]
async fn test_collector_shutdown_closes_tile_stream() {
    let source = Arc::new(
        MemorySource::default()
            .with_level(1, RED)
            .with_delay(0, 0, 1, Duration::from_secs(30)),
    );
    let (collector, mut tiles) = start_collector(single_layer(source));
    collector.submit(TileSpec::new(1, 0, 0)).await.unwrap();

    collector.shutdown();
    assert!(collector.is_shut_down());

    let end = timeout(Duration::from_secs(5), async {
        while tiles.recv().await.is_some() {}
    })
    .await;
    assert!(end.is_ok(), "tile stream stayed open after shutdown");
    assert!(collector.submit(TileSpec::new(1, 0, 1)).await.is_err());
}

// ============================================================================
// Canvas
// ============================================================================

#[tokio::test]
async fn test_canvas_result_independent_of_arrival_order() {
    let slow = Duration::from_millis(80);

    let first = MemorySource::default()
        .with_level(1, RED)
        .with_delay(0, 0, 1, slow);
    let second = MemorySource::default()
        .with_level(1, RED)
        .with_delay(1, 1, 1, slow);

    let mut results = Vec::new();
    for source in [first, second] {
        let canvas = start_canvas(single_layer(Arc::new(source)));
        canvas.set_viewport(Some(Viewport::new(0, 0, 32, 32)), 1.0);
        let snapshot = settled(&canvas).await;
        results.push(specs(&snapshot));
        canvas.shutdown_and_wait().await;
    }

    assert_eq!(results[0].len(), 4);
    assert_eq!(results[0], results[1]);
}

#[tokio::test]
async fn test_canvas_overlay_blend() {
    let base = Arc::new(MemorySource::default().with_level(1, RED));
    let overlay = Arc::new(MemorySource::default().with_level(1, BLUE));
    let layers = LayerStack::new(vec![
        Layer::with_id("base", base, 1.0),
        Layer::with_id("overlay", overlay, 0.5),
    ]);
    let canvas = start_canvas(layers);
    canvas.set_viewport(Some(Viewport::new(0, 0, 16, 16)), 1.0);

    let snapshot = settled(&canvas).await;
    assert_eq!(snapshot.len(), 1);
    let tile = &snapshot.tiles[0];
    assert_eq!(tile.alphas, vec![1.0, 0.5]);
    assert_eq!(tile.buffer.pixel(8, 8), Some([128, 0, 128, 255]));
}

#[tokio::test]
async fn test_coarse_tiles_cover_missing_fine_level() {
    // Only level 1 exists, so zooming out leaves level 0 empty
    let source = Arc::new(MemorySource::default().with_level(1, RED));
    let canvas = start_canvas(single_layer(source));

    canvas.set_viewport(Some(Viewport::new(0, 0, 64, 64)), 1.0);
    let snapshot = settled(&canvas).await;
    assert_eq!(snapshot.level, Some(1));
    assert_eq!(snapshot.len(), 16);

    // Many passes, well beyond the grace period
    for _ in 0..12 {
        canvas.set_viewport(Some(Viewport::new(0, 0, 32, 32)), 0.5);
        settled(&canvas).await;
    }

    let snapshot = settled(&canvas).await;
    assert_eq!(snapshot.level, Some(0));
    assert_eq!(snapshot.len(), 16);
    assert!(snapshot.iter().all(|t| t.spec.zoom() == 1));
}

#[tokio::test]
async fn test_scrolling_away_releases_tiles() {
    let source = Arc::new(MemorySource::default().with_level(1, RED));
    let canvas = start_canvas(single_layer(source));

    canvas.set_viewport(Some(Viewport::new(0, 0, 16, 16)), 1.0);
    assert!(settled(&canvas).await.contains(&TileSpec::new(1, 0, 0)));

    for _ in 0..12 {
        canvas.set_viewport(Some(Viewport::new(48, 48, 64, 64)), 1.0);
        settled(&canvas).await;
    }

    let snapshot = settled(&canvas).await;
    assert_eq!(specs(&snapshot), vec![TileSpec::new(1, 3, 3)]);
    assert!(canvas.metrics().snapshot().tiles_evicted >= 1);
}

// ============================================================================
// File source
// ============================================================================

#[tokio::test]
async fn test_file_source_pyramid() {
    let dir = TempDir::new().unwrap();
    let tile_dir = dir.path().join("1").join("0");
    std::fs::create_dir_all(&tile_dir).unwrap();
    std::fs::write(tile_dir.join("0.png"), png(BLUE)).unwrap();

    let source = FileTileSource::with_template(dir.path(), "{zoom}/{row}/{col}.png").unwrap();
    let canvas = start_canvas(single_layer(Arc::new(source)));
    canvas.set_viewport(Some(Viewport::new(0, 0, 32, 32)), 1.0);

    let snapshot = settled(&canvas).await;
    // Three of the four visible tiles have no file
    assert_eq!(specs(&snapshot), vec![TileSpec::new(1, 0, 0)]);
    assert_eq!(snapshot.tiles[0].buffer.pixel(0, 0), Some(BLUE));
    assert_eq!(canvas.metrics().snapshot().tiles_failed, 3);
}
