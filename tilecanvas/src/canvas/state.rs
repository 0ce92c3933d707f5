//! Canvas reactor and its handle.
//!
//! The reactor is the single owner of the tile cache. It reacts to four
//! kinds of events:
//!
//! ```text
//! view update ──► resolve ──► diff against cache ──► pending queue ──► collector
//! completed tile ──► cache insert (or re-queue if stale) ──► evict
//! layer change ──► collector + cache adopt the new stack ──► re-resolve
//! collector idle flip ──► snapshot refresh
//! ```
//!
//! Submissions never block the reactor: specs the collector cannot take
//! right now stay in the pending queue and are sent as soon as inbound
//! capacity frees. The pending queue is rebuilt on every pass, so specs that
//! stopped being required are never sent.
//!
//! A stale tile arrives while its spec is still in flight, so resubmitting
//! it at once would be deduplicated away. Such specs wait in a retry set
//! until the collector goes idle.
//!
//! Released tiles may still be drawn from a published snapshot. Their
//! buffers are retired and handed back to the pool once no snapshot shares
//! them anymore.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::{SendError, TrySendError};
use tokio::sync::mpsc::OwnedPermit;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::cache::{EvictionPolicy, Insertion, TileCache};
use super::snapshot::RenderSnapshot;
use super::throttle::{RenderThrottle, DEFAULT_RENDER_THROTTLE};
use crate::collector::{CollectorStatus, TileCollector};
use crate::layer::LayerStack;
use crate::pool::BufferPool;
use crate::resolver::{LevelPolicy, Viewport, VisibleTilesResolver};
use crate::telemetry::PipelineMetrics;
use crate::tile::{Tile, TileBuffer, TileSpec};

/// Canvas geometry and retention settings.
#[derive(Debug, Clone)]
pub struct CanvasConfig {
    pub level_count: u8,
    pub full_width: u32,
    pub full_height: u32,
    pub tile_size: u32,
    pub level_policy: LevelPolicy,
    pub eviction: EvictionPolicy,
    pub render_throttle: Duration,
}

impl CanvasConfig {
    pub fn new(level_count: u8, full_width: u32, full_height: u32, tile_size: u32) -> Self {
        Self {
            level_count,
            full_width,
            full_height,
            tile_size,
            level_policy: LevelPolicy::default(),
            eviction: EvictionPolicy::default(),
            render_throttle: DEFAULT_RENDER_THROTTLE,
        }
    }
}

/// Latest view to resolve. Only the most recent one matters.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ViewRequest {
    viewport: Option<Viewport>,
    scale: f64,
    revision: u64,
}

enum Command {
    SetLayers(LayerStack, u64),
    Redraw(u64),
}

/// What woke the reactor up.
enum Event {
    Shutdown,
    Tile(Tile),
    Command(Command),
    ViewChanged,
    Permit(Result<OwnedPermit<TileSpec>, SendError<()>>),
    StatusChanged,
    Tick,
}

/// Handle to the canvas reactor.
///
/// Updates are fire-and-forget and never block; the renderer reads the
/// latest [`RenderSnapshot`] through [`TileCanvasState::snapshot`] or
/// awaits changes through [`TileCanvasState::subscribe`].
pub struct TileCanvasState {
    view_tx: watch::Sender<ViewRequest>,
    command_tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<Arc<RenderSnapshot>>,
    collector: Arc<TileCollector>,
    /// Latest stack handed to the reactor. Updated before the command is
    /// sent, so read-modify-write callers never see an older stack.
    layers: Mutex<Arc<LayerStack>>,
    revision: AtomicU64,
    shutdown: CancellationToken,
    reactor: Mutex<Option<JoinHandle<()>>>,
}

impl TileCanvasState {
    /// Spawn the reactor on `handle`, feeding `collector`.
    ///
    /// `tiles_rx` is the collector's completed-tile receiver and `pool` the
    /// pool its workers draw buffers from.
    pub fn start(
        handle: &Handle,
        config: CanvasConfig,
        collector: TileCollector,
        tiles_rx: mpsc::Receiver<Tile>,
        pool: Arc<BufferPool<TileBuffer>>,
    ) -> Self {
        let collector = Arc::new(collector);
        let layers = collector.layers();

        let (view_tx, view_rx) = watch::channel(ViewRequest {
            viewport: None,
            scale: 1.0,
            revision: 0,
        });
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(RenderSnapshot::default()));
        let shutdown = CancellationToken::new();
        let initial_view = *view_rx.borrow();

        let mut cache = TileCache::new(config.tile_size, config.level_count, config.eviction);
        cache.set_layers(&layers);

        let reactor = Reactor {
            resolver: VisibleTilesResolver::new(
                config.level_count,
                config.full_width,
                config.full_height,
                config.tile_size,
                config.level_policy,
            ),
            cache,
            pending: VecDeque::new(),
            stale_retry: HashSet::new(),
            retired: Vec::new(),
            submitted: 0,
            view: initial_view,
            revision: 0,
            generation: 0,
            view_rx,
            command_rx,
            tiles_rx,
            inbound: collector.inbound(),
            status_rx: collector.status_watch(),
            collector: Arc::clone(&collector),
            snapshot_tx,
            throttle: RenderThrottle::new(config.render_throttle),
            pool,
            metrics: Arc::clone(collector.metrics()),
        };
        let task = handle.spawn(reactor.run(shutdown.clone()));

        Self {
            view_tx,
            command_tx,
            snapshot_rx,
            collector,
            layers: Mutex::new(layers),
            revision: AtomicU64::new(0),
            shutdown,
            reactor: Mutex::new(Some(task)),
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Resolve a new view. `None` means the layout is not measured yet.
    pub fn set_viewport(&self, viewport: Option<Viewport>, scale: f64) {
        if self.is_shut_down() {
            return;
        }
        let revision = self.next_revision();
        self.view_tx.send_replace(ViewRequest {
            viewport,
            scale,
            revision,
        });
    }

    /// Replace the layer stack. Cached tiles become stale and are refetched.
    pub fn set_layers(&self, layers: LayerStack) {
        self.update_layers(|_| Some(layers));
    }

    /// Derive a new layer stack from the current one.
    ///
    /// `update` runs under the stack lock, so concurrent updates apply in
    /// order and none is lost. Returns `false` if `update` returned `None`
    /// or the canvas is shut down.
    pub fn update_layers<F>(&self, update: F) -> bool
    where
        F: FnOnce(&LayerStack) -> Option<LayerStack>,
    {
        if self.is_shut_down() {
            return false;
        }
        let mut current = self.layers.lock();
        let Some(layers) = update(&current) else {
            return false;
        };
        *current = Arc::new(layers.clone());
        let revision = self.next_revision();
        let _ = self.command_tx.send(Command::SetLayers(layers, revision));
        true
    }

    /// Drop every cached tile and fetch the current view again.
    pub fn redraw(&self) {
        if self.is_shut_down() {
            return;
        }
        let revision = self.next_revision();
        let _ = self.command_tx.send(Command::Redraw(revision));
    }

    /// Current layer stack, including updates the reactor has not applied yet.
    pub fn layers(&self) -> Arc<LayerStack> {
        Arc::clone(&self.layers.lock())
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<RenderSnapshot> {
        Arc::clone(&self.snapshot_rx.borrow())
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RenderSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Wait until a snapshot reflecting every update made so far is settled.
    ///
    /// Returns the settled snapshot, or the latest one if the canvas shut
    /// down meanwhile.
    pub async fn wait_settled(&self) -> Arc<RenderSnapshot> {
        let revision = self.revision.load(Ordering::SeqCst);
        let mut rx = self.snapshot_rx.clone();
        let result = rx
            .wait_for(|s| s.settled && s.revision >= revision)
            .await
            .map(|s| Arc::clone(&s));
        match result {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.collector.is_idle()
    }

    pub async fn wait_idle(&self) {
        self.collector.wait_idle().await;
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        self.collector.metrics()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop the reactor and the collector. Later updates are ignored.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.collector.shutdown();
    }

    /// Shut down and wait for the reactor to release its tiles.
    pub async fn shutdown_and_wait(&self) {
        self.shutdown();
        let task = self.reactor.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for TileCanvasState {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Reactor {
    resolver: VisibleTilesResolver,
    cache: TileCache,
    pending: VecDeque<TileSpec>,
    /// Required specs whose tile came back stale, resubmitted once idle.
    stale_retry: HashSet<TileSpec>,
    /// Buffers of released tiles still shared with a snapshot.
    retired: Vec<Arc<TileBuffer>>,
    /// Specs handed to the collector's inbound queue so far.
    submitted: u64,
    view: ViewRequest,
    /// Latest update revision applied.
    revision: u64,
    generation: u64,
    view_rx: watch::Receiver<ViewRequest>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    tiles_rx: mpsc::Receiver<Tile>,
    inbound: mpsc::Sender<TileSpec>,
    status_rx: watch::Receiver<CollectorStatus>,
    collector: Arc<TileCollector>,
    snapshot_tx: watch::Sender<Arc<RenderSnapshot>>,
    throttle: RenderThrottle,
    pool: Arc<BufferPool<TileBuffer>>,
    metrics: Arc<PipelineMetrics>,
}

impl Reactor {
    async fn run(mut self, shutdown: CancellationToken) {
        info!("Canvas reactor starting");
        self.throttle.mark_dirty();

        loop {
            let deadline = self.throttle.deadline();
            let inbound = self.inbound.clone();

            let event = tokio::select! {
                biased;

                _ = shutdown.cancelled() => Event::Shutdown,

                Some(tile) = self.tiles_rx.recv() => Event::Tile(tile),

                Some(command) = self.command_rx.recv() => Event::Command(command),

                Ok(()) = self.view_rx.changed() => Event::ViewChanged,

                permit = inbound.reserve_owned(), if !self.pending.is_empty() => Event::Permit(permit),

                Ok(()) = self.status_rx.changed() => Event::StatusChanged,

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Event::Tick,
            };

            match event {
                Event::Shutdown => break,
                Event::Tile(tile) => self.on_tile(tile),
                Event::Command(command) => self.on_command(command),
                Event::ViewChanged => {
                    self.view = *self.view_rx.borrow_and_update();
                    self.revision = self.revision.max(self.view.revision);
                    self.resolve_pass();
                }
                Event::Permit(Ok(permit)) => {
                    if let Some(spec) = self.pending.pop_front() {
                        permit.send(spec);
                        self.submitted += 1;
                        self.throttle.mark_dirty();
                    }
                }
                Event::Permit(Err(_)) => {
                    debug!("Collector inbound closed, dropping pending specs");
                    self.pending.clear();
                }
                Event::StatusChanged => {
                    let status = *self.status_rx.borrow_and_update();
                    if status.is_idle() {
                        self.retry_stale();
                    }
                    self.throttle.mark_dirty();
                }
                Event::Tick => {}
            }

            if self.throttle.try_render(Instant::now()) {
                self.publish();
            }
        }

        let released = self.cache.clear();
        debug!(tiles = released.len(), "Canvas reactor releasing tiles");
        self.release(released);
        self.generation += 1;
        self.snapshot_tx.send_replace(Arc::new(RenderSnapshot {
            generation: self.generation,
            revision: self.revision,
            ..Default::default()
        }));
        self.reclaim();
        info!(still_shared = self.retired.len(), "Canvas reactor stopped");
    }

    fn resolve_pass(&mut self) {
        let (required, level) = match self.view.viewport {
            Some(viewport) => match self.resolver.visible_tiles(&viewport, self.view.scale) {
                Some(visible) => (visible.specs().collect::<HashSet<_>>(), Some(visible.level)),
                None => (HashSet::new(), Some(self.resolver.level_for_scale(self.view.scale))),
            },
            None => (HashSet::new(), None),
        };

        let outcome = self.cache.apply_pass(required, level);
        trace!(
            pass = self.cache.pass(),
            level = ?level,
            required = self.cache.required().len(),
            newly_required = outcome.newly_required,
            to_fetch = outcome.to_fetch.len(),
            released = outcome.released.len(),
            "Resolve pass"
        );

        self.release(outcome.released);
        self.pending = outcome.to_fetch.into();
        self.flush_pending();
        self.throttle.mark_dirty();
    }

    /// Submit pending specs while the collector has room.
    fn flush_pending(&mut self) {
        while let Some(&spec) = self.pending.front() {
            match self.inbound.try_reserve() {
                Ok(permit) => {
                    permit.send(spec);
                    self.pending.pop_front();
                    self.submitted += 1;
                }
                Err(TrySendError::Full(())) => {
                    self.metrics.submissions_coalesced(self.pending.len());
                    break;
                }
                Err(TrySendError::Closed(())) => {
                    self.pending.clear();
                    break;
                }
            }
        }
    }

    fn on_tile(&mut self, tile: Tile) {
        let spec = tile.spec();
        match self.cache.insert(tile) {
            Insertion::Accepted { visible, released } => {
                trace!(%spec, visible, "Tile cached");
                self.release(released);
                self.throttle.mark_dirty();
            }
            Insertion::Stale(stale) => {
                trace!(%spec, "Discarding tile built from outdated layers");
                self.release(vec![stale]);
                if self.cache.is_required(&spec) {
                    self.stale_retry.insert(spec);
                }
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::SetLayers(layers, revision) => {
                info!(layers = layers.len(), "Layer stack changed");
                self.revision = self.revision.max(revision);
                self.collector.set_layers(layers.clone());
                let released = self.cache.set_layers(&layers);
                self.release(released);
            }
            Command::Redraw(revision) => {
                debug!("Redrawing all tiles");
                self.revision = self.revision.max(revision);
                let released = self.cache.clear();
                self.release(released);
            }
        }
        self.resolve_pass();
    }

    /// Queue required specs whose last tile came back stale.
    fn retry_stale(&mut self) {
        let retry: Vec<TileSpec> = self
            .stale_retry
            .drain()
            .filter(|spec| self.cache.is_required(spec) && !self.cache.has_fresh(spec))
            .collect();
        if retry.is_empty() {
            return;
        }
        debug!(specs = retry.len(), "Refetching tiles built from outdated layers");
        for spec in retry {
            if !self.pending.contains(&spec) {
                self.pending.push_back(spec);
            }
        }
        self.flush_pending();
    }

    /// Return buffers of released tiles to the pool. Buffers still shared
    /// with a published snapshot are retired until the next publish.
    fn release(&mut self, tiles: Vec<Tile>) {
        if tiles.is_empty() {
            return;
        }
        self.metrics.tiles_evicted(tiles.len());
        for tile in tiles {
            match tile.into_buffer() {
                Ok(buffer) => {
                    self.pool.put(buffer);
                }
                Err(shared) => self.retired.push(shared),
            }
        }
    }

    /// Hand retired buffers no snapshot holds anymore back to the pool.
    fn reclaim(&mut self) {
        if self.retired.is_empty() {
            return;
        }
        let retired = std::mem::take(&mut self.retired);
        let total = retired.len();
        for buffer in retired {
            match Arc::try_unwrap(buffer) {
                Ok(buffer) => {
                    self.pool.put(buffer);
                }
                Err(shared) => self.retired.push(shared),
            }
        }
        trace!(
            reclaimed = total - self.retired.len(),
            still_shared = self.retired.len(),
            "Reclaimed retired buffers"
        );
    }

    fn settled(&self) -> bool {
        let status = *self.status_rx.borrow();
        self.pending.is_empty()
            && self.stale_retry.is_empty()
            && status.is_idle()
            && status.received >= self.submitted
    }

    fn publish(&mut self) {
        self.generation += 1;
        let snapshot = RenderSnapshot {
            generation: self.generation,
            revision: self.revision,
            level: self.cache.level(),
            tiles: self.cache.drawable(),
            settled: self.settled(),
        };
        trace!(
            generation = snapshot.generation,
            tiles = snapshot.tiles.len(),
            settled = snapshot.settled,
            "Publishing snapshot"
        );
        self.snapshot_tx.send_replace(Arc::new(snapshot));
        self.reclaim();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::cache::DEFAULT_GRACE_PASSES;
    use crate::collector::CollectorConfig;
    use crate::layer::{Layer, LayerId};
    use crate::provider::tests::StaticSource;
    use crate::provider::TileSource;
    use tokio::time::timeout;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn stack(source: Arc<dyn TileSource>) -> LayerStack {
        LayerStack::new(vec![Layer::with_id("base", source, 1.0)])
    }

    /// Two levels over a 64×64 map of 16-pixel tiles.
    fn start_canvas(source: Arc<dyn TileSource>) -> TileCanvasState {
        start_canvas_with_pool(source, Arc::new(BufferPool::new(32)))
    }

    fn start_canvas_with_pool(
        source: Arc<dyn TileSource>,
        pool: Arc<BufferPool<TileBuffer>>,
    ) -> TileCanvasState {
        let metrics = Arc::new(PipelineMetrics::new());
        let config = CollectorConfig::default()
            .with_worker_count(2)
            .with_tile_size(16);
        let (collector, tiles) =
            TileCollector::start(config, stack(source), Arc::clone(&pool), metrics).unwrap();
        TileCanvasState::start(
            &Handle::current(),
            CanvasConfig::new(2, 64, 64, 16),
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

    #[tokio::test]
    async fn test_viewport_tiles_reach_snapshot() {
        let canvas = start_canvas(Arc::new(StaticSource::solid(16, RED)));
        canvas.set_viewport(Some(Viewport::new(0, 0, 32, 32)), 1.0);

        let snapshot = settled(&canvas).await;
        assert_eq!(snapshot.level, Some(1));
        assert_eq!(snapshot.len(), 4);
        for (row, col) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            assert!(snapshot.contains(&TileSpec::new(1, row, col)));
        }
        assert!(snapshot.iter().all(|t| t.buffer.pixel(0, 0) == Some(RED)));
    }

    #[tokio::test]
    async fn test_no_layout_settles_empty() {
        let source = Arc::new(StaticSource::solid(16, RED));
        let canvas = start_canvas(Arc::clone(&source) as Arc<dyn TileSource>);
        canvas.set_viewport(None, 1.0);

        let snapshot = settled(&canvas).await;
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.level, None);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_tiles_settle_without_tiles() {
        let canvas = start_canvas(Arc::new(StaticSource::missing()));
        canvas.set_viewport(Some(Viewport::new(0, 0, 64, 64)), 1.0);

        let snapshot = settled(&canvas).await;
        assert!(snapshot.is_empty());
        assert_eq!(canvas.metrics().snapshot().tiles_failed, 16);
    }

    #[tokio::test]
    async fn test_cached_tiles_not_refetched() {
        let source = Arc::new(StaticSource::solid(16, RED));
        let canvas = start_canvas(Arc::clone(&source) as Arc<dyn TileSource>);

        canvas.set_viewport(Some(Viewport::new(0, 0, 32, 32)), 1.0);
        settled(&canvas).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 4);

        // Shift by one tile: only the new column is fetched
        canvas.set_viewport(Some(Viewport::new(16, 0, 48, 32)), 1.0);
        let snapshot = settled(&canvas).await;
        assert!(snapshot.contains(&TileSpec::new(1, 0, 2)));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_source_swap_under_same_id_replaces_tiles() {
        let canvas = start_canvas(Arc::new(StaticSource::solid(16, RED)));
        canvas.set_viewport(Some(Viewport::new(0, 0, 32, 32)), 1.0);
        settled(&canvas).await;

        // Same layer id and alpha, different source
        let blue = Arc::new(StaticSource::solid(16, BLUE));
        canvas.set_layers(stack(Arc::clone(&blue) as Arc<dyn TileSource>));
        let snapshot = settled(&canvas).await;
        assert_eq!(snapshot.len(), 4);
        assert!(snapshot.iter().all(|t| t.buffer.pixel(0, 0) == Some(BLUE)));
        assert_eq!(blue.fetches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_layers_visible_before_reactor_applies_them() {
        let canvas = start_canvas(Arc::new(StaticSource::solid(16, RED)));
        canvas.set_layers(LayerStack::new(vec![
            Layer::with_id("base", Arc::new(StaticSource::solid(16, RED)), 1.0),
            Layer::with_id("roads", Arc::new(StaticSource::solid(16, BLUE)), 1.0),
        ]));
        assert_eq!(canvas.layers().len(), 2);

        let faded = canvas.update_layers(|layers| layers.with_alpha(&LayerId::from("roads"), 0.5));
        assert!(faded);
        assert!(!canvas.update_layers(|layers| layers.with_alpha(&LayerId::from("rail"), 0.5)));
        assert_eq!(canvas.layers().alphas(), vec![1.0, 0.5]);

        canvas.set_viewport(Some(Viewport::new(0, 0, 16, 16)), 1.0);
        let snapshot = settled(&canvas).await;
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.iter().all(|t| t.alphas == vec![1.0, 0.5]));
    }

    #[tokio::test]
    async fn test_evicted_buffers_return_to_pool_once_unshared() {
        let pool = Arc::new(BufferPool::new(32));
        let canvas =
            start_canvas_with_pool(Arc::new(StaticSource::solid(16, RED)), Arc::clone(&pool));
        canvas.set_viewport(Some(Viewport::new(0, 0, 16, 16)), 1.0);
        let held = settled(&canvas).await;
        assert!(held.contains(&TileSpec::new(1, 0, 0)));

        // Wander between two far tiles until the first one is evicted
        let wander = |step: u32| {
            let left = if step % 2 == 0 { 48 } else { 32 };
            Some(Viewport::new(left, 48, left + 16, 64))
        };
        for step in 0..DEFAULT_GRACE_PASSES + 2 {
            canvas.set_viewport(wander(step), 1.0);
            settled(&canvas).await;
        }
        assert!(canvas.metrics().snapshot().tiles_evicted >= 1);
        // The held snapshot still draws from the evicted buffer
        assert_eq!(pool.stats().returned, 0);
        assert_eq!(held.iter().next().map(|t| t.buffer.pixel(0, 0)), Some(Some(RED)));

        drop(held);
        canvas.set_viewport(wander(0), 1.0);
        settled(&canvas).await;
        assert!(pool.stats().returned >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_returns_buffers_to_pool() {
        let pool = Arc::new(BufferPool::new(32));
        let canvas =
            start_canvas_with_pool(Arc::new(StaticSource::solid(16, RED)), Arc::clone(&pool));
        canvas.set_viewport(Some(Viewport::new(0, 0, 32, 32)), 1.0);
        settled(&canvas).await;

        canvas.shutdown_and_wait().await;
        assert_eq!(pool.stats().returned, 4);
    }

    #[tokio::test]
    async fn test_redraw_refetches_view() {
        let source = Arc::new(StaticSource::solid(16, RED));
        let canvas = start_canvas(Arc::clone(&source) as Arc<dyn TileSource>);
        canvas.set_viewport(Some(Viewport::new(0, 0, 16, 16)), 1.0);
        settled(&canvas).await;

        canvas.redraw();
        let snapshot = settled(&canvas).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_clears_snapshot_and_ignores_updates() {
        let source = Arc::new(StaticSource::solid(16, RED));
        let canvas = start_canvas(Arc::clone(&source) as Arc<dyn TileSource>);
        canvas.set_viewport(Some(Viewport::new(0, 0, 32, 32)), 1.0);
        settled(&canvas).await;

        canvas.shutdown_and_wait().await;
        assert!(canvas.is_shut_down());
        assert!(canvas.snapshot().is_empty());

        canvas.set_viewport(Some(Viewport::new(0, 0, 64, 64)), 1.0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 4);
    }
}
