//! Tile collector: turns required specs into composited tiles.
//!
//! The collector owns a dedicated multi-threaded tokio runtime sized to the
//! worker count. One kernel task deduplicates specs and tracks the
//! in-flight set; `W` identical worker tasks fetch, decode and composite.
//!
//! # Guarantees
//!
//! - At most one fetch per spec is in flight at any time
//! - At most `W` specs are processed concurrently; decode and compositing
//!   run on a blocking pool of at most `W` threads, retired after the
//!   keep-alive when idle
//! - Submitting suspends while every worker is busy (backpressure)
//! - The idle flag is true iff nothing is in flight
//! - After [`TileCollector::shutdown`] no tile is delivered and no spec is
//!   accepted
//!
//! # Example
//!
//! ```ignore
//! let (collector, mut tiles) = TileCollector::start(config, layers, pool, metrics)?;
//! collector.submit(TileSpec::new(3, 0, 0)).await?;
//! let tile = tiles.recv().await;
//! collector.shutdown();
//! ```

mod config;
mod error;
mod handoff;
mod kernel;
mod worker;

pub use config::{
    default_worker_count, CollectorConfig, DEFAULT_KEEP_ALIVE, DEFAULT_OUTPUT_CAPACITY,
    DEFAULT_TILE_SIZE,
};
pub use error::{CollectorError, TrySubmitError};
pub use kernel::CollectorStatus;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::layer::LayerStack;
use crate::pool::BufferPool;
use crate::telemetry::PipelineMetrics;
use crate::tile::{Tile, TileBuffer, TileSpec};
use config::{COMPLETION_CAPACITY, INBOUND_CAPACITY};
use kernel::Kernel;
use worker::Worker;

/// Handle to a running collector.
///
/// Dropping the handle shuts the collector down.
pub struct TileCollector {
    inbound_tx: mpsc::Sender<TileSpec>,
    status_rx: watch::Receiver<CollectorStatus>,
    layers_tx: watch::Sender<Arc<LayerStack>>,
    shutdown: CancellationToken,
    runtime: Mutex<Option<Runtime>>,
    metrics: Arc<PipelineMetrics>,
    worker_count: usize,
}

impl TileCollector {
    /// Start the kernel and workers on a dedicated runtime.
    ///
    /// Returns the collector and the receiver of completed tiles.
    pub fn start(
        config: CollectorConfig,
        layers: LayerStack,
        pool: Arc<BufferPool<TileBuffer>>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<(Self, mpsc::Receiver<Tile>), CollectorError> {
        let worker_count = config.worker_count;
        if worker_count == 0 {
            return Err(CollectorError::NoWorkers);
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_count)
            .max_blocking_threads(worker_count)
            .thread_keep_alive(config.keep_alive)
            .thread_name("tile-worker")
            .enable_all()
            .build()?;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_CAPACITY);
        let (tiles_tx, tiles_rx) = mpsc::channel(config.output_capacity.max(1));
        let (to_fetch, from_kernel) = handoff::rendezvous(worker_count);
        let (status_tx, status_rx) = watch::channel(CollectorStatus::default());
        let (layers_tx, layers_rx) = watch::channel(Arc::new(layers));
        let shutdown = CancellationToken::new();

        let kernel = Kernel::new(
            inbound_rx,
            completion_rx,
            to_fetch,
            status_tx,
            Arc::clone(&metrics),
        );
        runtime.spawn(kernel.run(shutdown.clone()));

        for id in 0..worker_count {
            let worker = Worker {
                id,
                from_kernel: from_kernel.clone(),
                completion_tx: completion_tx.clone(),
                tiles_tx: tiles_tx.clone(),
                layers: layers_rx.clone(),
                pool: Arc::clone(&pool),
                tile_size: config.tile_size,
                pixel_format: config.pixel_format,
                metrics: Arc::clone(&metrics),
            };
            runtime.spawn(worker.run(shutdown.clone()));
        }

        info!(
            workers = worker_count,
            tile_size = config.tile_size,
            format = ?config.pixel_format,
            "Tile collector started"
        );

        let collector = Self {
            inbound_tx,
            status_rx,
            layers_tx,
            shutdown,
            runtime: Mutex::new(Some(runtime)),
            metrics,
            worker_count,
        };
        Ok((collector, tiles_rx))
    }

    /// Submit a spec, suspending while the collector is saturated.
    pub async fn submit(&self, spec: TileSpec) -> Result<(), CollectorError> {
        if self.is_shut_down() {
            return Err(CollectorError::ShutDown);
        }
        self.inbound_tx
            .send(spec)
            .await
            .map_err(|_| CollectorError::ShutDown)
    }

    /// Submit a spec without waiting.
    pub fn try_submit(&self, spec: TileSpec) -> Result<(), TrySubmitError> {
        if self.is_shut_down() {
            return Err(TrySubmitError::ShutDown(spec));
        }
        self.inbound_tx.try_send(spec).map_err(|e| match e {
            TrySendError::Full(spec) => TrySubmitError::Busy(spec),
            TrySendError::Closed(spec) => TrySubmitError::ShutDown(spec),
        })
    }

    /// Sender side of the inbound queue, for callers that reserve capacity
    /// before committing to a spec.
    pub fn inbound(&self) -> mpsc::Sender<TileSpec> {
        self.inbound_tx.clone()
    }

    /// Replace the layer stack used for every spec started from now on.
    pub fn set_layers(&self, layers: LayerStack) {
        self.layers_tx.send_replace(Arc::new(layers));
    }

    pub fn layers(&self) -> Arc<LayerStack> {
        Arc::clone(&self.layers_tx.borrow())
    }

    /// True iff no spec is in flight.
    pub fn is_idle(&self) -> bool {
        self.status_rx.borrow().is_idle()
    }

    pub fn status(&self) -> CollectorStatus {
        *self.status_rx.borrow()
    }

    /// Receiver notified on every idle flag change.
    pub fn status_watch(&self) -> watch::Receiver<CollectorStatus> {
        self.status_rx.clone()
    }

    /// Wait until nothing is in flight. Returns immediately after shutdown.
    pub async fn wait_idle(&self) {
        let mut status = self.status_rx.clone();
        let _ = status.wait_for(|status| status.is_idle()).await;
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every task and release the execution pool.
    ///
    /// In-flight decodes are abandoned and their results discarded.
    /// Calling this more than once is harmless.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
            info!("Tile collector shut down");
        }
    }
}

impl Drop for TileCollector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TileCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCollector")
            .field("worker_count", &self.worker_count)
            .field("idle", &self.is_idle())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
