//! Collector workers.
//!
//! Each worker loops: take a spec from the kernel, fetch every layer
//! concurrently, decode and composite on the blocking pool, emit the tile,
//! then report completion. Completion is reported whether or not a tile was
//! produced, and always before the worker asks for its next spec.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::handoff::HandoffReceiver;
use crate::layer::{Layer, LayerStack};
use crate::pool::BufferPool;
use crate::telemetry::PipelineMetrics;
use crate::tile::{DecodeError, PixelFormat, Tile, TileBuffer, TileSpec};

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) from_kernel: HandoffReceiver<TileSpec>,
    pub(crate) completion_tx: mpsc::Sender<TileSpec>,
    pub(crate) tiles_tx: mpsc::Sender<Tile>,
    pub(crate) layers: watch::Receiver<Arc<LayerStack>>,
    pub(crate) pool: Arc<BufferPool<TileBuffer>>,
    pub(crate) tile_size: u32,
    pub(crate) pixel_format: PixelFormat,
    pub(crate) metrics: Arc<PipelineMetrics>,
}

impl Worker {
    pub(crate) async fn run(self, shutdown: CancellationToken) {
        debug!(worker = self.id, "Worker starting");

        loop {
            let spec = tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                next = self.from_kernel.recv() => match next {
                    Some(spec) => spec,
                    None => break,
                },
            };

            self.metrics.fetch_started();

            let tile = match AssertUnwindSafe(self.process(spec)).catch_unwind().await {
                Ok(tile) => tile,
                Err(panic) => {
                    warn!(
                        worker = self.id,
                        %spec,
                        reason = %panic_message(panic.as_ref()),
                        "Recovered from panic while processing tile"
                    );
                    self.metrics.worker_panicked();
                    None
                }
            };

            match tile {
                Some(tile) => {
                    self.metrics.tile_completed();
                    tokio::select! {
                        biased;

                        _ = shutdown.cancelled() => break,

                        sent = self.tiles_tx.send(tile) => {
                            if sent.is_err() {
                                trace!(worker = self.id, "Tile output closed");
                            }
                        }
                    }
                }
                None => self.metrics.tile_failed(),
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                sent = self.completion_tx.send(spec) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(worker = self.id, "Worker stopped");
    }

    /// Fetch, decode and composite one spec. `None` means no tile.
    async fn process(&self, spec: TileSpec) -> Option<Tile> {
        let stack = Arc::clone(&self.layers.borrow());
        if stack.is_empty() {
            trace!(%spec, "No layers, nothing to fetch");
            return None;
        }

        let size = spec.buffer_size(self.tile_size);
        let loads = stack
            .layers()
            .iter()
            .map(|layer| self.load_layer(spec, layer, size));
        let mut buffers = join_all(loads).await.into_iter();

        let Some(Some(base)) = buffers.next() else {
            debug!(%spec, "Base layer unavailable, no tile");
            for overlay in buffers.flatten() {
                self.pool.put(overlay);
            }
            return None;
        };

        let overlays: Vec<(TileBuffer, f32)> = stack.layers()[1..]
            .iter()
            .zip(buffers)
            .filter_map(|(layer, buffer)| buffer.map(|b| (b, layer.alpha())))
            .collect();

        let composed = if overlays.is_empty() {
            base
        } else {
            self.composite(spec, base, overlays).await?
        };

        Some(Tile::new(spec, &stack, composed))
    }

    /// Fetch and decode one layer. `None` means no contribution.
    async fn load_layer(&self, spec: TileSpec, layer: &Layer, size: u32) -> Option<TileBuffer> {
        let bytes = match layer
            .source()
            .fetch(spec.row(), spec.col(), spec.zoom())
            .await
        {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                trace!(%spec, layer = %layer.id(), "Tile not available");
                return None;
            }
            Err(e) => {
                debug!(%spec, layer = %layer.id(), error = %e, "Tile fetch failed");
                return None;
            }
        };

        let buffer = self.pool.acquire(self.pixel_format, size);
        match self.decode(buffer, bytes, spec.sub_sample(), size).await {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                debug!(%spec, layer = %layer.id(), error = %e, "Tile decode failed");
                None
            }
        }
    }

    async fn decode(
        &self,
        mut buffer: TileBuffer,
        bytes: Bytes,
        sub_sample: u8,
        size: u32,
    ) -> Result<TileBuffer, DecodeError> {
        let pool = Arc::clone(&self.pool);
        let joined = tokio::task::spawn_blocking(move || {
            match buffer.decode_from(&bytes, sub_sample, size) {
                Ok(()) => Ok(buffer),
                Err(e) => {
                    pool.put(buffer);
                    Err(e)
                }
            }
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                self.metrics.worker_panicked();
                Err(DecodeError::Panicked(panic_message(e.into_panic().as_ref())))
            }
            Err(_) => Err(DecodeError::Aborted),
        }
    }

    /// Draw the overlays onto the base buffer in layer order.
    async fn composite(
        &self,
        spec: TileSpec,
        base: TileBuffer,
        overlays: Vec<(TileBuffer, f32)>,
    ) -> Option<TileBuffer> {
        let pool = Arc::clone(&self.pool);
        let joined = tokio::task::spawn_blocking(move || {
            blend_overlays(base, overlays, &pool, TileBuffer::blend_from)
        })
        .await;

        match joined {
            Ok(Ok(buffer)) => Some(buffer),
            Ok(Err(reason)) => {
                self.metrics.worker_panicked();
                warn!(%spec, %reason, "Compositing panicked");
                None
            }
            // The blocking task never ran; its buffers went down with it
            Err(e) => {
                warn!(%spec, error = %e, "Compositing aborted");
                None
            }
        }
    }
}

/// Blend `overlays` onto `base` with `blend`, returning every overlay to
/// the pool. If `blend` panics, `base` goes back to the pool as well.
fn blend_overlays(
    mut base: TileBuffer,
    overlays: Vec<(TileBuffer, f32)>,
    pool: &BufferPool<TileBuffer>,
    blend: fn(&mut TileBuffer, &TileBuffer, f32),
) -> Result<TileBuffer, String> {
    let mut outcome = Ok(());
    for (overlay, alpha) in overlays {
        if outcome.is_ok() {
            outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                blend(&mut base, &overlay, alpha)
            }));
        }
        pool.put(overlay);
    }

    match outcome {
        Ok(()) => Ok(base),
        Err(panic) => {
            pool.put(base);
            Err(panic_message(panic.as_ref()))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
