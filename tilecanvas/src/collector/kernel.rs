//! Collector kernel: the single owner of the in-flight set.
//!
//! # Architecture
//!
//! ```text
//!              inbound (cap 1)            to-fetch (rendezvous)
//! Canvas ─────────────────────► Kernel ─────────────────────────► Workers
//!                                 ▲                                  │
//!                                 └──────── completion (cap 1) ──────┘
//! ```
//!
//! A spec already in flight is dropped on arrival. Forwarding to the workers
//! suspends the kernel until one is free, which in turn stops it draining
//! the inbound queue and pushes back on the canvas.
//!
//! While the kernel is suspended on the handoff it cannot drain
//! completions. That is safe: a worker reports its completion before
//! registering for the next spec, so the single completion slot is always
//! taken by a worker that is about to become available.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::handoff::HandoffSender;
use crate::telemetry::PipelineMetrics;
use crate::tile::TileSpec;

/// Kernel progress, published on every idle flag change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStatus {
    /// Specs currently being fetched.
    pub in_flight: usize,
    /// Specs taken off the inbound queue so far, duplicates included.
    pub received: u64,
}

impl CollectorStatus {
    /// True iff nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }
}

pub(crate) struct Kernel {
    inbound_rx: mpsc::Receiver<TileSpec>,
    completion_rx: mpsc::Receiver<TileSpec>,
    to_fetch: HandoffSender<TileSpec>,
    status_tx: watch::Sender<CollectorStatus>,
    in_flight: HashSet<TileSpec>,
    metrics: Arc<PipelineMetrics>,
}

impl Kernel {
    pub(crate) fn new(
        inbound_rx: mpsc::Receiver<TileSpec>,
        completion_rx: mpsc::Receiver<TileSpec>,
        to_fetch: HandoffSender<TileSpec>,
        status_tx: watch::Sender<CollectorStatus>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            inbound_rx,
            completion_rx,
            to_fetch,
            status_tx,
            in_flight: HashSet::new(),
            metrics,
        }
    }

    /// Runs until shutdown or until every producer is gone.
    pub(crate) async fn run(mut self, shutdown: CancellationToken) {
        info!("Collector kernel starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!(in_flight = self.in_flight.len(), "Collector kernel shutting down");
                    break;
                }

                Some(spec) = self.completion_rx.recv() => {
                    self.on_completed(spec);
                }

                inbound = self.inbound_rx.recv() => {
                    let Some(spec) = inbound else {
                        debug!("Inbound queue closed");
                        break;
                    };
                    if !self.accept(spec) {
                        continue;
                    }

                    tokio::select! {
                        biased;

                        _ = shutdown.cancelled() => {
                            info!(in_flight = self.in_flight.len(), "Collector kernel shutting down");
                            break;
                        }

                        sent = self.to_fetch.send(spec) => {
                            if sent.is_err() {
                                debug!("All workers gone");
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!("Collector kernel stopped");
    }

    /// Registers a spec as in flight. Returns false for duplicates.
    fn accept(&mut self, spec: TileSpec) -> bool {
        self.metrics.spec_submitted();

        let accepted = self.in_flight.insert(spec);
        self.publish(true);

        if !accepted {
            trace!(%spec, "Spec already in flight");
            self.metrics.spec_deduplicated();
            return false;
        }

        trace!(%spec, in_flight = self.in_flight.len(), "Spec accepted");
        true
    }

    fn on_completed(&mut self, spec: TileSpec) {
        self.in_flight.remove(&spec);
        trace!(%spec, in_flight = self.in_flight.len(), "Spec completed");
        self.publish(false);

        if self.in_flight.is_empty() {
            debug!("Collector idle");
        }
    }

    /// Update the status; receivers are only woken when idleness flips.
    fn publish(&self, received: bool) {
        let in_flight = self.in_flight.len();
        self.status_tx.send_if_modified(|status| {
            let was_idle = status.is_idle();
            if received {
                status.received += 1;
            }
            status.in_flight = in_flight;
            was_idle != status.is_idle()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::handoff::rendezvous;

    struct Harness {
        inbound_tx: mpsc::Sender<TileSpec>,
        completion_tx: mpsc::Sender<TileSpec>,
        status_rx: watch::Receiver<CollectorStatus>,
        metrics: Arc<PipelineMetrics>,
        shutdown: CancellationToken,
    }

    /// Spawns a kernel whose handoff is drained by a fake worker that
    /// records every spec it receives.
    fn spawn_kernel() -> (Harness, mpsc::UnboundedReceiver<TileSpec>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (completion_tx, completion_rx) = mpsc::channel(1);
        let (to_fetch, from_kernel) = rendezvous(1);
        let (status_tx, status_rx) = watch::channel(CollectorStatus::default());
        let metrics = Arc::new(PipelineMetrics::new());
        let shutdown = CancellationToken::new();

        let kernel = Kernel::new(
            inbound_rx,
            completion_rx,
            to_fetch,
            status_tx,
            Arc::clone(&metrics),
        );
        tokio::spawn(kernel.run(shutdown.clone()));

        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(spec) = from_kernel.recv().await {
                let _ = seen_tx.send(spec);
            }
        });

        (
            Harness {
                inbound_tx,
                completion_tx,
                status_rx,
                metrics,
                shutdown,
            },
            seen_rx,
        )
    }

    #[tokio::test]
    async fn test_accepting_clears_idle() {
        let (mut h, mut seen) = spawn_kernel();
        assert!(h.status_rx.borrow().is_idle());

        let spec = TileSpec::new(1, 0, 0);
        h.inbound_tx.send(spec).await.unwrap();
        assert_eq!(seen.recv().await, Some(spec));

        h.status_rx.wait_for(|s| !s.is_idle()).await.unwrap();
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_completion_restores_idle() {
        let (mut h, mut seen) = spawn_kernel();
        let spec = TileSpec::new(1, 0, 0);
        h.inbound_tx.send(spec).await.unwrap();
        seen.recv().await.unwrap();
        h.status_rx.wait_for(|s| !s.is_idle()).await.unwrap();

        h.completion_tx.send(spec).await.unwrap();
        h.status_rx.wait_for(|s| s.is_idle()).await.unwrap();
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_spec_dropped() {
        let (h, mut seen) = spawn_kernel();
        let spec = TileSpec::new(2, 3, 3);
        let other = TileSpec::new(2, 3, 4);

        h.inbound_tx.send(spec).await.unwrap();
        h.inbound_tx.send(spec).await.unwrap();
        h.inbound_tx.send(other).await.unwrap();

        assert_eq!(seen.recv().await, Some(spec));
        assert_eq!(seen.recv().await, Some(other));

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.specs_submitted, 3);
        assert_eq!(snapshot.specs_deduplicated, 1);
        assert_eq!(h.status_rx.borrow().received, 3);
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_completed_spec_can_be_fetched_again() {
        let (h, mut seen) = spawn_kernel();
        let spec = TileSpec::new(2, 3, 3);

        h.inbound_tx.send(spec).await.unwrap();
        assert_eq!(seen.recv().await, Some(spec));
        h.completion_tx.send(spec).await.unwrap();

        h.inbound_tx.send(spec).await.unwrap();
        assert_eq!(seen.recv().await, Some(spec));
        assert_eq!(h.metrics.snapshot().specs_deduplicated, 0);
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_idle_only_after_every_spec_completes() {
        let (mut h, mut seen) = spawn_kernel();
        let a = TileSpec::new(1, 0, 0);
        let b = TileSpec::new(1, 0, 1);

        h.inbound_tx.send(a).await.unwrap();
        h.inbound_tx.send(b).await.unwrap();
        seen.recv().await.unwrap();
        seen.recv().await.unwrap();

        h.completion_tx.send(a).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let status = *h.status_rx.borrow_and_update();
        assert!(!status.is_idle());
        assert_eq!(status.in_flight, 1);
        assert_eq!(status.received, 2);

        h.completion_tx.send(b).await.unwrap();
        h.status_rx.wait_for(|s| s.is_idle()).await.unwrap();
        h.shutdown.cancel();
    }
}
