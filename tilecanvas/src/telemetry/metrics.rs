//! Atomic pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::snapshot::TelemetrySnapshot;

/// Shared counters for the whole tile pipeline.
///
/// Every method is a single relaxed atomic increment; counters are only
/// ever read through [`PipelineMetrics::snapshot`].
#[derive(Debug)]
pub struct PipelineMetrics {
    started_at: Instant,
    specs_submitted: AtomicU64,
    specs_deduplicated: AtomicU64,
    fetches_started: AtomicU64,
    tiles_completed: AtomicU64,
    tiles_failed: AtomicU64,
    worker_panics: AtomicU64,
    tiles_evicted: AtomicU64,
    submissions_coalesced: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            specs_submitted: AtomicU64::new(0),
            specs_deduplicated: AtomicU64::new(0),
            fetches_started: AtomicU64::new(0),
            tiles_completed: AtomicU64::new(0),
            tiles_failed: AtomicU64::new(0),
            worker_panics: AtomicU64::new(0),
            tiles_evicted: AtomicU64::new(0),
            submissions_coalesced: AtomicU64::new(0),
        }
    }

    /// A spec reached the collector kernel.
    pub fn spec_submitted(&self) {
        self.specs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A spec was dropped because it was already in flight.
    pub fn spec_deduplicated(&self) {
        self.specs_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker picked up a spec.
    pub fn fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker produced a tile.
    pub fn tile_completed(&self) {
        self.tiles_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker finished a spec without producing a tile.
    pub fn tile_failed(&self) {
        self.tiles_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker recovered from a panic while processing a spec.
    pub fn worker_panicked(&self) {
        self.worker_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tiles_evicted(&self, count: usize) {
        self.tiles_evicted.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Submissions found the collector busy and were queued for later.
    pub fn submissions_coalesced(&self, count: usize) {
        self.submissions_coalesced
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of every counter.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime: self.started_at.elapsed(),
            specs_submitted: self.specs_submitted.load(Ordering::Relaxed),
            specs_deduplicated: self.specs_deduplicated.load(Ordering::Relaxed),
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            tiles_completed: self.tiles_completed.load(Ordering::Relaxed),
            tiles_failed: self.tiles_failed.load(Ordering::Relaxed),
            worker_panics: self.worker_panics.load(Ordering::Relaxed),
            tiles_evicted: self.tiles_evicted.load(Ordering::Relaxed),
            submissions_coalesced: self.submissions_coalesced.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
