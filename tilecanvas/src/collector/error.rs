//! Collector errors.

use thiserror::Error;

use crate::tile::TileSpec;

/// Errors starting or talking to a [`TileCollector`](super::TileCollector).
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The dedicated execution pool could not be created.
    #[error("Failed to create worker pool: {0}")]
    Runtime(#[from] std::io::Error),

    /// A collector needs at least one worker.
    #[error("Worker count must be at least 1")]
    NoWorkers,

    /// The collector was shut down; no specs are accepted.
    #[error("Tile collector is shut down")]
    ShutDown,
}

/// Result of a non-blocking submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrySubmitError {
    /// The inbound queue is full; retry later.
    #[error("Collector busy, spec {0} not accepted")]
    Busy(TileSpec),

    /// The collector was shut down.
    #[error("Tile collector is shut down")]
    ShutDown(TileSpec),
}
