//! Collector configuration.

use std::time::Duration;

use crate::tile::PixelFormat;

/// Default nominal tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default time an idle pool thread is kept before it is retired.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Default capacity of the completed-tile output queue.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 1;

/// Capacity of the inbound spec queue.
pub(crate) const INBOUND_CAPACITY: usize = 1;

/// Capacity of the completion-notify queue.
pub(crate) const COMPLETION_CAPACITY: usize = 1;

/// Default worker count: all cores but one, at least one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Configuration for a [`TileCollector`](super::TileCollector).
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Number of worker loops, and threads in the execution pool.
    pub worker_count: usize,
    /// Nominal tile edge length before subsampling.
    pub tile_size: u32,
    /// Pixel format of decoded buffers.
    pub pixel_format: PixelFormat,
    /// Idle pool thread keep-alive.
    pub keep_alive: Duration,
    /// Capacity of the completed-tile queue.
    pub output_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            tile_size: DEFAULT_TILE_SIZE,
            pixel_format: PixelFormat::default(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
        }
    }
}

impl CollectorConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_count_at_least_one() {
        assert!(default_worker_count() >= 1);
    }

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::default();
        assert_eq!(config.tile_size, 256);
        assert_eq!(config.keep_alive, Duration::from_secs(60));
        assert_eq!(config.pixel_format, PixelFormat::Rgba8);
    }

    #[test]
    fn test_builders() {
        let config = CollectorConfig::default()
            .with_worker_count(3)
            .with_tile_size(512)
            .with_pixel_format(PixelFormat::Rgb8);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.tile_size, 512);
        assert_eq!(config.pixel_format, PixelFormat::Rgb8);
    }
}
