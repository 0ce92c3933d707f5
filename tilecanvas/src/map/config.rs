//! Map configuration.
//!
//! [`MapConfig`] collects everything needed to start a [`MapState`]:
//! pyramid geometry, worker pool sizing, level policy, cache retention and
//! scale limits. Construct with [`MapConfig::new`], adjust with the `with_*`
//! builders, and [`MapConfig::validate`] before use (`MapState::new` does it
//! for you).
//!
//! [`MapState`]: super::MapState

use std::time::Duration;

use thiserror::Error;

use crate::canvas::{
    CanvasConfig, EvictionPolicy, DEFAULT_GRACE_PASSES, DEFAULT_MAX_LEVEL_DISTANCE,
    DEFAULT_RENDER_THROTTLE,
};
use crate::collector::{default_worker_count, CollectorConfig, DEFAULT_KEEP_ALIVE, DEFAULT_TILE_SIZE};
use crate::pool::DEFAULT_POOL_CAPACITY;
use crate::resolver::LevelPolicy;
use crate::tile::PixelFormat;

/// Default upper scale bound.
pub const DEFAULT_MAX_SCALE: f64 = 2.0;

/// A `min_scale` of zero means "fit the whole map in the layout".
pub const FIT_MIN_SCALE: f64 = 0.0;

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("level_count must be at least 1")]
    NoLevels,

    #[error("level_count {0} exceeds the supported maximum of {max}", max = MAX_LEVEL_COUNT)]
    TooManyLevels(u8),

    #[error("tile_size must be greater than 0")]
    ZeroTileSize,

    #[error("Map dimensions must be non-zero (got {width}×{height})")]
    ZeroDimensions { width: u32, height: u32 },

    #[error("worker_count must be at least 1")]
    NoWorkers,

    #[error("max_scale must be finite and positive (got {0})")]
    InvalidMaxScale(f64),

    #[error("min_scale must be finite and non-negative (got {0})")]
    InvalidMinScale(f64),

    #[error("min_scale {min} exceeds max_scale {max}")]
    ScaleRange { min: f64, max: f64 },
}

/// Deepest pyramid supported; tile spans are computed as `tile_size << level`.
pub const MAX_LEVEL_COUNT: u8 = 32;

/// Configuration for a map.
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Number of pyramid levels; the last one is full resolution.
    pub level_count: u8,
    /// Map width at full resolution, in pixels.
    pub full_width: u32,
    /// Map height at full resolution, in pixels.
    pub full_height: u32,
    pub tile_size: u32,
    pub worker_count: usize,
    pub worker_keep_alive: Duration,
    pub pixel_format: PixelFormat,
    pub level_policy: LevelPolicy,
    pub grace_passes: u32,
    pub max_level_distance: u8,
    pub render_throttle: Duration,
    /// Maximum idle buffers kept for reuse.
    pub pool_capacity: usize,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Extra margin around the layout, in pixels, resolved as visible.
    pub padding: u32,
}

impl MapConfig {
    /// Configuration with defaults for everything but the pyramid geometry.
    pub fn new(level_count: u8, full_width: u32, full_height: u32) -> Self {
        Self {
            level_count,
            full_width,
            full_height,
            tile_size: DEFAULT_TILE_SIZE,
            worker_count: default_worker_count(),
            worker_keep_alive: DEFAULT_KEEP_ALIVE,
            pixel_format: PixelFormat::default(),
            level_policy: LevelPolicy::default(),
            grace_passes: DEFAULT_GRACE_PASSES,
            max_level_distance: DEFAULT_MAX_LEVEL_DISTANCE,
            render_throttle: DEFAULT_RENDER_THROTTLE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            min_scale: FIT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            padding: 0,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    pub fn with_magnifying_factor(mut self, magnifying_factor: i32) -> Self {
        self.level_policy.magnifying_factor = magnifying_factor;
        self
    }

    pub fn with_sub_sampling(mut self, enabled: bool) -> Self {
        self.level_policy.sub_sampling = enabled;
        self
    }

    pub fn with_grace_passes(mut self, grace_passes: u32) -> Self {
        self.grace_passes = grace_passes;
        self
    }

    pub fn with_max_level_distance(mut self, distance: u8) -> Self {
        self.max_level_distance = distance;
        self
    }

    pub fn with_render_throttle(mut self, throttle: Duration) -> Self {
        self.render_throttle = throttle;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn with_scale_range(mut self, min_scale: f64, max_scale: f64) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Check every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level_count == 0 {
            return Err(ConfigError::NoLevels);
        }
        if self.level_count > MAX_LEVEL_COUNT {
            return Err(ConfigError::TooManyLevels(self.level_count));
        }
        if self.tile_size == 0 {
            return Err(ConfigError::ZeroTileSize);
        }
        if self.full_width == 0 || self.full_height == 0 {
            return Err(ConfigError::ZeroDimensions {
                width: self.full_width,
                height: self.full_height,
            });
        }
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if !self.max_scale.is_finite() || self.max_scale <= 0.0 {
            return Err(ConfigError::InvalidMaxScale(self.max_scale));
        }
        if !self.min_scale.is_finite() || self.min_scale < 0.0 {
            return Err(ConfigError::InvalidMinScale(self.min_scale));
        }
        if self.min_scale > self.max_scale {
            return Err(ConfigError::ScaleRange {
                min: self.min_scale,
                max: self.max_scale,
            });
        }
        Ok(())
    }

    pub(crate) fn collector_config(&self) -> CollectorConfig {
        CollectorConfig::default()
            .with_worker_count(self.worker_count)
            .with_tile_size(self.tile_size)
            .with_pixel_format(self.pixel_format)
            .with_keep_alive(self.worker_keep_alive)
    }

    pub(crate) fn canvas_config(&self) -> CanvasConfig {
        CanvasConfig {
            level_count: self.level_count,
            full_width: self.full_width,
            full_height: self.full_height,
            tile_size: self.tile_size,
            level_policy: self.level_policy,
            eviction: EvictionPolicy {
                grace_passes: self.grace_passes,
                max_level_distance: self.max_level_distance,
            },
            render_throttle: self.render_throttle,
        }
    }
}
