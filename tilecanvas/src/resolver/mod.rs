//! Visible tile resolution.
//!
//! Maps a viewport and a scale onto the set of tile specs needed to draw it.
//! The resolver is a pure function of its configuration: it holds no state
//! between calls and may be invoked every frame.
//!
//! # Pyramid Layout
//!
//! The pyramid has `level_count` levels, each the whole content at a
//! different resolution. Level `level_count - 1` is full resolution (native
//! scale 1.0) and every coarser level halves it, so level `l` has native
//! scale `2^-(level_count - 1 - l)`.
//!
//! # Level Selection
//!
//! ```text
//! level = ceil(level_count - 1 + log2(scale) - magnifying_factor)
//! ```
//!
//! clamped to `[0, level_count - 1]`. With `magnifying_factor <= 0` the
//! selected level is never coarser than the display resolution.

mod viewport;

pub use viewport::Viewport;

use std::collections::HashSet;
use std::ops::RangeInclusive;

use crate::tile::TileSpec;

/// Slack applied before rounding the level, so exact powers of two do not
/// round up through float noise.
const LEVEL_EPSILON: f64 = 1e-9;

/// Level selection policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelPolicy {
    /// Bias towards coarser levels. Positive values trade sharpness for
    /// fewer tiles; zero or negative never upsamples.
    pub magnifying_factor: i32,
    /// Decode downsampled buffers when the scale is below the coarsest
    /// level's native scale.
    pub sub_sampling: bool,
}

impl Default for LevelPolicy {
    fn default() -> Self {
        Self {
            magnifying_factor: 0,
            sub_sampling: true,
        }
    }
}

/// Structured result of a resolve pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleTiles {
    pub level: u8,
    pub sub_sample: u8,
    pub rows: RangeInclusive<u32>,
    pub cols: RangeInclusive<u32>,
}

impl VisibleTiles {
    /// Number of tiles covered.
    pub fn count(&self) -> usize {
        let rows = (*self.rows.end() - *self.rows.start()) as usize + 1;
        let cols = (*self.cols.end() - *self.cols.start()) as usize + 1;
        rows * cols
    }

    pub fn contains(&self, spec: &TileSpec) -> bool {
        spec.zoom() == self.level
            && spec.sub_sample() == self.sub_sample
            && self.rows.contains(&spec.row())
            && self.cols.contains(&spec.col())
    }

    /// Iterate the covered specs in row-major order.
    pub fn specs(&self) -> impl Iterator<Item = TileSpec> + '_ {
        self.rows.clone().flat_map(move |row| {
            self.cols
                .clone()
                .map(move |col| TileSpec::with_sub_sample(self.level, row, col, self.sub_sample))
        })
    }
}

/// Computes the tiles needed to draw a viewport.
#[derive(Debug, Clone)]
pub struct VisibleTilesResolver {
    level_count: u8,
    full_width: u32,
    full_height: u32,
    tile_size: u32,
    policy: LevelPolicy,
}

impl VisibleTilesResolver {
    /// Create a resolver.
    ///
    /// Dimensions are expected to be validated already (non-zero).
    pub fn new(
        level_count: u8,
        full_width: u32,
        full_height: u32,
        tile_size: u32,
        policy: LevelPolicy,
    ) -> Self {
        Self {
            level_count: level_count.max(1),
            full_width,
            full_height,
            tile_size: tile_size.max(1),
            policy,
        }
    }

    pub fn level_count(&self) -> u8 {
        self.level_count
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn policy(&self) -> LevelPolicy {
        self.policy
    }

    fn max_level(&self) -> u8 {
        self.level_count - 1
    }

    /// Native scale of a pyramid level.
    pub fn scale_for_level(&self, level: u8) -> f64 {
        let level = level.min(self.max_level());
        2f64.powi(-((self.max_level() - level) as i32))
    }

    /// Pyramid level used to draw at `scale`.
    pub fn level_for_scale(&self, scale: f64) -> u8 {
        if !(scale.is_finite() && scale > 0.0) {
            return 0;
        }
        let partial = self.max_level() as f64 + scale.log2()
            - self.policy.magnifying_factor as f64
            - LEVEL_EPSILON;
        partial.ceil().clamp(0.0, self.max_level() as f64) as u8
    }

    /// Decode subsampling exponent used at `scale`.
    ///
    /// Non-zero only when the scale is below the coarsest level's native
    /// scale and subsampling is enabled.
    pub fn sub_sample_for_scale(&self, scale: f64) -> u8 {
        let coarsest = self.scale_for_level(0);
        if !self.policy.sub_sampling || !(scale.is_finite() && scale > 0.0) || scale >= coarsest {
            return 0;
        }
        let exponent = (coarsest / scale).log2().floor() as u32;
        exponent.min(self.tile_size.ilog2()) as u8
    }

    /// Edge length, in full-resolution map pixels, of one tile at `level`.
    fn tile_span(&self, level: u8) -> u64 {
        (self.tile_size as u64) << (self.max_level() - level)
    }

    /// Rows and columns covering the viewport, or `None` if nothing is
    /// visible (empty viewport, invalid scale, or viewport off the map).
    pub fn visible_tiles(&self, viewport: &Viewport, scale: f64) -> Option<VisibleTiles> {
        if viewport.is_empty() || !(scale.is_finite() && scale > 0.0) {
            return None;
        }

        let level = self.level_for_scale(scale);
        let sub_sample = self.sub_sample_for_scale(scale);

        // Scaled pixels to full-resolution map pixels, clamped to the map
        let (left, top, right, bottom) = viewport.unrotated_bounds();
        let left = (left / scale).max(0.0);
        let top = (top / scale).max(0.0);
        let right = (right / scale).min(self.full_width as f64);
        let bottom = (bottom / scale).min(self.full_height as f64);
        if right <= left || bottom <= top {
            return None;
        }

        let span = self.tile_span(level);
        let cols = Self::cell_range(left, right, span, self.full_width);
        let rows = Self::cell_range(top, bottom, span, self.full_height);

        Some(VisibleTiles {
            level,
            sub_sample,
            rows,
            cols,
        })
    }

    /// Cells of size `span` covering `[min, max)`, clamped to the grid.
    fn cell_range(min: f64, max: f64, span: u64, extent: u32) -> RangeInclusive<u32> {
        let span_f = span as f64;
        let last_cell = (extent as u64).div_ceil(span).saturating_sub(1) as u32;
        let first = ((min / span_f).floor() as u32).min(last_cell);
        let last = ((max / span_f).ceil() as u32)
            .saturating_sub(1)
            .clamp(first, last_cell);
        first..=last
    }

    /// Tile specs needed to draw the viewport at `scale`.
    ///
    /// Returns an empty set while the viewport has no area.
    pub fn resolve(&self, viewport: &Viewport, scale: f64) -> HashSet<TileSpec> {
        self.visible_tiles(viewport, scale)
            .map(|visible| visible.specs().collect())
            .unwrap_or_default()
    }
}
