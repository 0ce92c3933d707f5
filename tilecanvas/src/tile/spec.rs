//! Tile request identifiers.
//!
//! Provides the `TileSpec` type that identifies one tile of the pyramid,
//! independently of the layers that will be composited into it.

use std::fmt;

/// Identifier of a single tile request.
///
/// A spec names a cell of the tile pyramid: the pyramid level (`zoom`), the
/// cell position at that level (`row`/`col`), and the decode subsampling
/// exponent. Two specs are equal only if all four fields are equal, so the
/// same cell requested at two subsampling factors is two distinct requests.
///
/// # Example
///
/// ```
/// use tilecanvas::tile::TileSpec;
///
/// let spec = TileSpec::new(3, 5, 7);
/// assert_eq!(spec.zoom(), 3);
/// assert_eq!(spec.row(), 5);
/// assert_eq!(spec.col(), 7);
/// assert_eq!(spec.sub_sample(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileSpec {
    /// Pyramid level (0 is the coarsest level)
    zoom: u8,
    /// Tile row at this level
    row: u32,
    /// Tile column at this level
    col: u32,
    /// Decode downsampling exponent: buffers are `tile_size >> sub_sample` wide
    sub_sample: u8,
}

impl TileSpec {
    /// Create a new spec without subsampling.
    pub fn new(zoom: u8, row: u32, col: u32) -> Self {
        Self {
            zoom,
            row,
            col,
            sub_sample: 0,
        }
    }

    /// Create a new spec with the given subsampling exponent.
    pub fn with_sub_sample(zoom: u8, row: u32, col: u32, sub_sample: u8) -> Self {
        Self {
            zoom,
            row,
            col,
            sub_sample,
        }
    }

    /// Get the pyramid level.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Get the tile row.
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Get the tile column.
    pub fn col(&self) -> u32 {
        self.col
    }

    /// Get the subsampling exponent.
    pub fn sub_sample(&self) -> u8 {
        self.sub_sample
    }

    /// Pixel edge length of the decoded buffer for a given nominal tile size.
    ///
    /// Never returns zero, even for extreme subsampling.
    pub fn buffer_size(&self, tile_size: u32) -> u32 {
        tile_size.checked_shr(self.sub_sample as u32).unwrap_or(0).max(1)
    }

    /// Region covered by this tile in full-resolution map pixels.
    ///
    /// `level_count` is the number of pyramid levels; the finest level
    /// (`level_count - 1`) maps one tile pixel to one map pixel.
    pub fn map_region(&self, tile_size: u32, level_count: u8) -> MapRegion {
        let shift = level_count.saturating_sub(1).saturating_sub(self.zoom) as u32;
        let span = (tile_size as u64) << shift;
        let left = self.col as u64 * span;
        let top = self.row as u64 * span;
        MapRegion {
            left,
            top,
            right: left + span,
            bottom: top + span,
        }
    }
}

impl fmt::Display for TileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L{}/{}_{}@{}",
            self.zoom, self.row, self.col, self.sub_sample
        )
    }
}

/// Axis-aligned rectangle in full-resolution map pixels, half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRegion {
    pub left: u64,
    pub top: u64,
    pub right: u64,
    pub bottom: u64,
}

impl MapRegion {
    /// Returns true if the two regions share at least one pixel.
    pub fn intersects(&self, other: &MapRegion) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }
}
