//! Viewport geometry.

/// The visible window into the map, in scaled-pixel space.
///
/// Coordinates are relative to the top-left corner of the whole content at
/// the current scale, so `right - left` is the layout width (plus padding).
/// The rotation is applied about the viewport center.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    /// Rotation of the map, in radians.
    pub angle_rad: f32,
}

impl Viewport {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
            angle_rad: 0.0,
        }
    }

    pub fn with_angle(mut self, angle_rad: f32) -> Self {
        self.angle_rad = angle_rad;
        self
    }

    pub fn width(&self) -> i64 {
        self.right as i64 - self.left as i64
    }

    pub fn height(&self) -> i64 {
        self.bottom as i64 - self.top as i64
    }

    /// Returns true if the viewport has no area (layout not measured yet).
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Axis-aligned bounds of the viewport once the map rotation is undone.
    ///
    /// Tiles are laid out in unrotated map space, so the viewport is rotated
    /// by `-angle_rad` about its center before intersecting with the grid.
    /// Returns `(left, top, right, bottom)` in scaled pixels.
    pub fn unrotated_bounds(&self) -> (f64, f64, f64, f64) {
        let (left, top, right, bottom) = (
            self.left as f64,
            self.top as f64,
            self.right as f64,
            self.bottom as f64,
        );
        if self.angle_rad == 0.0 {
            return (left, top, right, bottom);
        }

        let cx = (left + right) / 2.0;
        let cy = (top + bottom) / 2.0;
        let hw = (right - left) / 2.0;
        let hh = (bottom - top) / 2.0;
        let theta = -(self.angle_rad as f64);
        let (sin, cos) = theta.sin_cos();

        // Half extents of the rotated rectangle's bounding box
        let ex = (hw * cos).abs() + (hh * sin).abs();
        let ey = (hw * sin).abs() + (hh * cos).abs();
        (cx - ex, cy - ey, cx + ex, cy + ey)
    }
}
