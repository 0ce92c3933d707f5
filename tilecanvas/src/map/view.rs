//! Canonical view model.
//!
//! [`ViewState`] is the single owner of scroll, scale, rotation and layout
//! size. The viewport handed to the canvas, the centroid and the visible
//! area are all derived from it on demand.
//!
//! Scroll is expressed in scaled pixels: `(0, 0)` puts the map's top-left
//! corner at the layout's top-left corner, and at scale `s` the map spans
//! `full_width * s` by `full_height * s` scroll units.

use crate::resolver::Viewport;

/// Normalised, axis-aligned bounding box (`0..1` spans the map).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_left: f64,
    pub y_top: f64,
    pub x_right: f64,
    pub y_bottom: f64,
}

impl BoundingBox {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.x_left..=self.x_right).contains(&x) && (self.y_top..=self.y_bottom).contains(&y)
    }
}

/// Corners of the visible area in normalised map coordinates, clockwise
/// from the layout's top-left corner. Accounts for rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleArea {
    pub p1: (f64, f64),
    pub p2: (f64, f64),
    pub p3: (f64, f64),
    pub p4: (f64, f64),
}

impl VisibleArea {
    pub fn corners(&self) -> [(f64, f64); 4] {
        [self.p1, self.p2, self.p3, self.p4]
    }

    /// Smallest axis-aligned box containing every corner.
    pub fn bounding_box(&self) -> BoundingBox {
        let corners = self.corners();
        let fold = |init: f64, pick: fn(&(f64, f64)) -> f64, f: fn(f64, f64) -> f64| {
            corners.iter().map(pick).fold(init, f)
        };
        BoundingBox {
            x_left: fold(f64::INFINITY, |p| p.0, f64::min),
            y_top: fold(f64::INFINITY, |p| p.1, f64::min),
            x_right: fold(f64::NEG_INFINITY, |p| p.0, f64::max),
            y_bottom: fold(f64::NEG_INFINITY, |p| p.1, f64::max),
        }
    }
}

/// Where a snapped point lands on the layout, as a fraction of the layout
/// size subtracted from the scroll. The default centres the point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenOffset {
    pub x: f64,
    pub y: f64,
}

impl Default for ScreenOffset {
    fn default() -> Self {
        Self { x: -0.5, y: -0.5 }
    }
}

/// Scroll, scale, rotation and layout of one map view.
#[derive(Debug, Clone)]
pub struct ViewState {
    full_width: u32,
    full_height: u32,
    layout: Option<(u32, u32)>,
    scroll_x: f64,
    scroll_y: f64,
    scale: f64,
    rotation_deg: f64,
    padding: u32,
    min_scale: f64,
    max_scale: f64,
}

impl ViewState {
    /// A view at scale 1 (or `max_scale` if lower), not yet laid out.
    ///
    /// A `min_scale` of zero means "fit": the scale at which the whole map
    /// fits in the layout.
    pub fn new(full_width: u32, full_height: u32, min_scale: f64, max_scale: f64, padding: u32) -> Self {
        Self {
            full_width,
            full_height,
            layout: None,
            scroll_x: 0.0,
            scroll_y: 0.0,
            scale: 1f64.min(max_scale),
            rotation_deg: 0.0,
            padding,
            min_scale,
            max_scale,
        }
    }

    pub fn layout_size(&self) -> Option<(u32, u32)> {
        self.layout
    }

    pub fn scroll(&self) -> (f64, f64) {
        (self.scroll_x, self.scroll_y)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Rotation in degrees, in `[0, 360)`.
    pub fn rotation(&self) -> f64 {
        self.rotation_deg
    }

    pub fn padding(&self) -> u32 {
        self.padding
    }

    /// Lower scale bound currently in force.
    pub fn effective_min_scale(&self) -> f64 {
        if self.min_scale > 0.0 {
            return self.min_scale;
        }
        match self.layout {
            Some((width, height)) => {
                let fit_x = width as f64 / self.full_width as f64;
                let fit_y = height as f64 / self.full_height as f64;
                fit_x.min(fit_y).min(self.max_scale)
            }
            None => 0.0,
        }
    }

    fn constrain_scale(&self, scale: f64) -> f64 {
        if !scale.is_finite() {
            return self.scale;
        }
        let min = self.effective_min_scale();
        let scale = scale.clamp(min, self.max_scale);
        if scale > 0.0 {
            scale
        } else {
            self.scale
        }
    }

    /// Keep the scroll within the scaled map, when the layout is known.
    fn constrain_scroll(&mut self) {
        let Some((width, height)) = self.layout else {
            return;
        };
        let max_x = (self.full_width as f64 * self.scale - width as f64).max(0.0);
        let max_y = (self.full_height as f64 * self.scale - height as f64).max(0.0);
        self.scroll_x = self.scroll_x.clamp(0.0, max_x);
        self.scroll_y = self.scroll_y.clamp(0.0, max_y);
    }

    /// Record the layout size. Zero-sized layouts are ignored.
    pub fn set_layout_size(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.layout = Some((width, height));
        self.scale = self.constrain_scale(self.scale);
        self.constrain_scroll();
    }

    /// Change the scale, keeping the point under the layout center fixed.
    pub fn set_scale(&mut self, scale: f64) {
        let scale = self.constrain_scale(scale);
        let (half_w, half_h) = match self.layout {
            Some((w, h)) => (w as f64 / 2.0, h as f64 / 2.0),
            None => (0.0, 0.0),
        };
        let ratio = scale / self.scale;
        self.scroll_x = (self.scroll_x + half_w) * ratio - half_w;
        self.scroll_y = (self.scroll_y + half_h) * ratio - half_h;
        self.scale = scale;
        self.constrain_scroll();
    }

    pub fn set_scroll(&mut self, x: f64, y: f64) {
        if x.is_finite() && y.is_finite() {
            self.scroll_x = x;
            self.scroll_y = y;
            self.constrain_scroll();
        }
    }

    pub fn scroll_by(&mut self, dx: f64, dy: f64) {
        self.set_scroll(self.scroll_x + dx, self.scroll_y + dy);
    }

    /// Set the rotation in degrees; any value is normalised to `[0, 360)`.
    pub fn set_rotation(&mut self, degrees: f64) {
        if degrees.is_finite() {
            self.rotation_deg = degrees.rem_euclid(360.0);
        }
    }

    /// Scroll so that the normalised point `(x, y)` sits at `offset` on the
    /// layout. Does nothing before the first layout.
    pub fn snap_scroll_to(&mut self, x: f64, y: f64, offset: ScreenOffset) {
        let Some((width, height)) = self.layout else {
            return;
        };
        let scroll_x = x * self.full_width as f64 * self.scale + offset.x * width as f64;
        let scroll_y = y * self.full_height as f64 * self.scale + offset.y * height as f64;
        self.set_scroll(scroll_x, scroll_y);
    }

    /// The viewport to resolve, or `None` before the first layout.
    pub fn viewport(&self) -> Option<Viewport> {
        let (width, height) = self.layout?;
        let padding = self.padding as f64;
        let left = (self.scroll_x - padding).floor();
        let top = (self.scroll_y - padding).floor();
        let right = (self.scroll_x + width as f64 + padding).ceil();
        let bottom = (self.scroll_y + height as f64 + padding).ceil();
        Some(
            Viewport::new(
                saturating_i32(left),
                saturating_i32(top),
                saturating_i32(right),
                saturating_i32(bottom),
            )
            .with_angle(self.rotation_deg.to_radians() as f32),
        )
    }

    /// Normalised map coordinates of the layout center.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        let (width, height) = self.layout?;
        let x = (self.scroll_x + width as f64 / 2.0) / (self.full_width as f64 * self.scale);
        let y = (self.scroll_y + height as f64 / 2.0) / (self.full_height as f64 * self.scale);
        Some((x, y))
    }

    /// Corners of the visible area, rotation included, grown by `padding`
    /// layout pixels on each side.
    pub fn visible_area(&self, padding: u32) -> Option<VisibleArea> {
        let (width, height) = self.layout?;
        let (cx, cy) = self.centroid()?;
        let full_w = self.full_width as f64;
        let full_h = self.full_height as f64;

        // Work in full-resolution pixels so rotation is not skewed by the
        // map's aspect ratio.
        let center = (cx * full_w, cy * full_h);
        let half_w = (width as f64 + 2.0 * padding as f64) / (2.0 * self.scale);
        let half_h = (height as f64 + 2.0 * padding as f64) / (2.0 * self.scale);
        let (sin, cos) = (-self.rotation_deg.to_radians()).sin_cos();

        let corner = |dx: f64, dy: f64| {
            let x = center.0 + dx * cos - dy * sin;
            let y = center.1 + dx * sin + dy * cos;
            (x / full_w, y / full_h)
        };

        Some(VisibleArea {
            p1: corner(-half_w, -half_h),
            p2: corner(half_w, -half_h),
            p3: corner(half_w, half_h),
            p4: corner(-half_w, half_h),
        })
    }

    /// Normalised bounding box of the visible area, rotation included.
    pub fn visible_bounding_box(&self) -> Option<BoundingBox> {
        self.visible_area(0).map(|area| area.bounding_box())
    }
}

fn saturating_i32(value: f64) -> i32 {
    value.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}
