//! Viewport module for pan/zoom transforms.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Allowed zoom range and zoom-in/out step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomLimits {
    /// Minimum allowed zoom level (strictly positive).
    pub min: f64,
    /// Maximum allowed zoom level.
    pub max: f64,
    /// Multiplicative factor used by zoom in/out.
    pub step: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min: 0.1,
            max: 8.0,
            step: 1.2,
        }
    }
}

impl ZoomLimits {
    /// Smallest zoom ever used for inversion, even with a misconfigured minimum.
    const FLOOR: f64 = 1e-3;

    /// Clamp a zoom factor into range. Non-finite input falls back to 1.0.
    pub fn clamp(&self, zoom: f64) -> f64 {
        let min = self.min.max(Self::FLOOR);
        let max = self.max.max(min);
        if zoom.is_finite() {
            zoom.clamp(min, max)
        } else {
            1.0_f64.clamp(min, max)
        }
    }
}

/// Viewport defines the screen/canvas mapping for a scene.
///
/// `x`/`y` are the pan offset in screen pixels, `zoom` is the scale factor
/// (1.0 = 100%). A canvas point `p` appears on screen at `p * zoom + (x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// Convert a screen point to canvas coordinates.
///
/// Pan is removed first, then the point is divided by the clamped zoom.
pub fn screen_to_canvas(screen_point: Point, viewport: &Viewport, limits: &ZoomLimits) -> Point {
    let zoom = limits.clamp(viewport.zoom);
    Point::new(
        (screen_point.x - viewport.x) / zoom,
        (screen_point.y - viewport.y) / zoom,
    )
}

/// Convert a canvas point to screen coordinates.
pub fn canvas_to_screen(canvas_point: Point, viewport: &Viewport, limits: &ZoomLimits) -> Point {
    let zoom = limits.clamp(viewport.zoom);
    Point::new(
        canvas_point.x * zoom + viewport.x,
        canvas_point.y * zoom + viewport.y,
    )
}

impl Viewport {
    pub fn new(x: f64, y: f64, zoom: f64) -> Self {
        Self { x, y, zoom }
    }

    pub fn offset(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Get the affine transform for rendering.
    ///
    /// This transform converts canvas coordinates to screen coordinates.
    pub fn transform(&self, limits: &ZoomLimits) -> Affine {
        Affine::translate(self.offset()) * Affine::scale(limits.clamp(self.zoom))
    }

    /// Get the inverse transform for input handling.
    pub fn inverse_transform(&self, limits: &ZoomLimits) -> Affine {
        Affine::scale(1.0 / limits.clamp(self.zoom)) * Affine::translate(-self.offset())
    }

    /// Pan the viewport by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.x += delta.x;
        self.y += delta.y;
    }

    /// Set the zoom level, clamped to the limits.
    pub fn set_zoom(&mut self, zoom: f64, limits: &ZoomLimits) {
        self.zoom = limits.clamp(zoom);
    }

    /// Zoom the viewport, keeping the given screen point fixed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64, limits: &ZoomLimits) {
        let current = limits.clamp(self.zoom);
        let new_zoom = limits.clamp(current * factor);
        if (new_zoom - current).abs() < f64::EPSILON {
            self.zoom = current;
            return;
        }

        // Canvas point under the cursor before zoom
        let anchor = screen_to_canvas(screen_point, self, limits);
        self.zoom = new_zoom;

        // Adjust the pan so the anchor stays at screen_point
        let moved = canvas_to_screen(anchor, self, limits);
        self.x += screen_point.x - moved.x;
        self.y += screen_point.y - moved.y;
    }

    /// Zoom in by one step around a screen point.
    pub fn zoom_in(&mut self, screen_point: Point, limits: &ZoomLimits) {
        self.zoom_at(screen_point, limits.step, limits);
    }

    /// Zoom out by one step around a screen point.
    pub fn zoom_out(&mut self, screen_point: Point, limits: &ZoomLimits) {
        self.zoom_at(screen_point, 1.0 / limits.step, limits);
    }

    /// Reset to the origin at 100%.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fit the viewport to show the given canvas bounds inside a screen area.
    ///
    /// Never zooms in past 100%, so small diagrams stay at their natural size.
    pub fn fit_to_bounds(&mut self, bounds: Rect, screen: Size, padding: f64, limits: &ZoomLimits) {
        if bounds.width() <= 0.0 && bounds.height() <= 0.0 {
            self.reset();
            return;
        }

        let available = Size::new(
            (screen.width - padding * 2.0).max(1.0),
            (screen.height - padding * 2.0).max(1.0),
        );
        let scale_x = available.width / bounds.width().max(1.0);
        let scale_y = available.height / bounds.height().max(1.0);
        self.zoom = limits.clamp(scale_x.min(scale_y).min(1.0));

        // Center the bounds in the screen area
        let center = bounds.center();
        self.x = screen.width / 2.0 - center.x * self.zoom;
        self.y = screen.height / 2.0 - center.y * self.zoom;
    }

    /// Canvas-space rectangle visible in a screen area of the given size.
    pub fn visible_rect(&self, screen: Size, limits: &ZoomLimits) -> Rect {
        let top_left = screen_to_canvas(Point::ZERO, self, limits);
        let bottom_right = screen_to_canvas(Point::new(screen.width, screen.height), self, limits);
        Rect::from_points(top_left, bottom_right)
    }
}
