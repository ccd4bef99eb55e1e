//! Snap functionality for aligning points to the grid and rotations to angle steps.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Grid size for snapping (matches the visual grid).
pub const GRID_SIZE: f64 = 20.0;

/// Angle snap increment in degrees.
pub const ANGLE_SNAP_INCREMENT: f64 = 15.0;

/// Round each axis of `point` to the nearest multiple of `grid_size`.
/// A non-positive or non-finite grid size leaves the point unchanged.
pub fn snap_to_grid(point: Point, grid_size: f64) -> Point {
    if !(grid_size.is_finite() && grid_size > 0.0) {
        return point;
    }
    Point::new(
        (point.x / grid_size).round() * grid_size,
        (point.y / grid_size).round() * grid_size,
    )
}

/// Grid snapping settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Grid {
    pub size: f64,
    pub enabled: bool,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            size: GRID_SIZE,
            enabled: false,
        }
    }
}

impl Grid {
    /// Snap a point when snapping is enabled, otherwise return it unchanged.
    pub fn snap(&self, point: Point) -> Point {
        if self.enabled {
            snap_to_grid(point, self.size)
        } else {
            point
        }
    }

    /// Snap a single scalar (width, height) to the grid.
    pub fn snap_length(&self, value: f64) -> f64 {
        if self.enabled && self.size.is_finite() && self.size > 0.0 {
            (value / self.size).round() * self.size
        } else {
            value
        }
    }
}

/// Snap an angle to the nearest increment.
/// Returns the snapped angle in degrees (0-360). A non-positive increment only normalizes.
pub fn snap_angle(angle_degrees: f64, increment: f64) -> f64 {
    let snapped = if increment > 0.0 {
        (angle_degrees / increment).round() * increment
    } else {
        angle_degrees
    };
    crate::element::normalize_degrees(snapped)
}
