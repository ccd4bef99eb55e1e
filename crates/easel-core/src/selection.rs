//! Selection set and manipulation handles.

use crate::element::{Element, ElementId};
use crate::scene::Scene;
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Distance from the element's top edge to the rotation handle (canvas units).
pub const ROTATE_HANDLE_OFFSET: f64 = 25.0;
/// Smallest width/height a resize can produce.
pub const MIN_RESIZE_EXTENT: f64 = 1.0;

/// An ordered set of selected element ids. Insertion order is kept so the
/// most recently selected element can act as the primary one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    ids: Vec<ElementId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selection from ids, dropping duplicates.
    pub fn from_ids(ids: impl IntoIterator<Item = ElementId>) -> Self {
        let mut selection = Self::new();
        selection.extend(ids);
        selection
    }

    pub fn ids(&self) -> &[ElementId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.ids.contains(&id)
    }

    /// Most recently added id.
    pub fn primary(&self) -> Option<ElementId> {
        self.ids.last().copied()
    }

    /// Replace the selection with a single id.
    pub fn select(&mut self, id: ElementId) {
        self.ids.clear();
        self.ids.push(id);
    }

    pub fn add(&mut self, id: ElementId) {
        if !self.contains(id) {
            self.ids.push(id);
        }
    }

    pub fn remove(&mut self, id: ElementId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|x| *x != id);
        before != self.ids.len()
    }

    /// Add the id if absent, remove it if present.
    pub fn toggle(&mut self, id: ElementId) {
        if !self.remove(id) {
            self.ids.push(id);
        }
    }

    pub fn extend(&mut self, ids: impl IntoIterator<Item = ElementId>) {
        for id in ids {
            self.add(id);
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn union(&self, other: &Selection) -> Selection {
        let mut result = self.clone();
        result.extend(other.ids.iter().copied());
        result
    }

    pub fn intersection(&self, other: &Selection) -> Selection {
        Selection {
            ids: self.ids.iter().copied().filter(|id| other.contains(*id)).collect(),
        }
    }

    pub fn difference(&self, other: &Selection) -> Selection {
        Selection {
            ids: self.ids.iter().copied().filter(|id| !other.contains(*id)).collect(),
        }
    }

    /// Drop ids that no longer exist in the scene. Returns whether anything changed.
    pub fn retain_existing(&mut self, scene: &Scene) -> bool {
        let before = self.ids.len();
        self.ids.retain(|id| scene.contains(*id));
        before != self.ids.len()
    }

    /// Select every visible element, in paint order.
    pub fn select_all(&mut self, scene: &Scene) {
        self.ids = scene
            .elements_ordered()
            .into_iter()
            .filter(|e| scene.is_effectively_visible(e.id))
            .map(|e| e.id)
            .collect();
    }

    /// Marquee selection. With `additive`, the hits are unioned into the current set.
    pub fn select_in_rect(&mut self, scene: &Scene, rect: Rect, additive: bool) {
        let hits = scene.elements_in_rect(rect);
        if !additive {
            self.ids.clear();
        }
        self.extend(hits);
    }

    /// Click selection: the frontmost hit replaces the selection, or toggles it
    /// when `additive`. Clicking empty canvas clears a non-additive selection.
    /// Returns the hit id.
    pub fn select_at(
        &mut self,
        scene: &Scene,
        point: Point,
        tolerance: f64,
        additive: bool,
    ) -> Option<ElementId> {
        let hit = scene.elements_at_point(point, tolerance).first().copied();
        match (hit, additive) {
            (Some(id), true) => self.toggle(id),
            (Some(id), false) => self.select(id),
            (None, false) => self.clear(),
            (None, true) => {}
        }
        hit
    }
}

/// Corner positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Type of selection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    /// Corner handle for resizing.
    Corner(Corner),
    /// Rotation handle (positioned above the element).
    Rotate,
}

/// A selection handle with its position and type.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    /// Position in canvas coordinates.
    pub position: Point,
    pub kind: HandleKind,
}

impl Handle {
    pub fn new(position: Point, kind: HandleKind) -> Self {
        Self { position, kind }
    }

    /// Check if a point (in canvas coordinates) hits this handle.
    /// `tolerance` should be adjusted for zoom.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let dx = point.x - self.position.x;
        let dy = point.y - self.position.y;
        dx * dx + dy * dy <= tolerance * tolerance
    }
}

/// Get the handles for an element. Edges have none; their geometry follows their endpoints.
pub fn handles_for(element: &Element) -> Vec<Handle> {
    if element.is_edge() {
        return Vec::new();
    }
    let frame = element.frame();
    let center = frame.center();
    let half_w = frame.width() / 2.0;
    let half_h = frame.height() / 2.0;
    let rotation = element.rotation.to_radians();

    let rotate_point = |dx: f64, dy: f64| -> Point {
        let (sin_r, cos_r) = rotation.sin_cos();
        Point::new(
            center.x + dx * cos_r - dy * sin_r,
            center.y + dx * sin_r + dy * cos_r,
        )
    };

    vec![
        Handle::new(rotate_point(-half_w, -half_h), HandleKind::Corner(Corner::TopLeft)),
        Handle::new(rotate_point(half_w, -half_h), HandleKind::Corner(Corner::TopRight)),
        Handle::new(rotate_point(-half_w, half_h), HandleKind::Corner(Corner::BottomLeft)),
        Handle::new(rotate_point(half_w, half_h), HandleKind::Corner(Corner::BottomRight)),
        Handle::new(rotate_point(0.0, -half_h - ROTATE_HANDLE_OFFSET), HandleKind::Rotate),
    ]
}

/// Find which handle (if any) is hit at the given point.
pub fn hit_test_handles(element: &Element, point: Point, tolerance: f64) -> Option<HandleKind> {
    handles_for(element)
        .into_iter()
        .find(|handle| handle.hit_test(point, tolerance))
        .map(|handle| handle.kind)
}

/// Resize a frame by dragging one corner by `delta`.
///
/// Dragging past the opposite corner flips the frame instead of producing a
/// negative size. `keep_aspect_ratio` preserves the original proportions.
pub fn resize_frame(frame: Rect, corner: Corner, delta: Vec2, keep_aspect_ratio: bool) -> Rect {
    // The corner opposite the dragged one stays fixed.
    let (fixed, dragged) = match corner {
        Corner::TopLeft => (
            Point::new(frame.x1, frame.y1),
            Point::new(frame.x0, frame.y0) + delta,
        ),
        Corner::TopRight => (
            Point::new(frame.x0, frame.y1),
            Point::new(frame.x1, frame.y0) + delta,
        ),
        Corner::BottomLeft => (
            Point::new(frame.x1, frame.y0),
            Point::new(frame.x0, frame.y1) + delta,
        ),
        Corner::BottomRight => (
            Point::new(frame.x0, frame.y0),
            Point::new(frame.x1, frame.y1) + delta,
        ),
    };
    let span = dragged - fixed;

    let (width, height) = if keep_aspect_ratio {
        let aspect = frame.width() / frame.height().max(0.1);
        let extent = span.x.abs().max(span.y.abs()).max(MIN_RESIZE_EXTENT);
        (extent, extent / aspect)
    } else {
        (
            span.x.abs().max(MIN_RESIZE_EXTENT),
            span.y.abs().max(MIN_RESIZE_EXTENT),
        )
    };

    let x0 = if span.x < 0.0 { fixed.x - width } else { fixed.x };
    let y0 = if span.y < 0.0 { fixed.y - height } else { fixed.y };
    Rect::new(x0, y0, x0 + width, y0 + height)
}

/// Rotation (degrees, 0 = handle straight up) for a cursor dragged around `center`.
pub fn rotation_from_cursor(center: Point, cursor: Point) -> f64 {
    let dx = cursor.x - center.x;
    let dy = cursor.y - center.y;
    crate::element::normalize_degrees(dy.atan2(dx).to_degrees() + 90.0)
}
