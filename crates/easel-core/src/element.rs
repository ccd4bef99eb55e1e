//! Element definitions for the scene.
//!
//! An [`Element`] is either a node (shape, flow step, text block, chart...) or
//! an edge connecting two nodes. Per-kind payloads are closed enums so every
//! consumer (export, hit-testing, property panels) matches exhaustively, while
//! `metadata` carries free-form custom fields forward.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for elements.
pub type ElementId = Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub const fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Parse a CSS-style color (`#rgb`, `#rrggbb`, `#rrggbbaa` or `transparent`).
    /// Returns `None` for anything else.
    pub fn parse(color: &str) -> Option<Self> {
        let color = color.trim();
        if color.eq_ignore_ascii_case("transparent") {
            return Some(Self::transparent());
        }
        let hex = color.strip_prefix('#')?;
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let r = channel(&hex[0..1])? * 17;
                let g = channel(&hex[1..2])? * 17;
                let b = channel(&hex[2..3])? * 17;
                Some(Self::new(r, g, b, 255))
            }
            6 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            )),
            8 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            _ => None,
        }
    }

    /// Hex form without alpha (`#rrggbb`), as used by SVG attributes.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Alpha channel as a 0.0..=1.0 opacity.
    pub fn alpha_f64(self) -> f64 {
        f64::from(self.a) / 255.0
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Stroke style for outlines and edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl StrokeStyle {
    /// SVG `stroke-dasharray` value for this style, if any.
    pub fn dash_array(self, width: f64) -> Option<String> {
        match self {
            StrokeStyle::Solid => None,
            StrokeStyle::Dashed => Some(format!("{} {}", width * 4.0, width * 3.0)),
            StrokeStyle::Dotted => Some(format!("{} {}", width, width * 2.0)),
        }
    }
}

/// Visual style shared by nodes and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementStyle {
    /// Fill color (None = no fill).
    pub fill: Option<SerializableColor>,
    /// Stroke color.
    pub stroke: SerializableColor,
    /// Stroke width in canvas units.
    pub stroke_width: f64,
    pub stroke_style: StrokeStyle,
    /// Overall opacity (0.0 = fully transparent, 1.0 = fully opaque).
    pub opacity: f64,
    /// Label font size in canvas units.
    pub font_size: f64,
}

impl Default for ElementStyle {
    fn default() -> Self {
        Self {
            fill: Some(SerializableColor::white()),
            stroke: SerializableColor::new(31, 41, 55, 255),
            stroke_width: 2.0,
            stroke_style: StrokeStyle::Solid,
            opacity: 1.0,
            font_size: 14.0,
        }
    }
}

impl ElementStyle {
    /// Get the stroke color as a peniko Color.
    pub fn stroke_color(&self) -> Color {
        self.stroke.into()
    }

    /// Get the fill color as a peniko Color.
    pub fn fill_color(&self) -> Option<Color> {
        self.fill.map(Into::into)
    }
}

/// Outline family used to draw a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeFamily {
    #[default]
    Rectangle,
    RoundedRectangle,
    Ellipse,
    Diamond,
    Triangle,
    Hexagon,
    Parallelogram,
    Cylinder,
}

/// Flowchart step kinds (BPMN-flavoured).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Start,
    End,
    Intermediate,
    #[default]
    Process,
    Subprocess,
    Decision,
    Parallel,
    Document,
    Data,
    Database,
    Annotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Pie,
    Area,
}

/// A named series of values for chart nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeContent {
    /// Plain geometric shape.
    Shape { family: ShapeFamily },
    /// Flowchart step.
    Flow {
        step: FlowStep,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<TaskStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assignee: Option<String>,
    },
    /// Mind-map topic. Level 0 is the root.
    MindMap {
        level: u32,
        #[serde(default = "default_true")]
        expanded: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    },
    /// Org-chart position.
    OrgUnit {
        title: String,
        #[serde(default)]
        department: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reports_to: Option<ElementId>,
    },
    /// Free text block (slides, annotations).
    Text { body: String },
    /// Image referenced by URL (typically an object-store URL).
    Image {
        source: String,
        #[serde(default)]
        alt: String,
    },
    Chart {
        chart: ChartKind,
        #[serde(default)]
        series: Vec<DataSeries>,
    },
    Table {
        rows: Vec<Vec<String>>,
        #[serde(default)]
        header: bool,
    },
}

impl NodeContent {
    /// Outline used when drawing this node.
    pub fn outline(&self) -> ShapeFamily {
        match self {
            NodeContent::Shape { family } => *family,
            NodeContent::Flow { step, .. } => match step {
                FlowStep::Start | FlowStep::End | FlowStep::Intermediate => ShapeFamily::Ellipse,
                FlowStep::Decision | FlowStep::Parallel => ShapeFamily::Diamond,
                FlowStep::Data => ShapeFamily::Parallelogram,
                FlowStep::Database => ShapeFamily::Cylinder,
                FlowStep::Subprocess | FlowStep::Process => ShapeFamily::RoundedRectangle,
                FlowStep::Document | FlowStep::Annotation => ShapeFamily::Rectangle,
            },
            NodeContent::MindMap { level: 0, .. } => ShapeFamily::Ellipse,
            NodeContent::MindMap { .. } | NodeContent::OrgUnit { .. } => {
                ShapeFamily::RoundedRectangle
            }
            NodeContent::Text { .. }
            | NodeContent::Image { .. }
            | NodeContent::Chart { .. }
            | NodeContent::Table { .. } => ShapeFamily::Rectangle,
        }
    }

    /// Short type name used by interchange formats.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeContent::Shape { .. } => "shape",
            NodeContent::Flow { .. } => "flow",
            NodeContent::MindMap { .. } => "mindmap",
            NodeContent::OrgUnit { .. } => "org",
            NodeContent::Text { .. } => "text",
            NodeContent::Image { .. } => "image",
            NodeContent::Chart { .. } => "chart",
            NodeContent::Table { .. } => "table",
        }
    }
}

impl Default for NodeContent {
    fn default() -> Self {
        NodeContent::Shape {
            family: ShapeFamily::Rectangle,
        }
    }
}

/// How an edge is routed between its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRoute {
    #[default]
    Straight,
    SmoothStep,
    Step,
    Bezier,
}

/// Connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub source: ElementId,
    pub target: ElementId,
    /// Anchor on the source node (`top`, `right`, `bottom`, `left`; anything else is the center).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default)]
    pub route: EdgeRoute,
    #[serde(default)]
    pub animated: bool,
}

impl EdgeData {
    pub fn new(source: ElementId, target: ElementId) -> Self {
        Self {
            source,
            target,
            source_handle: None,
            target_handle: None,
            route: EdgeRoute::default(),
            animated: false,
        }
    }

    /// Whether this edge touches the given element.
    pub fn touches(&self, id: ElementId) -> bool {
        self.source == id || self.target == id
    }
}

/// Tagged element variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Node(NodeContent),
    Edge(EdgeData),
}

fn default_true() -> bool {
    true
}

/// Normalize an angle in degrees to `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// The atomic editable unit of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
    /// Top-left corner in canvas units.
    pub position: Point,
    pub size: Size,
    /// Rotation in degrees around the element center, in `[0, 360)`.
    #[serde(default)]
    pub rotation: f64,
    /// Paint and hit-test order (higher is in front). Unique within a scene.
    #[serde(default)]
    pub z_index: i64,
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Locked elements reject geometry changes and are skipped by drag hit-testing.
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub style: ElementStyle,
    /// Free-form custom fields, preserved verbatim.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Unknown fields from newer writers, written back on save.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Element {
    /// Create a node at `position` with the given size.
    pub fn node(content: NodeContent, position: Point, size: Size) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ElementKind::Node(content),
            position,
            size,
            rotation: 0.0,
            z_index: 0,
            visible: true,
            locked: false,
            label: String::new(),
            style: ElementStyle::default(),
            metadata: Map::new(),
            extra: Map::new(),
        }
    }

    /// Create an edge between two nodes. Its geometry is derived from the endpoints.
    pub fn edge(source: ElementId, target: ElementId) -> Self {
        let mut style = ElementStyle::default();
        style.fill = None;
        Self {
            id: Uuid::new_v4(),
            kind: ElementKind::Edge(EdgeData::new(source, target)),
            position: Point::ZERO,
            size: Size::ZERO,
            rotation: 0.0,
            z_index: 0,
            visible: true,
            locked: false,
            label: String::new(),
            style,
            metadata: Map::new(),
            extra: Map::new(),
        }
    }

    /// Builder-style label setter.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Builder-style style setter.
    pub fn with_style(mut self, style: ElementStyle) -> Self {
        self.style = style;
        self
    }

    pub fn is_node(&self) -> bool {
        matches!(self.kind, ElementKind::Node(_))
    }

    pub fn is_edge(&self) -> bool {
        matches!(self.kind, ElementKind::Edge(_))
    }

    pub fn as_node(&self) -> Option<&NodeContent> {
        match &self.kind {
            ElementKind::Node(content) => Some(content),
            ElementKind::Edge(_) => None,
        }
    }

    pub fn as_edge(&self) -> Option<&EdgeData> {
        match &self.kind {
            ElementKind::Edge(edge) => Some(edge),
            ElementKind::Node(_) => None,
        }
    }

    pub fn as_edge_mut(&mut self) -> Option<&mut EdgeData> {
        match &mut self.kind {
            ElementKind::Edge(edge) => Some(edge),
            ElementKind::Node(_) => None,
        }
    }

    /// Axis-aligned frame (ignores rotation).
    pub fn frame(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    pub fn center(&self) -> Point {
        self.frame().center()
    }

    /// Bounding box in canvas coordinates, accounting for rotation.
    pub fn bounds(&self) -> Rect {
        let frame = self.frame();
        if self.rotation == 0.0 {
            return frame;
        }
        let transform = self.rotation_transform();
        let corners = [
            Point::new(frame.x0, frame.y0),
            Point::new(frame.x1, frame.y0),
            Point::new(frame.x1, frame.y1),
            Point::new(frame.x0, frame.y1),
        ];
        let mut bounds = Rect::from_points(transform * corners[0], transform * corners[1]);
        for corner in &corners[2..] {
            bounds = bounds.union_pt(transform * *corner);
        }
        bounds
    }

    /// Rotation about the element center.
    pub fn rotation_transform(&self) -> Affine {
        let center = self.center().to_vec2();
        Affine::translate(center)
            * Affine::rotate(self.rotation.to_radians())
            * Affine::translate(-center)
    }

    /// Check if a canvas point hits this node's frame. Edges never hit here;
    /// the scene tests them against their routed endpoints.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        if self.is_edge() {
            return false;
        }
        let local = self.rotation_transform().inverse() * point;
        self.frame().inflate(tolerance, tolerance).contains(local)
    }

    /// Set rotation, normalizing to `[0, 360)`.
    pub fn set_rotation(&mut self, degrees: f64) {
        self.rotation = normalize_degrees(degrees);
    }

    /// Translate the element.
    pub fn translate(&mut self, delta: Vec2) {
        self.position += delta;
    }

    /// Regenerate the element's ID.
    /// Used when duplicating or importing so copies never share ids.
    pub fn regenerate_id(&mut self) -> ElementId {
        self.id = Uuid::new_v4();
        self.id
    }
}

/// Partial update for an element. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ElementStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<NodeContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<EdgeRoute>,
    /// Keys merged into the element's metadata; `null` removes a key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ElementPatch {
    pub fn position(mut self, position: Point) -> Self {
        self.position = Some(position);
        self
    }

    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn rotation(mut self, degrees: f64) -> Self {
        self.rotation = Some(degrees);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = Some(locked);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn style(mut self, style: ElementStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn content(mut self, content: NodeContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn route(mut self, route: EdgeRoute) -> Self {
        self.route = Some(route);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether the patch changes position, size or rotation.
    pub fn touches_geometry(&self) -> bool {
        self.position.is_some() || self.size.is_some() || self.rotation.is_some()
    }

    /// Only the position changes.
    pub fn is_move_only(&self) -> bool {
        self.position.is_some()
            && Self {
                position: None,
                ..self.clone()
            }
            .is_empty()
    }

    /// Only style and/or label change.
    pub fn is_style_only(&self) -> bool {
        (self.style.is_some() || self.label.is_some())
            && Self {
                style: None,
                label: None,
                ..self.clone()
            }
            .is_empty()
    }

    /// Apply the patch to an element. Kind compatibility is checked by the scene.
    pub(crate) fn apply_to(&self, element: &mut Element) {
        if let Some(position) = self.position {
            element.position = position;
        }
        if let Some(size) = self.size {
            element.size = Size::new(size.width.max(0.0), size.height.max(0.0));
        }
        if let Some(rotation) = self.rotation {
            element.set_rotation(rotation);
        }
        if let Some(visible) = self.visible {
            element.visible = visible;
        }
        if let Some(locked) = self.locked {
            element.locked = locked;
        }
        if let Some(label) = &self.label {
            element.label = label.clone();
        }
        if let Some(style) = &self.style {
            element.style = style.clone();
        }
        if let (Some(content), ElementKind::Node(current)) = (&self.content, &mut element.kind) {
            *current = content.clone();
        }
        if let (Some(route), ElementKind::Edge(edge)) = (self.route, &mut element.kind) {
            edge.route = route;
        }
        if let Some(metadata) = &self.metadata {
            for (key, value) in metadata {
                if value.is_null() {
                    element.metadata.remove(key);
                } else {
                    element.metadata.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_node(x: f64, y: f64, w: f64, h: f64) -> Element {
        Element::node(NodeContent::default(), Point::new(x, y), Size::new(w, h))
    }

    #[test]
    fn test_color_parse() {
        assert_eq!(SerializableColor::parse("#fff"), Some(SerializableColor::white()));
        assert_eq!(
            SerializableColor::parse("#1e90ff"),
            Some(SerializableColor::new(0x1e, 0x90, 0xff, 255))
        );
        assert_eq!(
            SerializableColor::parse("#00000080"),
            Some(SerializableColor::new(0, 0, 0, 0x80))
        );
        assert_eq!(SerializableColor::parse("transparent"), Some(SerializableColor::transparent()));
        assert_eq!(SerializableColor::parse("red"), None);
        assert_eq!(SerializableColor::parse("#12"), None);
    }

    #[test]
    fn test_color_peniko_conversion() {
        let color = SerializableColor::new(10, 20, 30, 40);
        let peniko: Color = color.into();
        assert_eq!(SerializableColor::from(peniko), color);
        assert_eq!(color.to_hex(), "#0a141e");
    }

    #[test]
    fn test_normalize_degrees() {
        assert!((normalize_degrees(370.0) - 10.0).abs() < 1e-9);
        assert!((normalize_degrees(-90.0) - 270.0).abs() < 1e-9);
        assert!(normalize_degrees(360.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_unrotated() {
        let node = rect_node(10.0, 20.0, 100.0, 50.0);
        assert_eq!(node.bounds(), Rect::new(10.0, 20.0, 110.0, 70.0));
        assert_eq!(node.center(), Point::new(60.0, 45.0));
    }

    #[test]
    fn test_bounds_rotated_quarter_turn() {
        let mut node = rect_node(0.0, 0.0, 100.0, 50.0);
        node.set_rotation(90.0);
        let bounds = node.bounds();
        // Center (50, 25) stays fixed; extents swap.
        assert!((bounds.width() - 50.0).abs() < 1e-9);
        assert!((bounds.height() - 100.0).abs() < 1e-9);
        assert!((bounds.center().x - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_hit_test_rotated() {
        let mut node = rect_node(0.0, 0.0, 100.0, 10.0);
        assert!(node.hit_test(Point::new(90.0, 5.0), 0.0));
        node.set_rotation(90.0);
        // The long axis is now vertical around (50, 5).
        assert!(!node.hit_test(Point::new(90.0, 5.0), 0.0));
        assert!(node.hit_test(Point::new(50.0, 45.0), 0.0));
    }

    #[test]
    fn test_patch_classification() {
        assert!(ElementPatch::default().position(Point::ZERO).is_move_only());
        assert!(!ElementPatch::default().position(Point::ZERO).label("a").is_move_only());
        assert!(ElementPatch::default().label("x").is_style_only());
        assert!(!ElementPatch::default().label("x").locked(true).is_style_only());
        assert!(ElementPatch::default().rotation(5.0).touches_geometry());
        assert!(ElementPatch::default().is_empty());
    }

    #[test]
    fn test_patch_metadata_merge() {
        let mut node = rect_node(0.0, 0.0, 10.0, 10.0);
        node.metadata.insert("keep".into(), Value::from(1));
        node.metadata.insert("drop".into(), Value::from(2));

        let mut merge = Map::new();
        merge.insert("drop".into(), Value::Null);
        merge.insert("add".into(), Value::from("x"));
        let patch = ElementPatch {
            metadata: Some(merge),
            ..Default::default()
        };
        patch.apply_to(&mut node);

        assert_eq!(node.metadata.get("keep"), Some(&Value::from(1)));
        assert!(node.metadata.get("drop").is_none());
        assert_eq!(node.metadata.get("add"), Some(&Value::from("x")));
    }

    #[test]
    fn test_flow_outline() {
        let decision = NodeContent::Flow {
            step: FlowStep::Decision,
            status: None,
            assignee: None,
        };
        assert_eq!(decision.outline(), ShapeFamily::Diamond);
        let root = NodeContent::MindMap {
            level: 0,
            expanded: true,
            tags: Vec::new(),
        };
        assert_eq!(root.outline(), ShapeFamily::Ellipse);
    }

    #[test]
    fn test_element_json_shape() {
        let node = rect_node(1.0, 2.0, 3.0, 4.0).with_label("A");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"]["node"]["kind"], "shape");
        assert_eq!(json["position"]["x"], 1.0);
        assert_eq!(json["size"]["height"], 4.0);

        let back: Element = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
