//! React-Flow-style interchange JSON.
//!
//! Import maps `nodes[]`/`edges[]` with string ids onto fresh element ids.
//! Export writes the same shape. The format is lossy (no groups, no z-order,
//! styles reduced to two colors) and is never used as a save format.

use crate::document::{DocumentError, DocumentResult, LoadReport};
use crate::element::{
    ChartKind, DataSeries, EdgeRoute, Element, ElementId, FlowStep, NodeContent,
    SerializableColor, ShapeFamily, TaskStatus,
};
use crate::scene::{DiagramType, Scene};
use kurbo::{Point, Size};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

const DEFAULT_NODE_WIDTH: f64 = 150.0;
const DEFAULT_NODE_HEIGHT: f64 = 60.0;

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn f64_field(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

fn flow_step(name: &str) -> Option<FlowStep> {
    Some(match name {
        "start" => FlowStep::Start,
        "end" => FlowStep::End,
        "intermediate" | "event" => FlowStep::Intermediate,
        "process" | "action" | "task" => FlowStep::Process,
        "subprocess" => FlowStep::Subprocess,
        "decision" | "gateway" => FlowStep::Decision,
        "parallel" => FlowStep::Parallel,
        "document" => FlowStep::Document,
        "data" => FlowStep::Data,
        "database" => FlowStep::Database,
        "annotation" => FlowStep::Annotation,
        _ => return None,
    })
}

fn flow_step_name(step: FlowStep) -> &'static str {
    match step {
        FlowStep::Start => "start",
        FlowStep::End => "end",
        FlowStep::Intermediate => "intermediate",
        FlowStep::Process => "process",
        FlowStep::Subprocess => "subprocess",
        FlowStep::Decision => "decision",
        FlowStep::Parallel => "parallel",
        FlowStep::Document => "document",
        FlowStep::Data => "data",
        FlowStep::Database => "database",
        FlowStep::Annotation => "annotation",
    }
}

fn shape_family(name: &str) -> Option<ShapeFamily> {
    Some(match name {
        "rectangle" | "shape" | "default" => ShapeFamily::Rectangle,
        "rounded" | "rounded_rectangle" => ShapeFamily::RoundedRectangle,
        "ellipse" | "circle" => ShapeFamily::Ellipse,
        "diamond" => ShapeFamily::Diamond,
        "triangle" => ShapeFamily::Triangle,
        "hexagon" => ShapeFamily::Hexagon,
        "parallelogram" => ShapeFamily::Parallelogram,
        "cylinder" => ShapeFamily::Cylinder,
        _ => return None,
    })
}

fn shape_family_name(family: ShapeFamily) -> &'static str {
    match family {
        ShapeFamily::Rectangle => "rectangle",
        ShapeFamily::RoundedRectangle => "rounded_rectangle",
        ShapeFamily::Ellipse => "ellipse",
        ShapeFamily::Diamond => "diamond",
        ShapeFamily::Triangle => "triangle",
        ShapeFamily::Hexagon => "hexagon",
        ShapeFamily::Parallelogram => "parallelogram",
        ShapeFamily::Cylinder => "cylinder",
    }
}

fn mindmap_level(kind: &str) -> u32 {
    match kind {
        "root" => 0,
        "main" => 1,
        "leaf" => 3,
        _ => 2,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Build node content from an interchange `type` and `data` object.
/// Unknown types become rectangles; the caller records the original type.
fn node_content(node_type: &str, data: &Value) -> (NodeContent, bool) {
    let stripped = node_type
        .strip_prefix("flowchart-")
        .or_else(|| node_type.strip_prefix("bpmn-"))
        .unwrap_or(node_type);

    if let Some(step) = flow_step(stripped) {
        let status = data
            .get("status")
            .and_then(|s| serde_json::from_value::<TaskStatus>(s.clone()).ok());
        let assignee = str_field(data, "assignee").map(str::to_string);
        return (NodeContent::Flow { step, status, assignee }, true);
    }
    if let Some(kind) = node_type.strip_prefix("mindmap-") {
        let content = NodeContent::MindMap {
            level: data
                .get("level")
                .and_then(Value::as_u64)
                .map_or_else(|| mindmap_level(kind), |l| l as u32),
            expanded: data.get("expanded").and_then(Value::as_bool).unwrap_or(true),
            tags: string_list(data.get("tags")),
        };
        return (content, true);
    }
    if let Some(role) = node_type.strip_prefix("org-") {
        let content = NodeContent::OrgUnit {
            title: str_field(data, "title").unwrap_or(role).to_string(),
            department: str_field(data, "department").unwrap_or_default().to_string(),
            reports_to: None,
        };
        return (content, true);
    }
    match node_type {
        "text" => (
            NodeContent::Text {
                body: str_field(data, "text")
                    .or_else(|| str_field(data, "label"))
                    .unwrap_or_default()
                    .to_string(),
            },
            true,
        ),
        "image" => (
            NodeContent::Image {
                source: str_field(data, "src")
                    .or_else(|| str_field(data, "url"))
                    .unwrap_or_default()
                    .to_string(),
                alt: str_field(data, "alt").unwrap_or_default().to_string(),
            },
            true,
        ),
        "chart" => {
            let chart = data
                .get("chartType")
                .and_then(|c| serde_json::from_value::<ChartKind>(c.clone()).ok())
                .unwrap_or_default();
            let series = data
                .get("series")
                .and_then(|s| serde_json::from_value::<Vec<DataSeries>>(s.clone()).ok())
                .unwrap_or_default();
            (NodeContent::Chart { chart, series }, true)
        }
        "table" => {
            let rows = data
                .get("rows")
                .and_then(|r| serde_json::from_value::<Vec<Vec<String>>>(r.clone()).ok())
                .unwrap_or_default();
            let header = data.get("header").and_then(Value::as_bool).unwrap_or(false);
            (NodeContent::Table { rows, header }, true)
        }
        other => match shape_family(other) {
            Some(family) => (NodeContent::Shape { family }, true),
            None => (NodeContent::default(), false),
        },
    }
}

fn edge_route(edge_type: Option<&str>) -> EdgeRoute {
    match edge_type {
        Some("smoothstep") => EdgeRoute::SmoothStep,
        Some("step") => EdgeRoute::Step,
        Some("default") | Some("bezier") | Some("simplebezier") => EdgeRoute::Bezier,
        _ => EdgeRoute::Straight,
    }
}

fn edge_route_name(route: EdgeRoute) -> &'static str {
    match route {
        EdgeRoute::Straight => "straight",
        EdgeRoute::SmoothStep => "smoothstep",
        EdgeRoute::Step => "step",
        EdgeRoute::Bezier => "default",
    }
}

/// Import interchange JSON into a new scene.
pub fn import_interchange(json: &str) -> DocumentResult<(Scene, LoadReport)> {
    let data: Value = serde_json::from_str(json)?;
    let nodes = data
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| DocumentError::Malformed("missing 'nodes' array".into()))?;

    let kind = data
        .get("type")
        .and_then(|t| serde_json::from_value::<DiagramType>(t.clone()).ok())
        .unwrap_or(DiagramType::Flowchart);
    let mut scene = Scene::new(kind);
    let mut report = LoadReport::default();
    let mut ids: HashMap<String, ElementId> = HashMap::new();

    if let Some(viewport) = data.get("viewport") {
        scene.viewport.x = f64_field(viewport, "x").unwrap_or(0.0);
        scene.viewport.y = f64_field(viewport, "y").unwrap_or(0.0);
        scene.viewport.zoom = f64_field(viewport, "zoom").unwrap_or(1.0);
    }

    for node in nodes {
        let Some(source_id) = node.get("id").map(value_to_key) else {
            report.warnings.push("Skipped node without id".into());
            continue;
        };
        let node_type = str_field(node, "type").unwrap_or("default");
        let empty = Value::Object(Map::new());
        let node_data = node.get("data").unwrap_or(&empty);
        let position = node
            .get("position")
            .map(|p| Point::new(f64_field(p, "x").unwrap_or(0.0), f64_field(p, "y").unwrap_or(0.0)))
            .unwrap_or(Point::ZERO);
        let size = Size::new(
            f64_field(node, "width").unwrap_or(DEFAULT_NODE_WIDTH),
            f64_field(node, "height").unwrap_or(DEFAULT_NODE_HEIGHT),
        );

        let (content, known) = node_content(node_type, node_data);
        let mut element = Element::node(content, position, size)
            .with_label(str_field(node_data, "label").unwrap_or_default());
        if !known {
            element.metadata.insert("source_type".into(), Value::from(node_type));
        }
        if let Some(color) = str_field(node_data, "color").and_then(SerializableColor::parse) {
            element.style.fill = Some(color);
        }
        if let Some(Value::Object(extra)) = node_data.get("metadata") {
            element.metadata.extend(extra.clone());
        }

        if ids.contains_key(&source_id) {
            report.warnings.push(format!("Skipped duplicate node id {source_id}"));
            continue;
        }
        ids.insert(source_id, element.id);
        scene = scene.add_element(element).map_err(|e| DocumentError::Malformed(e.to_string()))?;
    }

    for edge in data.get("edges").and_then(Value::as_array).into_iter().flatten() {
        let endpoints = (
            edge.get("source").map(value_to_key).and_then(|s| ids.get(&s).copied()),
            edge.get("target").map(value_to_key).and_then(|t| ids.get(&t).copied()),
        );
        let (Some(source), Some(target)) = endpoints else {
            report.warnings.push(format!(
                "Skipped edge {} with unknown endpoints",
                edge.get("id").map(value_to_key).unwrap_or_default()
            ));
            continue;
        };

        let mut element = Element::edge(source, target);
        if let Some(data) = element.as_edge_mut() {
            data.source_handle = str_field(edge, "sourceHandle").map(str::to_string);
            data.target_handle = str_field(edge, "targetHandle").map(str::to_string);
            data.route = edge_route(str_field(edge, "type"));
            data.animated = edge.get("animated").and_then(Value::as_bool).unwrap_or(false);
        }
        element.label = str_field(edge, "label")
            .or_else(|| edge.get("data").and_then(|d| str_field(d, "label")))
            .unwrap_or_default()
            .to_string();
        scene = scene.add_element(element).map_err(|e| DocumentError::Malformed(e.to_string()))?;
    }

    for warning in &report.warnings {
        log::warn!("{}", warning);
    }
    log::info!("Imported {} elements from interchange JSON", scene.len());
    Ok((scene, report))
}

fn value_to_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn node_type_name(content: &NodeContent) -> String {
    match content {
        NodeContent::Shape { family } => shape_family_name(*family).to_string(),
        NodeContent::Flow { step, .. } => flow_step_name(*step).to_string(),
        NodeContent::MindMap { level, .. } => match level {
            0 => "mindmap-root",
            1 => "mindmap-main",
            2 => "mindmap-branch",
            _ => "mindmap-leaf",
        }
        .to_string(),
        NodeContent::OrgUnit { .. } => "org-unit".to_string(),
        other => other.type_name().to_string(),
    }
}

fn node_data(element: &Element, content: &NodeContent, include_metadata: bool) -> Value {
    let mut data = Map::new();
    data.insert("label".into(), Value::from(element.label.clone()));
    if let Some(fill) = element.style.fill {
        data.insert("color".into(), Value::from(fill.to_hex()));
    }
    match content {
        NodeContent::Shape { .. } => {}
        NodeContent::Flow { status, assignee, .. } => {
            if let Some(status) = status {
                data.insert("status".into(), json!(status));
            }
            if let Some(assignee) = assignee {
                data.insert("assignee".into(), Value::from(assignee.clone()));
            }
        }
        NodeContent::MindMap { level, expanded, tags } => {
            data.insert("level".into(), Value::from(*level));
            data.insert("expanded".into(), Value::from(*expanded));
            data.insert("tags".into(), json!(tags));
        }
        NodeContent::OrgUnit { title, department, reports_to } => {
            data.insert("title".into(), Value::from(title.clone()));
            data.insert("department".into(), Value::from(department.clone()));
            if let Some(manager) = reports_to {
                data.insert("reportsTo".into(), Value::from(manager.to_string()));
            }
        }
        NodeContent::Text { body } => {
            data.insert("text".into(), Value::from(body.clone()));
        }
        NodeContent::Image { source, alt } => {
            data.insert("src".into(), Value::from(source.clone()));
            data.insert("alt".into(), Value::from(alt.clone()));
        }
        NodeContent::Chart { chart, series } => {
            data.insert("chartType".into(), json!(chart));
            data.insert("series".into(), json!(series));
        }
        NodeContent::Table { rows, header } => {
            data.insert("rows".into(), json!(rows));
            data.insert("header".into(), Value::from(*header));
        }
    }
    if include_metadata && !element.metadata.is_empty() {
        data.insert("metadata".into(), Value::Object(element.metadata.clone()));
    }
    Value::Object(data)
}

/// Export a scene as interchange JSON. Hidden elements are skipped.
pub fn to_interchange(scene: &Scene, include_metadata: bool) -> Value {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for element in scene.elements_ordered() {
        if !scene.is_effectively_visible(element.id) {
            continue;
        }
        if let Some(content) = element.as_node() {
            nodes.push(json!({
                "id": element.id.to_string(),
                "type": node_type_name(content),
                "position": { "x": element.position.x, "y": element.position.y },
                "width": element.size.width,
                "height": element.size.height,
                "data": node_data(element, content, include_metadata),
            }));
        } else if let Some(edge) = element.as_edge() {
            let mut value = json!({
                "id": element.id.to_string(),
                "source": edge.source.to_string(),
                "target": edge.target.to_string(),
                "type": edge_route_name(edge.route),
                "animated": edge.animated,
            });
            if let Value::Object(map) = &mut value {
                if !element.label.is_empty() {
                    map.insert("label".into(), Value::from(element.label.clone()));
                }
                if let Some(handle) = &edge.source_handle {
                    map.insert("sourceHandle".into(), Value::from(handle.clone()));
                }
                if let Some(handle) = &edge.target_handle {
                    map.insert("targetHandle".into(), Value::from(handle.clone()));
                }
            }
            edges.push(value);
        }
    }

    let mut root = json!({
        "type": scene.kind,
        "nodes": nodes,
        "edges": edges,
        "viewport": { "x": scene.viewport.x, "y": scene.viewport.y, "zoom": scene.viewport.zoom },
    });
    if include_metadata {
        if let Value::Object(map) = &mut root {
            map.insert("metadata".into(), json!(scene.meta));
        }
    }
    root
}
