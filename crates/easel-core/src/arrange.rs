//! Alignment, distribution, auto-layout and duplication over a set of elements.
//!
//! All functions take the current scene by reference and return the next
//! version; errors leave the input untouched.

use crate::element::{Element, ElementId, ElementKind, ElementPatch};
use crate::scene::{Scene, SceneError, SceneResult};
use kurbo::{Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Alignment target within the selection bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Top,
    Middle,
    Bottom,
}

/// Distribution axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Resolve ids to nodes, failing on unknown ids. Edges are skipped since their
/// geometry follows their endpoints.
fn selected_nodes<'a>(scene: &'a Scene, ids: &[ElementId]) -> SceneResult<Vec<&'a Element>> {
    let mut nodes: Vec<&Element> = Vec::with_capacity(ids.len());
    for id in ids {
        let element = scene.element(*id).ok_or(SceneError::NotFound(*id))?;
        if element.is_node() && !nodes.iter().any(|n| n.id == element.id) {
            nodes.push(element);
        }
    }
    Ok(nodes)
}

/// Align nodes to a common edge or center line of their combined bounds.
///
/// Locked nodes count towards the bounds but are not moved.
pub fn align(scene: &Scene, ids: &[ElementId], alignment: Alignment) -> SceneResult<Scene> {
    let nodes = selected_nodes(scene, ids)?;
    if nodes.len() < 2 {
        return Err(SceneError::InsufficientSelection {
            required: 2,
            actual: nodes.len(),
        });
    }

    let Some(bounds) = nodes.iter().map(|n| n.bounds()).reduce(|a, b| a.union(b)) else {
        return Ok(scene.clone());
    };
    let reference = match alignment {
        Alignment::Left => bounds.x0,
        Alignment::Center => bounds.center().x,
        Alignment::Right => bounds.x1,
        Alignment::Top => bounds.y0,
        Alignment::Middle => bounds.center().y,
        Alignment::Bottom => bounds.y1,
    };

    let patches: Vec<(ElementId, ElementPatch)> = nodes
        .iter()
        .filter(|n| !scene.is_effectively_locked(n.id))
        .filter_map(|node| {
            let b = node.bounds();
            let delta = match alignment {
                Alignment::Left => Vec2::new(reference - b.x0, 0.0),
                Alignment::Center => Vec2::new(reference - b.center().x, 0.0),
                Alignment::Right => Vec2::new(reference - b.x1, 0.0),
                Alignment::Top => Vec2::new(0.0, reference - b.y0),
                Alignment::Middle => Vec2::new(0.0, reference - b.center().y),
                Alignment::Bottom => Vec2::new(0.0, reference - b.y1),
            };
            (delta != Vec2::ZERO)
                .then(|| (node.id, ElementPatch::default().position(node.position + delta)))
        })
        .collect();

    scene.update_elements(&patches)
}

/// Space node centers evenly between the two extreme nodes on an axis.
///
/// Needs at least three nodes. The extremes and locked nodes stay where they are.
pub fn distribute(scene: &Scene, ids: &[ElementId], axis: Axis) -> SceneResult<Scene> {
    let mut nodes = selected_nodes(scene, ids)?;
    if nodes.len() < 3 {
        return Err(SceneError::InsufficientSelection {
            required: 3,
            actual: nodes.len(),
        });
    }

    let center_on = |bounds: Rect| match axis {
        Axis::Horizontal => bounds.center().x,
        Axis::Vertical => bounds.center().y,
    };
    // Stable sort keeps input order for ties.
    nodes.sort_by(|a, b| center_on(a.bounds()).total_cmp(&center_on(b.bounds())));

    let first = center_on(nodes[0].bounds());
    let last = center_on(nodes[nodes.len() - 1].bounds());
    let step = (last - first) / (nodes.len() - 1) as f64;

    let patches: Vec<(ElementId, ElementPatch)> = nodes
        .iter()
        .enumerate()
        .skip(1)
        .take(nodes.len() - 2)
        .filter(|(_, n)| !scene.is_effectively_locked(n.id))
        .filter_map(|(index, node)| {
            let target = first + step * index as f64;
            let shift = target - center_on(node.bounds());
            let delta = match axis {
                Axis::Horizontal => Vec2::new(shift, 0.0),
                Axis::Vertical => Vec2::new(0.0, shift),
            };
            (shift != 0.0)
                .then(|| (node.id, ElementPatch::default().position(node.position + delta)))
        })
        .collect();

    scene.update_elements(&patches)
}

/// Lay nodes out in a single row or column, `spacing` apart.
///
/// Nodes keep their order along the axis and start at the top-left corner of
/// their combined bounds; the other coordinate is aligned to that corner.
/// Locked nodes stay where they are and are left out of the sequence.
pub fn auto_layout(scene: &Scene, ids: &[ElementId], axis: Axis, spacing: f64) -> SceneResult<Scene> {
    let mut nodes = selected_nodes(scene, ids)?;
    nodes.retain(|n| !scene.is_effectively_locked(n.id));
    if nodes.len() < 2 {
        return Err(SceneError::InsufficientSelection {
            required: 2,
            actual: nodes.len(),
        });
    }

    let Some(bounds) = nodes.iter().map(|n| n.bounds()).reduce(|a, b| a.union(b)) else {
        return Ok(scene.clone());
    };
    let start_on = |bounds: Rect| match axis {
        Axis::Horizontal => bounds.x0,
        Axis::Vertical => bounds.y0,
    };
    nodes.sort_by(|a, b| start_on(a.bounds()).total_cmp(&start_on(b.bounds())));

    let mut cursor = bounds.origin();
    let mut patches: Vec<(ElementId, ElementPatch)> = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let b = node.bounds();
        let delta = cursor - b.origin();
        if delta != Vec2::ZERO {
            patches.push((node.id, ElementPatch::default().position(node.position + delta)));
        }
        match axis {
            Axis::Horizontal => cursor.x += b.width() + spacing,
            Axis::Vertical => cursor.y += b.height() + spacing,
        }
    }

    scene.update_elements(&patches)
}

/// Clone the selected nodes and every edge whose endpoints are both selected,
/// in paint order. This is what duplicate and copy operate on.
pub fn copy_set(scene: &Scene, ids: &[ElementId]) -> SceneResult<Vec<Element>> {
    let nodes = selected_nodes(scene, ids)?;
    if nodes.is_empty() {
        return Err(SceneError::InsufficientSelection {
            required: 1,
            actual: 0,
        });
    }

    let mut originals: Vec<&Element> = nodes.clone();
    originals.extend(scene.edges().filter(|edge| {
        edge.as_edge().is_some_and(|data| {
            nodes.iter().any(|n| n.id == data.source) && nodes.iter().any(|n| n.id == data.target)
        })
    }));
    originals.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
    Ok(originals.into_iter().cloned().collect())
}

/// Clone the selected nodes, plus every edge whose endpoints are both selected,
/// with fresh ids and an offset. Copies stack above everything else in their
/// original relative order. Returns the new scene and the new ids in paint order.
pub fn duplicate(
    scene: &Scene,
    ids: &[ElementId],
    offset: Vec2,
) -> SceneResult<(Scene, Vec<ElementId>)> {
    let originals = copy_set(scene, ids)?;
    Ok(paste(scene, &originals, offset))
}

/// Insert copies of `elements` with fresh ids, nodes moved by `offset`.
///
/// Edges are rewired to the copies of their endpoints; an edge whose endpoints
/// are not both among `elements` is dropped. Copies stack above everything
/// else in the given order.
pub fn paste(scene: &Scene, elements: &[Element], offset: Vec2) -> (Scene, Vec<ElementId>) {
    let mut remap: HashMap<ElementId, ElementId> = HashMap::new();
    let mut copies: Vec<Element> = Vec::with_capacity(elements.len());
    for original in elements {
        let mut copy = original.clone();
        let old = copy.id;
        remap.insert(old, copy.regenerate_id());
        if copy.is_node() {
            copy.translate(offset);
        }
        copies.push(copy);
    }

    let mut next = scene.clone();
    let mut z = scene.max_z().unwrap_or(0);
    let mut new_ids = Vec::with_capacity(copies.len());
    for mut copy in copies {
        if let ElementKind::Edge(edge) = &mut copy.kind {
            let (Some(source), Some(target)) = (remap.get(&edge.source), remap.get(&edge.target))
            else {
                continue;
            };
            edge.source = *source;
            edge.target = *target;
        }
        z += 1;
        copy.z_index = z;
        new_ids.push(copy.id);
        next.put_element(copy);
    }
    (next, new_ids)
}
