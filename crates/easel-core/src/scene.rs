//! Scene model: the element and group arena.
//!
//! A [`Scene`] owns every element and group by value, keyed by id. Edges and
//! groups reference other records by id only, and referential integrity is
//! enforced at mutation time. Public mutations never modify `self`: they
//! validate, then return the next scene version, so a failed call leaves the
//! current version untouched and callers can diff old against new.

use crate::element::{EdgeData, Element, ElementId, ElementKind, ElementPatch};
use crate::group::{Group, GroupId, GroupMember, GroupPatch};
use crate::viewport::Viewport;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

/// Scene mutation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("Not found: {0}")]
    NotFound(Uuid),
    #[error("Invalid edge endpoint: {0} is not a node in this scene")]
    InvalidEndpoint(ElementId),
    #[error("Operation needs at least {required} elements, got {actual}")]
    InsufficientSelection { required: usize, actual: usize },
    #[error("Group {0} would contain itself")]
    CyclicGroup(GroupId),
    #[error("Element is locked: {0}")]
    Locked(ElementId),
    #[error("Duplicate id: {0}")]
    DuplicateId(Uuid),
    #[error("Invalid patch for {id}: {reason}")]
    InvalidPatch { id: ElementId, reason: String },
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;

/// Kind of diagram the scene holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramType {
    Flowchart,
    Mindmap,
    Organogram,
    Slides,
    #[default]
    Whiteboard,
}

/// Document metadata carried by the scene.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneMeta {
    pub title: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Last committed mutation, milliseconds since the Unix epoch.
    pub updated_at: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Unknown metadata fields, kept for forward compatibility.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The full in-memory document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    elements: HashMap<ElementId, Element>,
    groups: HashMap<GroupId, Group>,
    pub viewport: Viewport,
    pub kind: DiagramType,
    pub meta: SceneMeta,
    /// Unknown top-level document fields, written back on save.
    pub extra: Map<String, Value>,
    /// Unknown fields stored next to the viewport.
    pub viewport_extra: Map<String, Value>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(kind: DiagramType) -> Self {
        let now = crate::now_millis();
        Self {
            kind,
            meta: SceneMeta {
                created_at: now,
                updated_at: now,
                ..SceneMeta::default()
            },
            ..Self::default()
        }
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    /// Number of elements (nodes and edges).
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.groups.is_empty()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Element> {
        self.elements.values().filter(|e| e.is_node())
    }

    pub fn edges(&self) -> impl Iterator<Item = &Element> {
        self.elements.values().filter(|e| e.is_edge())
    }

    /// Elements in paint order (back to front).
    pub fn elements_ordered(&self) -> Vec<&Element> {
        let mut ordered: Vec<&Element> = self.elements.values().collect();
        ordered.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        ordered
    }

    /// Groups in a stable order (by id).
    pub fn groups_ordered(&self) -> Vec<&Group> {
        let mut ordered: Vec<&Group> = self.groups.values().collect();
        ordered.sort_by_key(|g| g.id);
        ordered
    }

    pub fn max_z(&self) -> Option<i64> {
        self.elements.values().map(|e| e.z_index).max()
    }

    pub fn min_z(&self) -> Option<i64> {
        self.elements.values().map(|e| e.z_index).min()
    }

    /// Z value for the next added element: `max + 1`, or 1 for an empty scene.
    pub fn next_z(&self) -> i64 {
        self.max_z().map_or(1, |z| z + 1)
    }

    // --- Element mutations ---

    /// Add an element on top of the current z-order.
    pub fn add_element(&self, mut element: Element) -> SceneResult<Scene> {
        if self.elements.contains_key(&element.id) {
            return Err(SceneError::DuplicateId(element.id));
        }
        if let ElementKind::Edge(edge) = &element.kind {
            self.check_endpoints(edge)?;
        }
        element.z_index = self.next_z();
        let mut next = self.clone();
        next.elements.insert(element.id, element);
        Ok(next)
    }

    /// Connect two nodes with a default edge. Returns the new scene and the edge id.
    pub fn add_edge(&self, source: ElementId, target: ElementId) -> SceneResult<(Scene, ElementId)> {
        let edge = Element::edge(source, target);
        let id = edge.id;
        Ok((self.add_element(edge)?, id))
    }

    /// Apply a partial patch to one element.
    pub fn update_element(&self, id: ElementId, patch: &ElementPatch) -> SceneResult<Scene> {
        let current = self.elements.get(&id).ok_or(SceneError::NotFound(id))?;
        if patch.touches_geometry() && self.is_effectively_locked(id) {
            return Err(SceneError::Locked(id));
        }
        match &current.kind {
            ElementKind::Edge(_) if patch.content.is_some() => {
                return Err(SceneError::InvalidPatch {
                    id,
                    reason: "edges have no node content".into(),
                });
            }
            ElementKind::Node(_) if patch.route.is_some() => {
                return Err(SceneError::InvalidPatch {
                    id,
                    reason: "nodes have no edge route".into(),
                });
            }
            _ => {}
        }

        let mut next = self.clone();
        if let Some(element) = next.elements.get_mut(&id) {
            patch.apply_to(element);
        }
        Ok(next)
    }

    /// Apply several patches atomically. Fails without changes if any patch fails.
    pub fn update_elements(&self, patches: &[(ElementId, ElementPatch)]) -> SceneResult<Scene> {
        let mut next = self.clone();
        for (id, patch) in patches {
            next = next.update_element(*id, patch)?;
        }
        Ok(next)
    }

    /// Delete one element, pruning edges and group memberships that referenced it.
    pub fn remove_element(&self, id: ElementId) -> SceneResult<Scene> {
        self.remove_elements(&[id])
    }

    /// Delete several elements at once.
    pub fn remove_elements(&self, ids: &[ElementId]) -> SceneResult<Scene> {
        if let Some(missing) = ids.iter().find(|id| !self.elements.contains_key(id)) {
            return Err(SceneError::NotFound(*missing));
        }
        let mut next = self.clone();
        for id in ids {
            next.elements.remove(id);
        }
        let pruned = next.prune_dangling();
        if pruned > 0 {
            log::debug!("Pruned {} dangling references after delete", pruned);
        }
        Ok(next)
    }

    /// Move elements above everything else, keeping their relative order.
    pub fn bring_to_front(&self, ids: &[ElementId]) -> SceneResult<Scene> {
        let moving = self.ordered_subset(ids)?;
        let ordered = self.elements_ordered();
        let top = &ordered[ordered.len().saturating_sub(moving.len())..];
        if top.iter().map(|e| e.id).eq(moving.iter().copied()) {
            return Ok(self.clone());
        }

        let mut z = self.max_z().unwrap_or(0);
        let mut next = self.clone();
        for id in moving {
            z += 1;
            if let Some(element) = next.elements.get_mut(&id) {
                element.z_index = z;
            }
        }
        Ok(next)
    }

    /// Move elements below everything else, keeping their relative order.
    pub fn send_to_back(&self, ids: &[ElementId]) -> SceneResult<Scene> {
        let moving = self.ordered_subset(ids)?;
        let ordered = self.elements_ordered();
        if ordered.iter().take(moving.len()).map(|e| e.id).eq(moving.iter().copied()) {
            return Ok(self.clone());
        }

        let base = self.min_z().unwrap_or(0) - moving.len() as i64;
        let mut next = self.clone();
        for (offset, id) in moving.into_iter().enumerate() {
            if let Some(element) = next.elements.get_mut(&id) {
                element.z_index = base + offset as i64;
            }
        }
        Ok(next)
    }

    /// Existing ids from `ids`, deduplicated and sorted back to front.
    fn ordered_subset(&self, ids: &[ElementId]) -> SceneResult<Vec<ElementId>> {
        let mut seen = HashSet::new();
        let mut subset = Vec::new();
        for id in ids {
            let element = self.elements.get(id).ok_or(SceneError::NotFound(*id))?;
            if seen.insert(*id) {
                subset.push((element.z_index, *id));
            }
        }
        subset.sort();
        Ok(subset.into_iter().map(|(_, id)| id).collect())
    }

    fn check_endpoints(&self, edge: &EdgeData) -> SceneResult<()> {
        for endpoint in [edge.source, edge.target] {
            match self.elements.get(&endpoint) {
                Some(element) if element.is_node() => {}
                _ => return Err(SceneError::InvalidEndpoint(endpoint)),
            }
        }
        Ok(())
    }

    // --- Groups ---

    /// Create a group from at least two members. Members leave any group they were in.
    pub fn create_group(
        &self,
        name: impl Into<String>,
        members: &[GroupMember],
    ) -> SceneResult<(Scene, GroupId)> {
        let mut unique: Vec<GroupMember> = Vec::with_capacity(members.len());
        for member in members {
            if !unique.contains(member) {
                unique.push(*member);
            }
        }
        if unique.len() < 2 {
            return Err(SceneError::InsufficientSelection {
                required: 2,
                actual: unique.len(),
            });
        }
        for member in &unique {
            self.check_member(*member)?;
        }

        let group = Group::new(name, unique.clone());
        let id = group.id;
        let mut next = self.clone();
        for member in &unique {
            next.detach(*member);
        }
        next.groups.insert(id, group);
        Ok((next, id))
    }

    /// Convenience wrapper grouping plain elements.
    pub fn group_elements(&self, ids: &[ElementId]) -> SceneResult<(Scene, GroupId)> {
        let members: Vec<GroupMember> = ids.iter().copied().map(GroupMember::Element).collect();
        self.create_group(format!("Group {}", self.groups.len() + 1), &members)
    }

    /// Dissolve a group. Its members take its place in the parent group, if any.
    pub fn ungroup(&self, id: GroupId) -> SceneResult<Scene> {
        let group = self.groups.get(&id).ok_or(SceneError::NotFound(id))?;
        let members = group.members.clone();
        let parent = self.parent_of(GroupMember::Group(id));

        let mut next = self.clone();
        next.groups.remove(&id);
        if let Some(parent) = parent.and_then(|p| next.groups.get_mut(&p)) {
            if let Some(at) = parent
                .members
                .iter()
                .position(|m| *m == GroupMember::Group(id))
            {
                parent.members.splice(at..=at, members);
            }
        }
        Ok(next)
    }

    /// Add a member to an existing group.
    ///
    /// Fails with `CyclicGroup` when the member is the group itself or one of its ancestors.
    pub fn add_group_member(&self, id: GroupId, member: GroupMember) -> SceneResult<Scene> {
        if !self.groups.contains_key(&id) {
            return Err(SceneError::NotFound(id));
        }
        self.check_member(member)?;
        if let GroupMember::Group(candidate) = member {
            if candidate == id || self.group_contains(candidate, GroupMember::Group(id)) {
                return Err(SceneError::CyclicGroup(candidate));
            }
        }

        let mut next = self.clone();
        if self.groups.get(&id).is_some_and(|g| g.contains(member)) {
            return Ok(next);
        }
        next.detach(member);
        if let Some(group) = next.groups.get_mut(&id) {
            group.members.push(member);
        }
        Ok(next)
    }

    /// Change a group's name or flags.
    pub fn update_group(&self, id: GroupId, patch: &GroupPatch) -> SceneResult<Scene> {
        if !self.groups.contains_key(&id) {
            return Err(SceneError::NotFound(id));
        }
        let mut next = self.clone();
        if let Some(group) = next.groups.get_mut(&id) {
            patch.apply_to(group);
        }
        Ok(next)
    }

    /// Delete a group together with every element and nested group it contains.
    pub fn remove_group(&self, id: GroupId) -> SceneResult<Scene> {
        if !self.groups.contains_key(&id) {
            return Err(SceneError::NotFound(id));
        }
        let (elements, groups) = self.group_descendants(id);
        let mut next = self.clone();
        for group in groups {
            next.groups.remove(&group);
        }
        for element in elements {
            next.elements.remove(&element);
        }
        next.prune_dangling();
        Ok(next)
    }

    fn check_member(&self, member: GroupMember) -> SceneResult<()> {
        let exists = match member {
            GroupMember::Element(id) => self.elements.contains_key(&id),
            GroupMember::Group(id) => self.groups.contains_key(&id),
        };
        if exists {
            Ok(())
        } else {
            Err(SceneError::NotFound(member.id()))
        }
    }

    fn detach(&mut self, member: GroupMember) {
        for group in self.groups.values_mut() {
            group.remove_member(member);
        }
    }

    /// The group that directly lists `member`, if any.
    pub fn parent_of(&self, member: GroupMember) -> Option<GroupId> {
        self.groups
            .values()
            .filter(|g| g.contains(member))
            .map(|g| g.id)
            .min()
    }

    /// Enclosing groups from the innermost outwards.
    pub fn ancestors(&self, member: GroupMember) -> Vec<GroupId> {
        let mut chain = Vec::new();
        let mut current = member;
        while let Some(parent) = self.parent_of(current) {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = GroupMember::Group(parent);
        }
        chain
    }

    /// Whether `target` is inside `group`, directly or through nested groups.
    pub fn group_contains(&self, group: GroupId, target: GroupMember) -> bool {
        let mut stack = vec![group];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(g) = self.groups.get(&current) else {
                continue;
            };
            for member in &g.members {
                if *member == target {
                    return true;
                }
                if let GroupMember::Group(nested) = member {
                    stack.push(*nested);
                }
            }
        }
        false
    }

    /// All element and group ids inside a group, including the group itself.
    pub fn group_descendants(&self, id: GroupId) -> (Vec<ElementId>, Vec<GroupId>) {
        let mut elements = Vec::new();
        let mut groups = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if groups.contains(&current) {
                continue;
            }
            groups.push(current);
            if let Some(group) = self.groups.get(&current) {
                for member in &group.members {
                    match member {
                        GroupMember::Element(e) => elements.push(*e),
                        GroupMember::Group(g) => stack.push(*g),
                    }
                }
            }
        }
        (elements, groups)
    }

    /// Visible itself and through every enclosing group.
    pub fn is_effectively_visible(&self, id: ElementId) -> bool {
        let Some(element) = self.elements.get(&id) else {
            return false;
        };
        element.visible
            && self
                .ancestors(GroupMember::Element(id))
                .iter()
                .all(|g| self.groups.get(g).is_none_or(|g| g.visible))
    }

    /// Locked itself or through any enclosing group.
    pub fn is_effectively_locked(&self, id: ElementId) -> bool {
        let Some(element) = self.elements.get(&id) else {
            return false;
        };
        element.locked
            || self
                .ancestors(GroupMember::Element(id))
                .iter()
                .any(|g| self.groups.get(g).is_some_and(|g| g.locked))
    }

    // --- Geometry queries ---

    /// Anchor point on a node for an edge handle.
    pub fn anchor_point(node: &Element, handle: Option<&str>) -> Point {
        let frame = node.frame();
        let local = match handle {
            Some("top") => Point::new(frame.center().x, frame.y0),
            Some("right") => Point::new(frame.x1, frame.center().y),
            Some("bottom") => Point::new(frame.center().x, frame.y1),
            Some("left") => Point::new(frame.x0, frame.center().y),
            _ => frame.center(),
        };
        node.rotation_transform() * local
    }

    /// Resolved start and end points of an edge.
    pub fn edge_endpoints(&self, id: ElementId) -> Option<(Point, Point)> {
        let edge = self.elements.get(&id)?.as_edge()?;
        let source = self.elements.get(&edge.source)?;
        let target = self.elements.get(&edge.target)?;
        Some((
            Self::anchor_point(source, edge.source_handle.as_deref()),
            Self::anchor_point(target, edge.target_handle.as_deref()),
        ))
    }

    /// Bounding box of one element; edges use their endpoints.
    pub fn element_bounds(&self, id: ElementId) -> Option<Rect> {
        let element = self.elements.get(&id)?;
        match element.kind {
            ElementKind::Node(_) => Some(element.bounds()),
            ElementKind::Edge(_) => self
                .edge_endpoints(id)
                .map(|(a, b)| Rect::from_points(a, b)),
        }
    }

    /// Union of the bounds of the given elements.
    pub fn bounds_of(&self, ids: &[ElementId]) -> Option<Rect> {
        ids.iter()
            .filter_map(|id| self.element_bounds(*id))
            .reduce(|acc, r| acc.union(r))
    }

    /// Bounds of all visible content.
    pub fn content_bounds(&self) -> Option<Rect> {
        let visible: Vec<ElementId> = self
            .elements
            .keys()
            .copied()
            .filter(|id| self.is_effectively_visible(*id))
            .collect();
        self.bounds_of(&visible)
    }

    /// Elements under a canvas point, front to back.
    ///
    /// Invisible and locked elements are skipped.
    pub fn elements_at_point(&self, point: Point, tolerance: f64) -> Vec<ElementId> {
        let mut hits: Vec<&Element> = self
            .elements
            .values()
            .filter(|e| self.is_effectively_visible(e.id) && !self.is_effectively_locked(e.id))
            .filter(|e| self.hit(e, point, tolerance))
            .collect();
        hits.sort_by(|a, b| b.z_index.cmp(&a.z_index).then_with(|| b.id.cmp(&a.id)));
        hits.into_iter().map(|e| e.id).collect()
    }

    fn hit(&self, element: &Element, point: Point, tolerance: f64) -> bool {
        match element.kind {
            ElementKind::Node(_) => element.hit_test(point, tolerance),
            ElementKind::Edge(_) => self.edge_endpoints(element.id).is_some_and(|(a, b)| {
                distance_to_segment(point, a, b) <= tolerance + element.style.stroke_width / 2.0
            }),
        }
    }

    /// Visible elements fully inside a canvas rectangle (marquee selection).
    pub fn elements_in_rect(&self, rect: Rect) -> Vec<ElementId> {
        let mut inside: Vec<&Element> = self
            .elements
            .values()
            .filter(|e| self.is_effectively_visible(e.id))
            .filter(|e| {
                self.element_bounds(e.id)
                    .is_some_and(|b| rect_contains_rect(rect, b))
            })
            .collect();
        inside.sort_by_key(|e| e.z_index);
        inside.into_iter().map(|e| e.id).collect()
    }

    // --- Raw access for diff replay, remote ingestion and loading ---

    /// Insert or replace an element without validation.
    pub(crate) fn put_element(&mut self, element: Element) {
        self.elements.insert(element.id, element);
    }

    pub(crate) fn take_element(&mut self, id: ElementId) -> Option<Element> {
        self.elements.remove(&id)
    }

    pub(crate) fn put_group(&mut self, group: Group) {
        self.groups.insert(group.id, group);
    }

    pub(crate) fn take_group(&mut self, id: GroupId) -> Option<Group> {
        self.groups.remove(&id)
    }

    /// Whether an edge's endpoints currently resolve to nodes.
    pub(crate) fn endpoints_present(&self, edge: &EdgeData) -> bool {
        self.check_endpoints(edge).is_ok()
    }

    /// If other elements share `id`'s z value, the lowest id keeps it and the
    /// rest move above the current maximum in id order. The choice depends only
    /// on ids, so every replica moves the same elements. Returns the moved ids.
    pub(crate) fn resolve_z_collision(&mut self, id: ElementId) -> Vec<ElementId> {
        let Some(z) = self.elements.get(&id).map(|e| e.z_index) else {
            return Vec::new();
        };
        let mut sharing: Vec<ElementId> = self
            .elements
            .values()
            .filter(|e| e.z_index == z)
            .map(|e| e.id)
            .collect();
        if sharing.len() < 2 {
            return Vec::new();
        }
        sharing.sort();
        let moved = sharing.split_off(1);
        for moved_id in &moved {
            let top = self.next_z();
            if let Some(element) = self.elements.get_mut(moved_id) {
                element.z_index = top;
            }
        }
        moved
    }

    /// Drop edges whose endpoints are gone and group members that no longer exist.
    /// Returns the number of removed references.
    pub(crate) fn prune_dangling(&mut self) -> usize {
        let dangling: Vec<ElementId> = self
            .elements
            .values()
            .filter_map(|e| e.as_edge().map(|edge| (e.id, edge)))
            .filter(|(_, edge)| !self.endpoints_present(edge))
            .map(|(id, _)| id)
            .collect();
        let mut removed = dangling.len();
        for id in dangling {
            self.elements.remove(&id);
        }

        let element_ids: HashSet<ElementId> = self.elements.keys().copied().collect();
        let group_ids: HashSet<GroupId> = self.groups.keys().copied().collect();
        for group in self.groups.values_mut() {
            let before = group.members.len();
            group.members.retain(|member| match member {
                GroupMember::Element(id) => element_ids.contains(id),
                GroupMember::Group(id) => group_ids.contains(id),
            });
            removed += before - group.members.len();
        }
        removed
    }

    /// Check every referential invariant: edge endpoints are nodes, group members
    /// exist, z values are unique and no group contains itself.
    pub fn is_consistent(&self) -> bool {
        let edges_ok = self
            .elements
            .values()
            .filter_map(Element::as_edge)
            .all(|edge| self.endpoints_present(edge));
        let members_ok = self.groups.values().all(|g| {
            g.members.iter().all(|member| match member {
                GroupMember::Element(id) => self.elements.contains_key(id),
                GroupMember::Group(id) => self.groups.contains_key(id),
            })
        });
        let mut zs = HashSet::new();
        let z_ok = self.elements.values().all(|e| zs.insert(e.z_index));
        let acyclic = self
            .groups
            .keys()
            .all(|id| !self.group_contains(*id, GroupMember::Group(*id)));
        edges_ok && members_ok && z_ok && acyclic
    }
}

fn distance_to_segment(point: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.hypot2();
    if len_sq == 0.0 {
        return point.distance(a);
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}

fn rect_contains_rect(outer: Rect, inner: Rect) -> bool {
    inner.x0 >= outer.x0 && inner.y0 >= outer.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::NodeContent;
    use kurbo::Size;

    fn node_at(x: f64, y: f64) -> Element {
        Element::node(NodeContent::default(), Point::new(x, y), Size::new(50.0, 50.0))
    }

    fn scene_with(nodes: Vec<Element>) -> (Scene, Vec<ElementId>) {
        let mut scene = Scene::new(DiagramType::Flowchart);
        let mut ids = Vec::new();
        for node in nodes {
            ids.push(node.id);
            scene = scene.add_element(node).unwrap();
        }
        (scene, ids)
    }

    #[test]
    fn test_add_assigns_increasing_z() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(10.0, 0.0)]);
        assert_eq!(scene.element(ids[0]).unwrap().z_index, 1);
        assert_eq!(scene.element(ids[1]).unwrap().z_index, 2);
        assert_eq!(scene.next_z(), 3);
    }

    #[test]
    fn test_add_duplicate_id_fails() {
        let node = node_at(0.0, 0.0);
        let (scene, _) = scene_with(vec![node.clone()]);
        assert_eq!(scene.add_element(node.clone()), Err(SceneError::DuplicateId(node.id)));
    }

    #[test]
    fn test_mutation_leaves_previous_version_untouched() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0)]);
        let moved = scene
            .update_element(ids[0], &ElementPatch::default().position(Point::new(5.0, 5.0)))
            .unwrap();
        assert_eq!(scene.element(ids[0]).unwrap().position, Point::ZERO);
        assert_eq!(moved.element(ids[0]).unwrap().position, Point::new(5.0, 5.0));
    }

    #[test]
    fn test_add_edge_requires_nodes() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(100.0, 0.0)]);
        let missing = Uuid::new_v4();
        assert_eq!(
            scene.add_edge(ids[0], missing).unwrap_err(),
            SceneError::InvalidEndpoint(missing)
        );

        let (scene, edge) = scene.add_edge(ids[0], ids[1]).unwrap();
        // An edge cannot be an endpoint.
        assert_eq!(
            scene.add_edge(edge, ids[1]).unwrap_err(),
            SceneError::InvalidEndpoint(edge)
        );
    }

    #[test]
    fn test_remove_node_prunes_edges() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(100.0, 0.0)]);
        let (scene, edge) = scene.add_edge(ids[0], ids[1]).unwrap();
        let scene = scene.remove_element(ids[0]).unwrap();
        assert!(scene.element(edge).is_none());
        assert!(scene.contains(ids[1]));
        assert!(scene.is_consistent());
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let (scene, _) = scene_with(vec![node_at(0.0, 0.0)]);
        let missing = Uuid::new_v4();
        assert_eq!(scene.remove_element(missing), Err(SceneError::NotFound(missing)));
    }

    #[test]
    fn test_locked_rejects_geometry_but_allows_flags() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0)]);
        let scene = scene
            .update_element(ids[0], &ElementPatch::default().locked(true))
            .unwrap();
        assert_eq!(
            scene.update_element(ids[0], &ElementPatch::default().size(Size::new(1.0, 1.0))),
            Err(SceneError::Locked(ids[0]))
        );
        assert!(scene
            .update_element(ids[0], &ElementPatch::default().label("ok"))
            .is_ok());
        assert!(scene
            .update_element(ids[0], &ElementPatch::default().locked(false))
            .is_ok());
    }

    #[test]
    fn test_patch_kind_mismatch() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(100.0, 0.0)]);
        let (scene, edge) = scene.add_edge(ids[0], ids[1]).unwrap();
        let patch = ElementPatch::default().content(NodeContent::Text { body: "x".into() });
        assert!(matches!(
            scene.update_element(edge, &patch),
            Err(SceneError::InvalidPatch { .. })
        ));
    }

    #[test]
    fn test_group_requires_two_members() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0)]);
        assert_eq!(
            scene.group_elements(&[ids[0], ids[0]]).unwrap_err(),
            SceneError::InsufficientSelection {
                required: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_group_lock_cascades() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(100.0, 0.0)]);
        let (scene, group) = scene.group_elements(&ids).unwrap();
        let scene = scene
            .update_group(
                group,
                &GroupPatch {
                    locked: Some(true),
                    visible: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(scene.is_effectively_locked(ids[0]));
        assert!(!scene.is_effectively_visible(ids[1]));
        assert!(scene
            .update_element(ids[0], &ElementPatch::default().position(Point::ZERO))
            .is_err());
    }

    #[test]
    fn test_nested_group_cycle_rejected() {
        let (scene, ids) = scene_with(vec![
            node_at(0.0, 0.0),
            node_at(100.0, 0.0),
            node_at(200.0, 0.0),
        ]);
        let (scene, inner) = scene.group_elements(&ids[..2]).unwrap();
        let (scene, outer) = scene
            .create_group(
                "outer",
                &[GroupMember::Group(inner), GroupMember::Element(ids[2])],
            )
            .unwrap();
        assert_eq!(scene.ancestors(GroupMember::Element(ids[0])), vec![inner, outer]);

        assert_eq!(
            scene.add_group_member(inner, GroupMember::Group(outer)),
            Err(SceneError::CyclicGroup(outer))
        );
        assert_eq!(
            scene.add_group_member(inner, GroupMember::Group(inner)),
            Err(SceneError::CyclicGroup(inner))
        );
        assert!(scene.is_consistent());
    }

    #[test]
    fn test_ungroup_splices_into_parent() {
        let (scene, ids) = scene_with(vec![
            node_at(0.0, 0.0),
            node_at(100.0, 0.0),
            node_at(200.0, 0.0),
        ]);
        let (scene, inner) = scene.group_elements(&ids[..2]).unwrap();
        let (scene, outer) = scene
            .create_group(
                "outer",
                &[GroupMember::Group(inner), GroupMember::Element(ids[2])],
            )
            .unwrap();
        let scene = scene.ungroup(inner).unwrap();
        assert!(scene.group(inner).is_none());
        assert_eq!(
            scene.group(outer).unwrap().members,
            vec![
                GroupMember::Element(ids[0]),
                GroupMember::Element(ids[1]),
                GroupMember::Element(ids[2]),
            ]
        );
    }

    #[test]
    fn test_remove_group_deletes_contents() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(100.0, 0.0), node_at(200.0, 0.0)]);
        let (scene, edge) = scene.add_edge(ids[1], ids[2]).unwrap();
        let (scene, group) = scene.group_elements(&ids[..2]).unwrap();
        let scene = scene.remove_group(group).unwrap();
        assert!(!scene.contains(ids[0]));
        assert!(!scene.contains(ids[1]));
        assert!(!scene.contains(edge));
        assert!(scene.contains(ids[2]));
    }

    #[test]
    fn test_reorder_keeps_z_unique() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(0.0, 0.0), node_at(0.0, 0.0)]);
        let front = scene.bring_to_front(&[ids[0]]).unwrap();
        assert_eq!(front.elements_ordered().last().unwrap().id, ids[0]);
        let back = front.send_to_back(&[ids[2]]).unwrap();
        assert_eq!(back.elements_ordered()[0].id, ids[2]);
        assert!(back.is_consistent());

        // Already in front: nothing changes.
        assert_eq!(front.bring_to_front(&[ids[0]]).unwrap(), front);
    }

    #[test]
    fn test_hit_testing_front_to_back() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(25.0, 25.0)]);
        let hits = scene.elements_at_point(Point::new(30.0, 30.0), 0.0);
        assert_eq!(hits, vec![ids[1], ids[0]]);

        let locked = scene
            .update_element(ids[1], &ElementPatch::default().locked(true))
            .unwrap();
        assert_eq!(locked.elements_at_point(Point::new(30.0, 30.0), 0.0), vec![ids[0]]);
    }

    #[test]
    fn test_edge_hit_and_endpoints() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(200.0, 0.0)]);
        let (scene, edge) = scene.add_edge(ids[0], ids[1]).unwrap();
        let (a, b) = scene.edge_endpoints(edge).unwrap();
        assert_eq!(a, Point::new(25.0, 25.0));
        assert_eq!(b, Point::new(225.0, 25.0));
        assert_eq!(scene.elements_at_point(Point::new(120.0, 26.0), 1.0), vec![edge]);
    }

    #[test]
    fn test_marquee_selection() {
        let (scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(100.0, 0.0)]);
        let inside = scene.elements_in_rect(Rect::new(-10.0, -10.0, 60.0, 60.0));
        assert_eq!(inside, vec![ids[0]]);
    }

    #[test]
    fn test_resolve_z_collision() {
        let (mut scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(0.0, 0.0)]);
        let mut clash = scene.element(ids[1]).unwrap().clone();
        clash.z_index = 1;
        scene.put_element(clash);
        let higher = ids[0].max(ids[1]);
        let lower = ids[0].min(ids[1]);

        assert_eq!(scene.resolve_z_collision(ids[1]), vec![higher]);
        assert_eq!(scene.element(lower).unwrap().z_index, 1);
        assert_eq!(scene.element(higher).unwrap().z_index, 2);
        assert!(scene.is_consistent());
        assert!(scene.resolve_z_collision(ids[1]).is_empty());
    }

    #[test]
    fn test_resolve_z_collision_ignores_which_id_is_passed() {
        let (mut scene, ids) = scene_with(vec![node_at(0.0, 0.0), node_at(0.0, 0.0)]);
        let mut clash = scene.element(ids[1]).unwrap().clone();
        clash.z_index = 1;
        scene.put_element(clash);
        let mut other = scene.clone();

        let moved = scene.resolve_z_collision(ids[0]);
        let moved_other = other.resolve_z_collision(ids[1]);
        assert_eq!(moved, moved_other);
        assert_eq!(scene, other);
    }
}
