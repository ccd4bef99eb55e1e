//! Versioned document format for lossless save/load.
//!
//! The document is the only save format. It keeps every element, edge and
//! group field, the viewport and metadata, and carries unknown top-level and
//! metadata fields through a load/save cycle untouched.

use crate::element::{Element, ElementId};
use crate::group::{Group, GroupMember};
use crate::scene::{DiagramType, Scene, SceneMeta};
use crate::viewport::Viewport;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

/// Current document format version.
pub const FORMAT_VERSION: u64 = 2;

/// Document errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported document version {found} (newest supported is {supported})", supported = FORMAT_VERSION)]
    UnsupportedVersion { found: u64 },
    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Serialized form of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u64,
    #[serde(rename = "type", default)]
    pub kind: DiagramType,
    /// Nodes in paint order.
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Edges in paint order.
    #[serde(default)]
    pub edges: Vec<Element>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub viewport: StoredViewport,
    #[serde(default)]
    pub metadata: SceneMeta,
    /// Unknown top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The viewport as stored, with fields this version does not know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredViewport {
    #[serde(flatten)]
    pub view: Viewport,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Problems repaired while turning a document into a scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub warnings: Vec<String>,
}

impl LoadReport {
    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl Document {
    /// Snapshot a scene.
    pub fn from_scene(scene: &Scene) -> Self {
        let ordered = scene.elements_ordered();
        Self {
            version: FORMAT_VERSION,
            kind: scene.kind,
            elements: ordered.iter().filter(|e| e.is_node()).map(|e| (*e).clone()).collect(),
            edges: ordered.iter().filter(|e| e.is_edge()).map(|e| (*e).clone()).collect(),
            groups: scene.groups_ordered().into_iter().cloned().collect(),
            viewport: StoredViewport {
                view: scene.viewport,
                extra: scene.viewport_extra.clone(),
            },
            metadata: scene.meta.clone(),
            extra: scene.extra.clone(),
        }
    }

    /// Build a scene, repairing what can be repaired.
    ///
    /// Duplicate ids keep their first occurrence. If z values are not unique
    /// they are renumbered by (z, document order). Edges with missing
    /// endpoints, missing group members and cyclic group links are dropped.
    pub fn into_scene(self) -> (Scene, LoadReport) {
        let mut report = LoadReport::default();
        let mut scene = Scene::default();
        scene.kind = self.kind;
        scene.viewport = self.viewport.view;
        scene.viewport_extra = self.viewport.extra;
        scene.meta = self.metadata;
        scene.extra = self.extra;

        let mut seen: HashSet<ElementId> = HashSet::new();
        let mut elements: Vec<Element> = Vec::with_capacity(self.elements.len() + self.edges.len());
        for element in self.elements.into_iter().chain(self.edges) {
            if seen.insert(element.id) {
                elements.push(element);
            } else {
                report.warn(format!("Dropped duplicate element id {}", element.id));
            }
        }

        let mut zs = HashSet::new();
        if !elements.iter().all(|e| zs.insert(e.z_index)) {
            report.warn("Renumbered non-unique z-order values".to_string());
            let mut order: Vec<usize> = (0..elements.len()).collect();
            order.sort_by_key(|&i| elements[i].z_index);
            for (rank, index) in order.into_iter().enumerate() {
                elements[index].z_index = rank as i64 + 1;
            }
        }

        for mut element in elements {
            element.set_rotation(element.rotation);
            scene.put_element(element);
        }
        for group in self.groups {
            if scene.group(group.id).is_some() {
                report.warn(format!("Dropped duplicate group id {}", group.id));
                continue;
            }
            scene.put_group(group);
        }

        let edges_before = scene.edges().count();
        let members_before: usize = scene.groups().map(|g| g.members.len()).sum();
        scene.prune_dangling();
        let dropped_edges = edges_before - scene.edges().count();
        if dropped_edges > 0 {
            report.warn(format!("Dropped {dropped_edges} edges with missing endpoints"));
        }
        let members_after: usize = scene.groups().map(|g| g.members.len()).sum();
        if members_after < members_before {
            report.warn(format!(
                "Dropped {} group members that do not exist",
                members_before - members_after
            ));
        }

        let group_ids: Vec<_> = scene.groups_ordered().iter().map(|g| g.id).collect();
        for id in group_ids {
            let cyclic: Vec<GroupMember> = scene
                .group(id)
                .map(|g| {
                    g.members
                        .iter()
                        .filter(|m| match m {
                            GroupMember::Group(nested) => {
                                *nested == id || scene.group_contains(*nested, GroupMember::Group(id))
                            }
                            GroupMember::Element(_) => false,
                        })
                        .copied()
                        .collect()
                })
                .unwrap_or_default();
            if cyclic.is_empty() {
                continue;
            }
            if let Some(mut group) = scene.take_group(id) {
                for member in cyclic {
                    group.remove_member(member);
                    report.warn(format!("Dropped cyclic group link {} -> {}", id, member.id()));
                }
                scene.put_group(group);
            }
        }

        (scene, report)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> DocumentResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON, migrating older versions.
    pub fn from_json(json: &str) -> DocumentResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse an already-decoded JSON value, migrating older versions.
    pub fn from_value(value: Value) -> DocumentResult<Self> {
        let Value::Object(mut object) = value else {
            return Err(DocumentError::Malformed("expected a JSON object".into()));
        };
        let version = match object.get("version") {
            None => 1,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| DocumentError::Malformed("version must be a positive integer".into()))?,
        };
        if version > FORMAT_VERSION {
            return Err(DocumentError::UnsupportedVersion { found: version });
        }
        if version < 2 {
            migrate_v1(&mut object);
        }
        Ok(serde_json::from_value(Value::Object(object))?)
    }
}

/// Version 1 stored nodes under `nodes`, had no groups, and kept the title and
/// timestamps at the top level.
fn migrate_v1(object: &mut Map<String, Value>) {
    log::info!("Migrating version 1 document");
    if let Some(nodes) = object.remove("nodes") {
        object.insert("elements".into(), nodes);
    }
    object.entry("groups").or_insert_with(|| Value::Array(Vec::new()));

    let mut metadata = match object.remove("metadata") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (old, new) in [("title", "title"), ("createdAt", "created_at"), ("updatedAt", "updated_at")] {
        if let Some(value) = object.remove(old) {
            metadata.entry(new).or_insert(value);
        }
    }
    object.insert("metadata".into(), Value::Object(metadata));
    object.insert("version".into(), Value::from(FORMAT_VERSION));
}

/// Serialize a scene to document JSON.
pub fn save_scene(scene: &Scene) -> DocumentResult<String> {
    Document::from_scene(scene).to_json()
}

/// Parse document JSON into a scene.
pub fn load_scene(json: &str) -> DocumentResult<(Scene, LoadReport)> {
    Ok(Document::from_json(json)?.into_scene())
}
