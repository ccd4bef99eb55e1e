//! Groups: named, ordered partitions of the element graph.
//!
//! A group only references its members by id. Elements stay flat in the scene
//! arena; a group may list another group as a member, which is how nesting works.

use crate::element::ElementId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for groups.
pub type GroupId = Uuid;

/// A group member is either an element or a nested group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum GroupMember {
    Element(ElementId),
    Group(GroupId),
}

impl GroupMember {
    /// The raw id, regardless of member kind.
    pub fn id(&self) -> Uuid {
        match self {
            GroupMember::Element(id) | GroupMember::Group(id) => *id,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A named, ordered set of members with flags that cascade to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    #[serde(default)]
    pub name: String,
    pub members: Vec<GroupMember>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Unknown fields from newer writers, written back on save.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Group {
    /// Create a new group from a list of members.
    pub fn new(name: impl Into<String>, members: Vec<GroupMember>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            members,
            visible: true,
            locked: false,
            metadata: Map::new(),
            extra: Map::new(),
        }
    }

    pub fn contains(&self, member: GroupMember) -> bool {
        self.members.contains(&member)
    }

    pub fn contains_element(&self, id: ElementId) -> bool {
        self.contains(GroupMember::Element(id))
    }

    /// Element ids listed directly in this group (nested groups excluded).
    pub fn element_ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.members.iter().filter_map(|member| match member {
            GroupMember::Element(id) => Some(*id),
            GroupMember::Group(_) => None,
        })
    }

    /// Remove a member, returning whether it was present.
    pub fn remove_member(&mut self, member: GroupMember) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != member);
        self.members.len() != before
    }
}

/// Partial update for a group's own fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

impl GroupPatch {
    pub(crate) fn apply_to(&self, group: &mut Group) {
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(visible) = self.visible {
            group.visible = visible;
        }
        if let Some(locked) = self.locked {
            group.locked = locked;
        }
    }
}
