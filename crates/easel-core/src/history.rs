//! Undo/redo action log.
//!
//! The [`HistoryManager`] is a bounded list of [`HistoryEntry`] values plus a
//! cursor. It never coalesces entries: deciding what counts as one action
//! (a whole drag gesture, a batch align) is the session's job.

use crate::element::{Element, ElementId};
use crate::group::{Group, GroupId};
use crate::scene::Scene;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Default maximum number of history entries.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// What kind of user action an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Move,
    Connect,
    Style,
    Group,
    Ungroup,
    Reorder,
    Batch,
}

/// Before/after state of one element. `None` means absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementChange {
    pub id: ElementId,
    pub before: Option<Element>,
    pub after: Option<Element>,
}

/// Before/after state of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupChange {
    pub id: GroupId,
    pub before: Option<Group>,
    pub after: Option<Group>,
}

/// The records that differ between two scene versions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDiff {
    pub elements: Vec<ElementChange>,
    pub groups: Vec<GroupChange>,
}

impl SceneDiff {
    /// Compute the per-record difference from `before` to `after`.
    pub fn between(before: &Scene, after: &Scene) -> Self {
        let element_ids: BTreeSet<ElementId> = before
            .elements()
            .chain(after.elements())
            .map(|e| e.id)
            .collect();
        let elements = element_ids
            .into_iter()
            .filter_map(|id| {
                let old = before.element(id);
                let new = after.element(id);
                (old != new).then(|| ElementChange {
                    id,
                    before: old.cloned(),
                    after: new.cloned(),
                })
            })
            .collect();

        let group_ids: BTreeSet<GroupId> = before
            .groups()
            .chain(after.groups())
            .map(|g| g.id)
            .collect();
        let groups = group_ids
            .into_iter()
            .filter_map(|id| {
                let old = before.group(id);
                let new = after.group(id);
                (old != new).then(|| GroupChange {
                    id,
                    before: old.cloned(),
                    after: new.cloned(),
                })
            })
            .collect();

        Self { elements, groups }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.groups.is_empty()
    }

    pub fn touched_elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.elements.iter().map(|c| c.id)
    }

    pub fn touched_groups(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.groups.iter().map(|c| c.id)
    }

    /// Replay the `after` states onto a scene (redo).
    pub fn apply_forward(&self, scene: &Scene) -> Scene {
        self.apply(scene, true)
    }

    /// Replay the `before` states onto a scene (undo).
    pub fn apply_reverse(&self, scene: &Scene) -> Scene {
        self.apply(scene, false)
    }

    fn apply(&self, scene: &Scene, forward: bool) -> Scene {
        let mut next = scene.clone();
        for change in &self.elements {
            let state = if forward { &change.after } else { &change.before };
            match state {
                Some(element) => next.put_element(element.clone()),
                None => {
                    next.take_element(change.id);
                }
            }
        }
        for change in &self.groups {
            let state = if forward { &change.after } else { &change.before };
            match state {
                Some(group) => next.put_group(group.clone()),
                None => {
                    next.take_group(change.id);
                }
            }
        }

        // Records outside the diff may have changed remotely since the entry was made.
        let pruned = next.prune_dangling();
        if pruned > 0 {
            log::warn!("History replay pruned {} references to records removed since", pruned);
        }
        for id in self.touched_elements() {
            next.resolve_z_collision(id);
        }
        next
    }
}

/// One invertible recorded mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub kind: ActionKind,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Human-readable description ("Move 3 elements").
    pub label: String,
    pub diff: SceneDiff,
}

impl HistoryEntry {
    pub fn new(kind: ActionKind, label: impl Into<String>, diff: SceneDiff) -> Self {
        Self {
            kind,
            timestamp: crate::now_millis(),
            label: label.into(),
            diff,
        }
    }
}

/// Bounded, cursor-based undo/redo log.
///
/// Invariant: `0 <= cursor <= len <= capacity`.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    capacity: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryManager {
    /// Create a history with the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            cursor: 0,
            capacity,
        }
    }

    /// Append an entry, discarding any redo tail and evicting the oldest entries over capacity.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.truncate(self.cursor);
        self.entries.push_back(entry);
        self.cursor += 1;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.cursor -= 1;
        }
    }

    /// Step back. Returns the entry to revert, or `None` at the start.
    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    /// Step forward. Returns the entry to reapply, or `None` at the end.
    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        if self.cursor >= self.entries.len() {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        self.entries.get(index)
    }

    pub fn peek_undo(&self) -> Option<&HistoryEntry> {
        self.cursor.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn peek_redo(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}
