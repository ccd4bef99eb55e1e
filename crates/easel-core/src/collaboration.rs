//! Collaboration state: presence, last-write-wins ingestion and outgoing events.
//!
//! Every element or group id carries the `(timestamp, origin)` stamp of the
//! last write applied to it, local or remote. An incoming write is applied
//! only if its stamp is greater. Removals keep their stamp as a tombstone so
//! a delayed update cannot bring back a record that was deleted later.

use crate::element::SerializableColor;
use crate::group::GroupMember;
use crate::history::SceneDiff;
use crate::scene::Scene;
use crate::sync::{
    CollabEvent, CursorPosition, Envelope, Inbox, ParticipantId, ParticipantInfo,
    RealtimeChannel, SyncConflict, SyncResult,
};
use kurbo::Point;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// A connected collaborator, as seen locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub color: SerializableColor,
    pub cursor: Option<Point>,
    pub selection: Vec<Uuid>,
    /// Timestamp of the last envelope from this participant.
    pub last_seen: u64,
}

/// Write order: timestamp first, origin id breaks ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Stamp {
    timestamp: u64,
    origin: ParticipantId,
}

/// What ingesting one envelope did.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    /// Scene records changed.
    Applied { touched: Vec<Uuid> },
    /// Presence-only update.
    Presence,
    /// Targets an element in an uncommitted local gesture; retried later.
    Held,
    /// Edge waiting for its endpoints.
    Buffered,
    /// Older than the write already applied.
    Stale,
    /// Our own envelope echoed back.
    Ignored,
}

/// Session-scoped collaboration service.
pub struct CollaborationManager {
    local: ParticipantId,
    info: ParticipantInfo,
    channel: Option<Arc<dyn RealtimeChannel>>,
    inbox: Inbox,
    /// Hybrid clock: last timestamp issued or observed.
    clock: u64,
    versions: HashMap<Uuid, Stamp>,
    tombstones: HashSet<Uuid>,
    participants: HashMap<ParticipantId, Participant>,
    pending_edges: HashMap<Uuid, Envelope>,
    held: Vec<Envelope>,
    conflicts: Vec<SyncConflict>,
    /// Envelopes produced while no channel is attached.
    outgoing: Vec<Envelope>,
}

impl CollaborationManager {
    pub fn new(name: impl Into<String>, color: SerializableColor) -> Self {
        Self {
            local: Uuid::new_v4(),
            info: ParticipantInfo {
                name: name.into(),
                color,
            },
            channel: None,
            inbox: Inbox::new(),
            clock: 0,
            versions: HashMap::new(),
            tombstones: HashSet::new(),
            participants: HashMap::new(),
            pending_edges: HashMap::new(),
            held: Vec::new(),
            conflicts: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    /// Attach a channel, route its deliveries into the inbox and announce ourselves.
    pub fn connect(&mut self, channel: Arc<dyn RealtimeChannel>) -> SyncResult<()> {
        channel.subscribe(self.inbox.handler())?;
        self.channel = Some(channel);
        log::info!("Participant {} connected", self.local);
        let info = self.info.clone();
        self.emit(CollabEvent::Joined { info })
    }

    /// Announce departure and detach the channel.
    pub fn disconnect(&mut self) -> SyncResult<()> {
        let result = self.emit(CollabEvent::Left);
        self.channel = None;
        self.participants.clear();
        result
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.local
    }

    pub fn info(&self) -> &ParticipantInfo {
        &self.info
    }

    /// The single ingestion point for remote envelopes.
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    /// Remote edges still waiting for endpoints.
    pub fn pending_edge_count(&self) -> usize {
        self.pending_edges.len()
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Drain conflicts recorded since the last call.
    pub fn take_conflicts(&mut self) -> Vec<SyncConflict> {
        std::mem::take(&mut self.conflicts)
    }

    /// Drain envelopes produced while no channel was attached.
    pub fn take_outgoing(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outgoing)
    }

    // --- Clock ---

    /// Next local timestamp: `max(now, last + 1)`.
    pub fn tick(&mut self) -> u64 {
        self.clock = crate::now_millis().max(self.clock + 1);
        self.clock
    }

    fn observe(&mut self, timestamp: u64) {
        self.clock = self.clock.max(timestamp);
    }

    // --- Outgoing ---

    fn emit(&mut self, event: CollabEvent) -> SyncResult<()> {
        let envelope = Envelope {
            origin: self.local,
            timestamp: self.tick(),
            event,
        };
        if let Some(target) = envelope.event.target() {
            self.versions.insert(
                target,
                Stamp {
                    timestamp: envelope.timestamp,
                    origin: self.local,
                },
            );
        }
        match &self.channel {
            Some(channel) => channel.publish(envelope),
            None => {
                self.outgoing.push(envelope);
                Ok(())
            }
        }
    }

    /// Broadcast every record a committed local mutation changed.
    ///
    /// Stamps are recorded even if publishing fails, so the local state keeps
    /// winning over older remote writes. Returns the first publish error.
    pub fn broadcast_diff(&mut self, diff: &SceneDiff) -> SyncResult<()> {
        let mut events = Vec::with_capacity(diff.elements.len() + diff.groups.len());
        for change in &diff.elements {
            events.push(match &change.after {
                Some(element) if element.is_edge() => CollabEvent::EdgeUpdated {
                    element: element.clone(),
                },
                Some(element) => CollabEvent::ElementUpdated {
                    element: element.clone(),
                },
                None => CollabEvent::ElementRemoved { id: change.id },
            });
        }
        for change in &diff.groups {
            events.push(match &change.after {
                Some(group) => CollabEvent::GroupUpdated {
                    group: group.clone(),
                },
                None => CollabEvent::GroupRemoved { id: change.id },
            });
        }

        let mut first_error = None;
        for event in events {
            if let CollabEvent::ElementRemoved { id } | CollabEvent::GroupRemoved { id } = &event {
                self.tombstones.insert(*id);
            }
            if let Err(e) = self.emit(event) {
                log::warn!("Failed to publish change: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn broadcast_selection(&mut self, ids: &[Uuid]) -> SyncResult<()> {
        self.emit(CollabEvent::SelectionChanged { ids: ids.to_vec() })
    }

    pub fn broadcast_cursor(&mut self, position: Option<Point>) -> SyncResult<()> {
        self.emit(CollabEvent::CursorMoved {
            position: position.map(|p| CursorPosition { x: p.x, y: p.y }),
        })
    }

    // --- Incoming ---

    /// Apply one remote envelope to `scene`.
    ///
    /// `in_flight` holds the ids of elements a local gesture is editing;
    /// writes to them are held until [`Self::release_held`].
    pub fn ingest(&mut self, scene: &mut Scene, envelope: Envelope, in_flight: &HashSet<Uuid>) -> Ingested {
        if envelope.origin == self.local {
            return Ingested::Ignored;
        }
        self.observe(envelope.timestamp);
        self.touch_participant(&envelope);

        if envelope.event.is_presence() {
            self.apply_presence(envelope);
            return Ingested::Presence;
        }
        let Some(target) = envelope.event.target() else {
            return Ingested::Ignored;
        };
        if in_flight.contains(&target) {
            log::debug!("Holding remote write to {} during gesture", target);
            self.held.push(envelope);
            return Ingested::Held;
        }

        let incoming = Stamp {
            timestamp: envelope.timestamp,
            origin: envelope.origin,
        };
        if let Some(current) = self.versions.get(&target).copied() {
            if incoming <= current {
                if incoming.origin != current.origin {
                    self.record_conflict(target, current, incoming);
                }
                return Ingested::Stale;
            }
        }

        if let CollabEvent::EdgeUpdated { element } | CollabEvent::ElementUpdated { element } = &envelope.event {
            if let Some(edge) = element.as_edge() {
                if !scene.endpoints_present(edge) {
                    log::debug!("Buffering remote edge {} until its endpoints arrive", target);
                    self.pending_edges.insert(target, envelope);
                    return Ingested::Buffered;
                }
            }
        }

        self.versions.insert(target, incoming);
        let mut touched = self.apply_record(scene, envelope.event);
        touched.extend(self.flush_pending_edges(scene));
        Ingested::Applied { touched }
    }

    /// Re-ingest envelopes held during a gesture that has ended.
    pub fn release_held(&mut self, scene: &mut Scene, in_flight: &HashSet<Uuid>) -> Vec<Ingested> {
        let held = std::mem::take(&mut self.held);
        held.into_iter()
            .map(|envelope| self.ingest(scene, envelope, in_flight))
            .collect()
    }

    fn record_conflict(&mut self, target: Uuid, kept: Stamp, discarded: Stamp) {
        log::info!(
            "Last-write-wins on {}: kept {}@{}, discarded {}@{}",
            target,
            kept.origin,
            kept.timestamp,
            discarded.origin,
            discarded.timestamp
        );
        self.conflicts.push(SyncConflict {
            target,
            kept_origin: kept.origin,
            kept_timestamp: kept.timestamp,
            discarded_origin: discarded.origin,
            discarded_timestamp: discarded.timestamp,
        });
    }

    fn touch_participant(&mut self, envelope: &Envelope) {
        let participant = self
            .participants
            .entry(envelope.origin)
            .or_insert_with(|| Participant {
                id: envelope.origin,
                name: String::new(),
                color: SerializableColor::black(),
                cursor: None,
                selection: Vec::new(),
                last_seen: 0,
            });
        participant.last_seen = participant.last_seen.max(envelope.timestamp);
    }

    fn apply_presence(&mut self, envelope: Envelope) {
        match envelope.event {
            CollabEvent::Left => {
                self.participants.remove(&envelope.origin);
                log::info!("Participant {} left", envelope.origin);
            }
            event => {
                let Some(participant) = self.participants.get_mut(&envelope.origin) else {
                    return;
                };
                match event {
                    CollabEvent::Joined { info } => {
                        log::info!("Participant {} ({}) joined", envelope.origin, info.name);
                        participant.name = info.name;
                        participant.color = info.color;
                    }
                    CollabEvent::CursorMoved { position } => {
                        participant.cursor = position.map(|p| Point::new(p.x, p.y));
                    }
                    CollabEvent::SelectionChanged { ids } => participant.selection = ids,
                    _ => {}
                }
            }
        }
    }

    /// Write a scene record. Returns the ids whose state changed.
    fn apply_record(&mut self, scene: &mut Scene, event: CollabEvent) -> Vec<Uuid> {
        let before = scene.clone();
        match event {
            CollabEvent::ElementUpdated { element } | CollabEvent::EdgeUpdated { element } => {
                let id = element.id;
                self.tombstones.remove(&id);
                scene.put_element(element);
                for moved in scene.resolve_z_collision(id) {
                    log::debug!("Moved element {} above the current top after a z clash", moved);
                    self.republish(scene, moved);
                }
            }
            CollabEvent::ElementRemoved { id } => {
                self.tombstones.insert(id);
                self.pending_edges.remove(&id);
                self.pending_edges.retain(|_, envelope| match &envelope.event {
                    CollabEvent::EdgeUpdated { element } | CollabEvent::ElementUpdated { element } => {
                        !element.as_edge().is_some_and(|edge| edge.touches(id))
                    }
                    _ => true,
                });
                scene.take_element(id);
            }
            CollabEvent::GroupUpdated { mut group } => {
                self.tombstones.remove(&group.id);
                let id = group.id;
                group.members.retain(|member| match member {
                    GroupMember::Group(nested) => {
                        let cyclic = *nested == id || scene.group_contains(*nested, GroupMember::Group(id));
                        if cyclic {
                            log::warn!("Dropped cyclic remote group link {} -> {}", id, nested);
                        }
                        !cyclic
                    }
                    GroupMember::Element(_) => true,
                });
                scene.put_group(group);
            }
            CollabEvent::GroupRemoved { id } => {
                self.tombstones.insert(id);
                scene.take_group(id);
            }
            _ => {}
        }
        let pruned = scene.prune_dangling();
        if pruned > 0 {
            log::debug!("Remote write pruned {} dangling references", pruned);
        }
        let diff = SceneDiff::between(&before, scene);
        diff.touched_elements()
            .into_iter()
            .chain(diff.touched_groups())
            .collect()
    }

    /// Publish a record repaired locally so other replicas adopt the same state.
    fn republish(&mut self, scene: &Scene, id: Uuid) {
        let Some(element) = scene.element(id).cloned() else {
            return;
        };
        let event = if element.is_edge() {
            CollabEvent::EdgeUpdated { element }
        } else {
            CollabEvent::ElementUpdated { element }
        };
        if let Err(e) = self.emit(event) {
            log::warn!("Failed to publish repaired element {}: {}", id, e);
        }
    }

    fn flush_pending_edges(&mut self, scene: &mut Scene) -> Vec<Uuid> {
        let ready: Vec<Uuid> = self
            .pending_edges
            .iter()
            .filter(|(_, envelope)| match &envelope.event {
                CollabEvent::EdgeUpdated { element } | CollabEvent::ElementUpdated { element } => {
                    element.as_edge().is_some_and(|edge| scene.endpoints_present(edge))
                }
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect();
        let mut touched = Vec::new();
        for id in ready {
            if let Some(envelope) = self.pending_edges.remove(&id) {
                let stamp = Stamp {
                    timestamp: envelope.timestamp,
                    origin: envelope.origin,
                };
                if self.versions.get(&id).is_some_and(|current| stamp <= *current) {
                    continue;
                }
                self.versions.insert(id, stamp);
                log::debug!("Applying buffered remote edge {}", id);
                touched.extend(self.apply_record(scene, envelope.event));
            }
        }
        touched
    }

    /// Whether a record was removed and not written since.
    pub fn is_tombstoned(&self, id: Uuid) -> bool {
        self.tombstones.contains(&id)
    }

    /// Record local writes without publishing them (used after loading a document).
    pub fn stamp_scene(&mut self, scene: &Scene) {
        let timestamp = self.tick();
        let stamp = Stamp {
            timestamp,
            origin: self.local,
        };
        for id in scene.elements().map(|e| e.id).chain(scene.groups().map(|g| g.id)) {
            self.versions.insert(id, stamp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, ElementPatch, NodeContent};
    use crate::scene::DiagramType;
    use crate::sync::LoopbackHub;
    use kurbo::Size;

    fn manager() -> CollaborationManager {
        CollaborationManager::new("tester", SerializableColor::black())
    }

    fn node(label: &str) -> Element {
        Element::node(NodeContent::default(), Point::ZERO, Size::new(10.0, 10.0)).with_label(label)
    }

    fn update(origin: ParticipantId, timestamp: u64, element: Element) -> Envelope {
        Envelope {
            origin,
            timestamp,
            event: CollabEvent::ElementUpdated { element },
        }
    }

    #[test]
    fn test_hybrid_clock_is_monotonic() {
        let mut m = manager();
        m.observe(u64::MAX / 2);
        let a = m.tick();
        let b = m.tick();
        assert_eq!(a, u64::MAX / 2 + 1);
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_last_write_wins_regardless_of_order() {
        let peer_a = Uuid::new_v4();
        let peer_b = Uuid::new_v4();
        let base = node("base");
        let mut at_t = base.clone();
        at_t.label = "T".into();
        let mut at_t1 = base.clone();
        at_t1.label = "T+1".into();

        for reversed in [false, true] {
            let mut m = manager();
            let mut scene = Scene::new(DiagramType::Whiteboard).add_element(base.clone()).unwrap();
            let mut envelopes = vec![update(peer_a, 1_000, at_t.clone()), update(peer_b, 1_001, at_t1.clone())];
            if reversed {
                envelopes.reverse();
            }
            for envelope in envelopes {
                m.ingest(&mut scene, envelope, &HashSet::new());
            }
            assert_eq!(scene.element(base.id).unwrap().label, "T+1");
        }
    }

    #[test]
    fn test_stale_write_records_conflict() {
        let peer_a = Uuid::new_v4();
        let peer_b = Uuid::new_v4();
        let element = node("x");
        let mut m = manager();
        let mut scene = Scene::new(DiagramType::Whiteboard);

        m.ingest(&mut scene, update(peer_b, 20, element.clone()), &HashSet::new());
        let outcome = m.ingest(&mut scene, update(peer_a, 10, element.clone()), &HashSet::new());
        assert_eq!(outcome, Ingested::Stale);
        let conflicts = m.take_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kept_origin, peer_b);
        assert_eq!(conflicts[0].discarded_timestamp, 10);
    }

    #[test]
    fn test_tombstone_blocks_late_update() {
        let peer = Uuid::new_v4();
        let element = node("x");
        let mut m = manager();
        let mut scene = Scene::new(DiagramType::Whiteboard).add_element(element.clone()).unwrap();

        let removal = Envelope {
            origin: peer,
            timestamp: 50,
            event: CollabEvent::ElementRemoved { id: element.id },
        };
        m.ingest(&mut scene, removal, &HashSet::new());
        assert!(!scene.contains(element.id));
        assert!(m.is_tombstoned(element.id));

        let late = update(peer, 40, element.clone());
        assert_eq!(m.ingest(&mut scene, late, &HashSet::new()), Ingested::Stale);
        assert!(!scene.contains(element.id));
    }

    #[test]
    fn test_edge_buffered_until_endpoints_arrive() {
        let peer = Uuid::new_v4();
        let a = node("a");
        let b = node("b");
        let edge = Element::edge(a.id, b.id);
        let mut m = manager();
        let mut scene = Scene::new(DiagramType::Flowchart);
        let none = HashSet::new();

        let edge_envelope = Envelope {
            origin: peer,
            timestamp: 3,
            event: CollabEvent::EdgeUpdated { element: edge.clone() },
        };
        assert_eq!(m.ingest(&mut scene, edge_envelope, &none), Ingested::Buffered);
        m.ingest(&mut scene, update(peer, 1, a.clone()), &none);
        assert_eq!(m.pending_edge_count(), 1);
        m.ingest(&mut scene, update(peer, 2, b.clone()), &none);
        assert_eq!(m.pending_edge_count(), 0);
        assert!(scene.contains(edge.id));
        assert!(scene.is_consistent());
    }

    #[test]
    fn test_remote_z_collision_moves_higher_id_and_republishes() {
        let peer = Uuid::new_v4();
        let local = node("local");
        let mut scene = Scene::new(DiagramType::Whiteboard).add_element(local.clone()).unwrap();
        let mut remote = node("remote");
        remote.z_index = scene.element(local.id).unwrap().z_index;

        let mut m = manager();
        m.ingest(&mut scene, update(peer, 1, remote.clone()), &HashSet::new());
        let (low, high) = if local.id < remote.id { (local.id, remote.id) } else { (remote.id, local.id) };
        assert!(scene.element(high).unwrap().z_index > scene.element(low).unwrap().z_index);
        assert!(scene.is_consistent());

        let outgoing = m.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        match &outgoing[0].event {
            CollabEvent::ElementUpdated { element } => {
                assert_eq!(element.id, high);
                assert_eq!(element.z_index, scene.element(high).unwrap().z_index);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_newer_write_from_other_origin_is_not_a_conflict() {
        let peer_a = Uuid::new_v4();
        let peer_b = Uuid::new_v4();
        let element = node("x");
        let mut m = manager();
        let mut scene = Scene::new(DiagramType::Whiteboard);

        m.ingest(&mut scene, update(peer_a, 10, element.clone()), &HashSet::new());
        let later = update(peer_b, 60_000, element.clone().with_label("later"));
        assert!(matches!(m.ingest(&mut scene, later, &HashSet::new()), Ingested::Applied { .. }));
        assert!(m.take_conflicts().is_empty());
        assert_eq!(scene.element(element.id).unwrap().label, "later");
    }

    #[test]
    fn test_removed_endpoint_drops_pending_edge() {
        let peer = Uuid::new_v4();
        let a = node("a");
        let b = node("b");
        let edge = Element::edge(a.id, b.id);
        let mut m = manager();
        let mut scene = Scene::new(DiagramType::Flowchart);
        let none = HashSet::new();

        m.ingest(&mut scene, update(peer, 1, a.clone()), &none);
        let edge_envelope = Envelope {
            origin: peer,
            timestamp: 2,
            event: CollabEvent::EdgeUpdated { element: edge.clone() },
        };
        assert_eq!(m.ingest(&mut scene, edge_envelope, &none), Ingested::Buffered);
        assert_eq!(m.pending_edge_count(), 1);

        let removal = Envelope {
            origin: peer,
            timestamp: 3,
            event: CollabEvent::ElementRemoved { id: a.id },
        };
        m.ingest(&mut scene, removal, &none);
        assert_eq!(m.pending_edge_count(), 0);

        m.ingest(&mut scene, update(peer, 4, b.clone()), &none);
        assert!(!scene.contains(edge.id));
        assert!(scene.is_consistent());
    }

    #[test]
    fn test_writes_held_during_gesture() {
        let peer = Uuid::new_v4();
        let element = node("x");
        let mut scene = Scene::new(DiagramType::Whiteboard).add_element(element.clone()).unwrap();
        let mut m = manager();
        let mut moved = element.clone();
        moved.position = Point::new(99.0, 0.0);

        let busy: HashSet<Uuid> = [element.id].into_iter().collect();
        assert_eq!(m.ingest(&mut scene, update(peer, 5, moved), &busy), Ingested::Held);
        assert_eq!(scene.element(element.id).unwrap().position, Point::ZERO);

        let released = m.release_held(&mut scene, &HashSet::new());
        assert!(matches!(released[0], Ingested::Applied { .. }));
        assert!((scene.element(element.id).unwrap().position.x - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_local_write_beats_older_remote() {
        let peer = Uuid::new_v4();
        let element = node("x");
        let scene0 = Scene::new(DiagramType::Whiteboard).add_element(element.clone()).unwrap();
        let scene1 = scene0
            .update_element(element.id, &ElementPatch::default().label("local"))
            .unwrap();
        let mut m = manager();
        m.broadcast_diff(&SceneDiff::between(&scene0, &scene1)).unwrap();
        assert_eq!(m.take_outgoing().len(), 1);

        let mut scene = scene1;
        let mut old = element.clone();
        old.label = "remote".into();
        assert_eq!(m.ingest(&mut scene, update(peer, 1, old), &HashSet::new()), Ingested::Stale);
        assert_eq!(scene.element(element.id).unwrap().label, "local");
    }

    #[test]
    fn test_presence_never_touches_scene() {
        let hub = LoopbackHub::new();
        let mut alice = CollaborationManager::new("alice", SerializableColor::black());
        let mut bob = CollaborationManager::new("bob", SerializableColor::white());
        alice.connect(Arc::new(hub.channel())).unwrap();
        bob.connect(Arc::new(hub.channel())).unwrap();
        bob.broadcast_cursor(Some(Point::new(3.0, 4.0))).unwrap();

        let mut scene = Scene::new(DiagramType::Whiteboard);
        let before = scene.clone();
        for envelope in alice.inbox().drain() {
            assert_eq!(alice.ingest(&mut scene, envelope, &HashSet::new()), Ingested::Presence);
        }
        assert_eq!(scene, before);
        let bob_seen = alice.participant(bob.participant_id()).unwrap();
        assert_eq!(bob_seen.name, "bob");
        assert_eq!(bob_seen.cursor, Some(Point::new(3.0, 4.0)));

        bob.disconnect().unwrap();
        for envelope in alice.inbox().drain() {
            alice.ingest(&mut scene, envelope, &HashSet::new());
        }
        assert!(alice.participant(bob.participant_id()).is_none());
    }

    #[test]
    fn test_own_echo_ignored() {
        let mut m = manager();
        let mut scene = Scene::new(DiagramType::Whiteboard);
        let echo = update(m.participant_id(), 1, node("x"));
        assert_eq!(m.ingest(&mut scene, echo, &HashSet::new()), Ingested::Ignored);
        assert!(scene.is_empty());
    }
}
