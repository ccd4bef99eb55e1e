//! Room bookkeeping shared by all connections.

use dashmap::DashMap;
use easel_core::sync::ServerMessage;
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// A message fanned out to a room, tagged with the sending peer.
pub type RoomMessage = (String, ServerMessage);

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<RoomMessage>,
    /// Connected peer IDs
    peers: HashSet<String>,
    /// Last document snapshot (for new joiners)
    snapshot: Option<Value>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashSet::new(),
            snapshot: None,
        }
    }
}

/// What a peer receives on joining a room.
pub struct Joined {
    pub rx: broadcast::Receiver<RoomMessage>,
    pub snapshot: Option<Value>,
    pub peer_count: usize,
}

/// Shared application state
#[derive(Default)]
pub struct AppState {
    rooms: DashMap<String, Room>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add peer to room, creating the room on first join.
    pub fn join_room(&self, room_id: &str, peer_id: &str) -> Joined {
        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        room.peers.insert(peer_id.to_string());
        Joined {
            rx: room.tx.subscribe(),
            snapshot: room.snapshot.clone(),
            peer_count: room.peers.len(),
        }
    }

    /// Remove peer from room. Empty rooms are dropped with their snapshot.
    pub fn leave_room(&self, room_id: &str, peer_id: &str) {
        let empty = match self.rooms.get_mut(room_id) {
            Some(mut room) => {
                room.peers.remove(peer_id);
                room.peers.is_empty()
            }
            None => false,
        };
        if empty {
            self.rooms.remove(room_id);
            tracing::debug!("Room {} closed", room_id);
        }
    }

    /// Replace the room's stored document snapshot.
    pub fn store_snapshot(&self, room_id: &str, document: Value) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.snapshot = Some(document);
        }
    }

    /// Broadcast message to room
    pub fn broadcast(&self, room_id: &str, from: &str, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            // Errors only when nobody is subscribed.
            let _ = room.tx.send((from.to_string(), msg));
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|r| r.peers.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_and_leave() {
        let state = AppState::new();
        assert_eq!(state.join_room("r", "a").peer_count, 1);
        assert_eq!(state.join_room("r", "b").peer_count, 2);
        assert_eq!(state.room_count(), 1);

        state.leave_room("r", "a");
        assert_eq!(state.peer_count("r"), 1);
        state.leave_room("r", "b");
        assert_eq!(state.room_count(), 0);

        // Leaving an unknown room is a no-op.
        state.leave_room("missing", "a");
    }

    #[test]
    fn test_snapshot_for_late_joiner() {
        let state = AppState::new();
        let first = state.join_room("r", "a");
        assert!(first.snapshot.is_none());

        state.store_snapshot("r", json!({"version": 2}));
        let late = state.join_room("r", "b");
        assert_eq!(late.snapshot, Some(json!({"version": 2})));
    }

    #[test]
    fn test_snapshot_dropped_with_room() {
        let state = AppState::new();
        let _ = state.join_room("r", "a");
        state.store_snapshot("r", json!({}));
        state.leave_room("r", "a");
        assert!(state.join_room("r", "b").snapshot.is_none());
    }

    #[test]
    fn test_broadcast_reaches_subscribers() {
        let state = AppState::new();
        let mut joined = state.join_room("r", "a");
        state.broadcast(
            "r",
            "b",
            ServerMessage::PeerJoined {
                peer_id: "b".into(),
            },
        );
        let (from, msg) = joined.rx.try_recv().unwrap();
        assert_eq!(from, "b");
        assert_eq!(
            msg,
            ServerMessage::PeerJoined {
                peer_id: "b".into()
            }
        );
    }
}
