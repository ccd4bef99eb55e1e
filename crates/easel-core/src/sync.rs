//! Realtime channel for collaboration.
//!
//! Local mutations travel as [`Envelope`]s over a [`RealtimeChannel`]. Two
//! channels ship with the engine: an in-process [`LoopbackHub`] and a
//! [`WebSocketChannel`] that talks to the relay server. Whatever the channel,
//! incoming envelopes land in one [`Inbox`] and are applied by the session in
//! arrival order.

use crate::element::{Element, ElementId, SerializableColor};
use crate::group::{Group, GroupId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Identifies one participant of a collaborative session.
pub type ParticipantId = Uuid;

/// Sync errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Informational; resolved automatically by last-write-wins.
    #[error("Sync conflict: {0}")]
    Conflict(SyncConflict),
    #[error("Channel error: {0}")]
    Channel(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Two writes to the same record; the later one was kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Element or group id.
    pub target: Uuid,
    pub kept_origin: ParticipantId,
    pub kept_timestamp: u64,
    pub discarded_origin: ParticipantId,
    pub discarded_timestamp: u64,
}

impl fmt::Display for SyncConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} kept write {}@{} over {}@{}",
            self.target,
            self.kept_origin,
            self.kept_timestamp,
            self.discarded_origin,
            self.discarded_timestamp
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// Display metadata a participant announces when joining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub name: String,
    pub color: SerializableColor,
}

/// What happened. Scene events carry the full record state so that applying
/// the latest event for an id is enough to converge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollabEvent {
    ElementUpdated { element: Element },
    EdgeUpdated { element: Element },
    ElementRemoved { id: ElementId },
    GroupUpdated { group: Group },
    GroupRemoved { id: GroupId },
    SelectionChanged { ids: Vec<ElementId> },
    Joined { info: ParticipantInfo },
    Left,
    CursorMoved { position: Option<CursorPosition> },
}

impl CollabEvent {
    /// Presence events never touch the scene.
    pub fn is_presence(&self) -> bool {
        matches!(
            self,
            CollabEvent::SelectionChanged { .. }
                | CollabEvent::Joined { .. }
                | CollabEvent::Left
                | CollabEvent::CursorMoved { .. }
        )
    }

    /// The element or group a scene event writes.
    pub fn target(&self) -> Option<Uuid> {
        match self {
            CollabEvent::ElementUpdated { element } | CollabEvent::EdgeUpdated { element } => {
                Some(element.id)
            }
            CollabEvent::ElementRemoved { id } | CollabEvent::GroupRemoved { id } => Some(*id),
            CollabEvent::GroupUpdated { group } => Some(group.id),
            _ => None,
        }
    }
}

/// An event tagged with who sent it and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: ParticipantId,
    /// Milliseconds on the sender's hybrid clock.
    pub timestamp: u64,
    pub event: CollabEvent,
}

/// Messages sent to the relay server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Broadcast an envelope to the rest of the room
    Publish { envelope: Envelope },
    /// Store the latest document for late joiners
    Snapshot { document: serde_json::Value },
}

/// Messages received from the relay server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join
    Joined {
        room: String,
        peer_count: usize,
        /// Last document snapshot stored in the room, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<serde_json::Value>,
    },
    PeerJoined { peer_id: String },
    PeerLeft { peer_id: String },
    /// Envelope from another peer
    Event { from: String, envelope: Envelope },
    Error { message: String },
}

/// Callback invoked for every envelope delivered to a subscriber.
pub type EnvelopeHandler = Box<dyn FnMut(Envelope) + Send>;

/// Opaque pub/sub channel. Delivery order across participants is not
/// guaranteed; receivers resolve ordering by timestamp.
pub trait RealtimeChannel: Send + Sync {
    /// Send an envelope to every other subscriber.
    fn publish(&self, envelope: Envelope) -> SyncResult<()>;

    /// Register a handler for envelopes from other participants.
    fn subscribe(&self, handler: EnvelopeHandler) -> SyncResult<()>;
}

/// Single ingestion point for remote envelopes.
#[derive(Clone, Default)]
pub struct Inbox {
    queue: Arc<Mutex<VecDeque<Envelope>>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, envelope: Envelope) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back(envelope),
            Err(e) => log::error!("Inbox lock poisoned, dropping envelope: {}", e),
        }
    }

    /// Remove and return everything queued, oldest first.
    pub fn drain(&self) -> Vec<Envelope> {
        self.queue
            .lock()
            .map(|mut queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handler that forwards into this inbox.
    pub fn handler(&self) -> EnvelopeHandler {
        let inbox = self.clone();
        Box::new(move |envelope| inbox.push(envelope))
    }
}

impl fmt::Debug for Inbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbox").field("len", &self.len()).finish()
    }
}

// ============================================================================
// Loopback hub
// ============================================================================

struct Subscriber {
    channel: Uuid,
    handler: EnvelopeHandler,
}

/// In-process fan-out between channels, for tests and same-process sessions.
///
/// Handlers run synchronously inside `publish` and must not publish themselves.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new endpoint on this hub.
    pub fn channel(&self) -> LoopbackChannel {
        LoopbackChannel {
            hub: self.clone(),
            id: Uuid::new_v4(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// One endpoint of a [`LoopbackHub`]. It never receives its own envelopes.
pub struct LoopbackChannel {
    hub: LoopbackHub,
    id: Uuid,
}

impl RealtimeChannel for LoopbackChannel {
    fn publish(&self, envelope: Envelope) -> SyncResult<()> {
        let mut subscribers = self
            .hub
            .subscribers
            .lock()
            .map_err(|e| SyncError::Channel(format!("Lock error: {}", e)))?;
        for subscriber in subscribers.iter_mut().filter(|s| s.channel != self.id) {
            (subscriber.handler)(envelope.clone());
        }
        Ok(())
    }

    fn subscribe(&self, handler: EnvelopeHandler) -> SyncResult<()> {
        let mut subscribers = self
            .hub
            .subscribers
            .lock()
            .map_err(|e| SyncError::Channel(format!("Lock error: {}", e)))?;
        subscribers.push(Subscriber {
            channel: self.id,
            handler,
        });
        Ok(())
    }
}

// ============================================================================
// WebSocket client
// ============================================================================

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Non-envelope traffic from the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    Connected,
    Disconnected,
    JoinedRoom {
        room: String,
        peer_count: usize,
        snapshot: Option<serde_json::Value>,
    },
    PeerJoined { peer_id: String },
    PeerLeft { peer_id: String },
    Error { message: String },
}

/// A decoded relay frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    Envelope(Envelope),
    Status(ChannelStatus),
}

pub(crate) fn decode_server_frame(text: &str) -> SyncResult<Frame> {
    let message: ServerMessage =
        serde_json::from_str(text).map_err(|e| SyncError::Protocol(e.to_string()))?;
    let status = match message {
        ServerMessage::Event { envelope, .. } => return Ok(Frame::Envelope(envelope)),
        ServerMessage::Joined {
            room,
            peer_count,
            snapshot,
        } => ChannelStatus::JoinedRoom {
            room,
            peer_count,
            snapshot,
        },
        ServerMessage::PeerJoined { peer_id } => ChannelStatus::PeerJoined { peer_id },
        ServerMessage::PeerLeft { peer_id } => ChannelStatus::PeerLeft { peer_id },
        ServerMessage::Error { message } => ChannelStatus::Error { message },
    };
    Ok(Frame::Status(status))
}

/// At most `max_chars` characters of `text`, cut on a character boundary.
pub(crate) fn log_preview(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(end, _)| &text[..end])
}

mod native_client {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    type Handlers = Arc<Mutex<Vec<EnvelopeHandler>>>;

    /// Relay client. A background thread owns the socket; envelopes go to
    /// subscribed handlers from that thread, everything else is queued for
    /// [`WebSocketChannel::poll_status`].
    pub struct WebSocketChannel {
        state: Mutex<ConnectionState>,
        cmd_tx: Mutex<Option<Sender<WsCommand>>>,
        status_rx: Mutex<Option<Receiver<ChannelStatus>>>,
        handlers: Handlers,
        _thread: Mutex<Option<JoinHandle<()>>>,
    }

    impl WebSocketChannel {
        /// Create a new disconnected client.
        pub fn new() -> Self {
            Self {
                state: Mutex::new(ConnectionState::Disconnected),
                cmd_tx: Mutex::new(None),
                status_rx: Mutex::new(None),
                handlers: Arc::new(Mutex::new(Vec::new())),
                _thread: Mutex::new(None),
            }
        }

        /// Connect to a relay and join `room`.
        pub fn connect(&self, url: &str, room: &str) -> SyncResult<()> {
            let mut cmd_slot = self
                .cmd_tx
                .lock()
                .map_err(|e| SyncError::Channel(format!("Lock error: {}", e)))?;
            if cmd_slot.is_some() {
                return Err(SyncError::Channel("Already connected".to_string()));
            }

            let parsed_url = Url::parse(url).map_err(|e| SyncError::Channel(format!("Invalid URL: {}", e)))?;
            if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
                return Err(SyncError::Channel(format!(
                    "Invalid WebSocket URL scheme: {}",
                    parsed_url.scheme()
                )));
            }
            self.set_state(ConnectionState::Connecting);

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (status_tx, status_rx) = channel::<ChannelStatus>();
            let join = serde_json::to_string(&ClientMessage::Join {
                room: room.to_string(),
            })
            .map_err(|e| SyncError::Protocol(e.to_string()))?;
            cmd_tx
                .send(WsCommand::Send(join))
                .map_err(|e| SyncError::Channel(format!("Send failed: {}", e)))?;

            let url = url.to_string();
            let handlers = self.handlers.clone();
            let handle = thread::spawn(move || run_socket(&url, cmd_rx, status_tx, handlers));

            *cmd_slot = Some(cmd_tx);
            if let Ok(mut rx) = self.status_rx.lock() {
                *rx = Some(status_rx);
            }
            if let Ok(mut thread) = self._thread.lock() {
                *thread = Some(handle);
            }
            Ok(())
        }

        /// Disconnect from the server.
        pub fn disconnect(&self) {
            if let Ok(mut slot) = self.cmd_tx.lock() {
                if let Some(tx) = slot.take() {
                    let _ = tx.send(WsCommand::Close);
                }
            }
            if let Ok(mut rx) = self.status_rx.lock() {
                *rx = None;
            }
            if let Ok(mut thread) = self._thread.lock() {
                *thread = None;
            }
            self.set_state(ConnectionState::Disconnected);
        }

        /// Ask the relay to keep `document` for late joiners.
        pub fn send_snapshot(&self, document: serde_json::Value) -> SyncResult<()> {
            self.send(&ClientMessage::Snapshot { document })
        }

        fn send(&self, message: &ClientMessage) -> SyncResult<()> {
            let json = serde_json::to_string(message).map_err(|e| SyncError::Protocol(e.to_string()))?;
            let slot = self
                .cmd_tx
                .lock()
                .map_err(|e| SyncError::Channel(format!("Lock error: {}", e)))?;
            match slot.as_ref() {
                Some(tx) => tx
                    .send(WsCommand::Send(json))
                    .map_err(|e| SyncError::Channel(format!("Send failed: {}", e))),
                None => Err(SyncError::Channel("Not connected".to_string())),
            }
        }

        /// Drain pending status changes (non-blocking).
        pub fn poll_status(&self) -> Vec<ChannelStatus> {
            let drained: Vec<ChannelStatus> = match self.status_rx.lock() {
                Ok(rx) => rx.as_ref().map(|rx| rx.try_iter().collect()).unwrap_or_default(),
                Err(_) => Vec::new(),
            };
            for status in &drained {
                match status {
                    ChannelStatus::Connected => self.set_state(ConnectionState::Connected),
                    ChannelStatus::Disconnected => self.set_state(ConnectionState::Disconnected),
                    ChannelStatus::Error { .. } => self.set_state(ConnectionState::Error),
                    _ => {}
                }
            }
            drained
        }

        pub fn state(&self) -> ConnectionState {
            self.state
                .lock()
                .map(|s| *s)
                .unwrap_or(ConnectionState::Error)
        }

        pub fn is_connected(&self) -> bool {
            self.state() == ConnectionState::Connected
        }

        fn set_state(&self, state: ConnectionState) {
            if let Ok(mut current) = self.state.lock() {
                *current = state;
            }
        }
    }

    fn run_socket(
        url: &str,
        cmd_rx: Receiver<WsCommand>,
        status_tx: Sender<ChannelStatus>,
        handlers: Handlers,
    ) {
        log::info!("WebSocket thread: connecting to {}", url);
        let (mut socket, response) = match connect(url) {
            Ok(connected) => connected,
            Err(e) => {
                log::error!("WebSocket connection failed: {}", e);
                let _ = status_tx.send(ChannelStatus::Error {
                    message: format!("Connection failed: {}", e),
                });
                return;
            }
        };
        log::info!("WebSocket connected, status: {}", response.status());
        let _ = status_tx.send(ChannelStatus::Connected);

        if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }

        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    log::debug!("WebSocket sending: {}", log_preview(&msg, 100));
                    if let Err(e) = socket.send(Message::Text(msg)) {
                        log::error!("WebSocket send error: {}", e);
                        break;
                    }
                }
                Ok(WsCommand::Close) => {
                    log::info!("WebSocket close requested");
                    let _ = socket.close(None);
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    log::info!("WebSocket command channel disconnected");
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            match socket.read() {
                Ok(Message::Text(txt)) => match decode_server_frame(&txt) {
                    Ok(Frame::Envelope(envelope)) => {
                        if let Ok(mut handlers) = handlers.lock() {
                            for handler in handlers.iter_mut() {
                                handler(envelope.clone());
                            }
                        }
                    }
                    Ok(Frame::Status(status)) => {
                        let _ = status_tx.send(status);
                    }
                    Err(e) => log::warn!("Failed to parse server message: {}", e),
                },
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket received close frame");
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    log::error!("WebSocket read error: {}", e);
                    break;
                }
            }
        }

        log::info!("WebSocket thread exiting");
        let _ = status_tx.send(ChannelStatus::Disconnected);
    }

    impl RealtimeChannel for WebSocketChannel {
        fn publish(&self, envelope: Envelope) -> SyncResult<()> {
            self.send(&ClientMessage::Publish { envelope })
        }

        fn subscribe(&self, handler: EnvelopeHandler) -> SyncResult<()> {
            self.handlers
                .lock()
                .map_err(|e| SyncError::Channel(format!("Lock error: {}", e)))?
                .push(handler);
            Ok(())
        }
    }

    impl Default for WebSocketChannel {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for WebSocketChannel {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

pub use native_client::WebSocketChannel;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_preview_cuts_on_char_boundary() {
        let room = format!("{}☀☀☀", "x".repeat(99));
        assert_eq!(log_preview(&room, 100), format!("{}☀", "x".repeat(99)));
        assert_eq!(log_preview("ação", 100), "ação");
        assert_eq!(log_preview("ação", 2), "aç");
        assert_eq!(log_preview("", 3), "");
    }

    fn envelope(timestamp: u64) -> Envelope {
        Envelope {
            origin: Uuid::new_v4(),
            timestamp,
            event: CollabEvent::ElementRemoved { id: Uuid::new_v4() },
        }
    }

    #[test]
    fn test_inbox_preserves_arrival_order() {
        let inbox = Inbox::new();
        let mut handler = inbox.handler();
        handler(envelope(2));
        handler(envelope(1));
        assert_eq!(inbox.len(), 2);
        let drained: Vec<u64> = inbox.drain().iter().map(|e| e.timestamp).collect();
        assert_eq!(drained, vec![2, 1]);
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_loopback_skips_sender() {
        let hub = LoopbackHub::new();
        let a = hub.channel();
        let b = hub.channel();
        let (inbox_a, inbox_b) = (Inbox::new(), Inbox::new());
        a.subscribe(inbox_a.handler()).unwrap();
        b.subscribe(inbox_b.handler()).unwrap();
        assert_eq!(hub.subscriber_count(), 2);

        a.publish(envelope(7)).unwrap();
        assert!(inbox_a.is_empty());
        assert_eq!(inbox_b.drain()[0].timestamp, 7);
    }

    #[test]
    fn test_event_json_shape() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(CollabEvent::ElementRemoved { id }).unwrap();
        assert_eq!(json["type"], "element_removed");
        assert_eq!(json["id"], id.to_string());
        assert!(CollabEvent::Left.is_presence());
        assert_eq!(CollabEvent::GroupRemoved { id }.target(), Some(id));
    }

    #[test]
    fn test_client_message_serialize() {
        let msg = ClientMessage::Join {
            room: "test-room".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"join\""));
        assert!(json.contains("test-room"));
    }

    #[test]
    fn test_decode_server_frames() {
        let joined = decode_server_frame(r#"{"type":"joined","room":"test","peer_count":2}"#).unwrap();
        assert_eq!(
            joined,
            Frame::Status(ChannelStatus::JoinedRoom {
                room: "test".into(),
                peer_count: 2,
                snapshot: None
            })
        );

        let original = envelope(5);
        let frame = serde_json::to_string(&ServerMessage::Event {
            from: "peer".into(),
            envelope: original.clone(),
        })
        .unwrap();
        assert_eq!(decode_server_frame(&frame).unwrap(), Frame::Envelope(original));

        assert!(matches!(decode_server_frame("{}"), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn test_websocket_rejects_bad_scheme() {
        let channel = WebSocketChannel::new();
        assert!(matches!(
            channel.connect("http://localhost:1", "room"),
            Err(SyncError::Channel(_))
        ));
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert!(channel.publish(envelope(1)).is_err());
    }
}
