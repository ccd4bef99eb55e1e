//! Easel WebSocket Relay Server
//!
//! Relays collaboration envelopes between clients in the same room and keeps
//! the latest document snapshot for late joiners.
//!
//! ## Protocol
//!
//! Messages are JSON, tagged by `type`:
//! ```json
//! { "type": "join", "room": "room-id" }
//! { "type": "publish", "envelope": { "origin": "…", "timestamp": 0, "event": { … } } }
//! { "type": "snapshot", "document": { … } }
//! { "type": "leave" }
//! ```

mod state;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use easel_core::sync::{ClientMessage, ServerMessage};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use state::{AppState, RoomMessage};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_ADDR: &str = "0.0.0.0:3030";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "easel_relay=info,tower_http=info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::var("EASEL_RELAY_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Easel relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Index page
async fn index() -> &'static str {
    "Easel Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

type Sender = SplitSink<WebSocket, Message>;

/// Serialize and send one message. Returns false when the socket is gone.
async fn send(sender: &mut Sender, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode server message: {}", e);
            true
        }
    }
}

/// Per-connection room membership.
struct Session {
    peer_id: String,
    room: Option<String>,
    rx: Option<broadcast::Receiver<RoomMessage>>,
}

impl Session {
    fn leave(&mut self, state: &AppState) {
        if let Some(room) = self.room.take() {
            state.leave_room(&room, &self.peer_id);
            state.broadcast(
                &room,
                &self.peer_id,
                ServerMessage::PeerLeft {
                    peer_id: self.peer_id.clone(),
                },
            );
            info!("Peer {} left room {}", self.peer_id, room);
        }
        self.rx = None;
    }

    /// Handle one client message, returning a direct reply if there is one.
    fn handle(&mut self, state: &AppState, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::Join { room } => {
                self.leave(state);
                let joined = state.join_room(&room, &self.peer_id);
                self.rx = Some(joined.rx);
                self.room = Some(room.clone());
                state.broadcast(
                    &room,
                    &self.peer_id,
                    ServerMessage::PeerJoined {
                        peer_id: self.peer_id.clone(),
                    },
                );
                info!("Peer {} joined room {} ({} peers)", self.peer_id, room, joined.peer_count);
                Some(ServerMessage::Joined {
                    room,
                    peer_count: joined.peer_count,
                    snapshot: joined.snapshot,
                })
            }
            ClientMessage::Leave => {
                self.leave(state);
                None
            }
            ClientMessage::Publish { envelope } => match &self.room {
                Some(room) => {
                    tracing::debug!("Relaying envelope from {} in {}", self.peer_id, room);
                    state.broadcast(
                        room,
                        &self.peer_id,
                        ServerMessage::Event {
                            from: self.peer_id.clone(),
                            envelope,
                        },
                    );
                    None
                }
                None => Some(not_in_room()),
            },
            ClientMessage::Snapshot { document } => match &self.room {
                Some(room) => {
                    state.store_snapshot(room, document);
                    None
                }
                None => Some(not_in_room()),
            },
        }
    }
}

fn not_in_room() -> ServerMessage {
    ServerMessage::Error {
        message: "Join a room first".to_string(),
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut session = Session {
        peer_id: Uuid::new_v4().to_string(),
        room: None,
        rx: None,
    };
    info!("New connection: {}", session.peer_id);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => session.handle(&state, client_msg),
                            Err(e) => {
                                warn!("Invalid message from {}: {}", session.peer_id, e);
                                Some(ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                })
                            }
                        };
                        if let Some(reply) = reply {
                            if !send(&mut sender, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let err = ServerMessage::Error {
                            message: "Binary frames are not supported".to_string(),
                        };
                        if !send(&mut sender, &err).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", session.peer_id, e);
                        break;
                    }
                }
            }

            // Handle broadcast messages from room
            msg = async {
                match &mut session.rx {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match msg {
                    Ok((from, server_msg)) => {
                        // Don't echo back to sender
                        if from != session.peer_id && !send(&mut sender, &server_msg).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Peer {} lagged, skipped {} messages", session.peer_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        session.rx = None;
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    session.leave(&state);
    info!("Connection closed: {}", session.peer_id);
}
