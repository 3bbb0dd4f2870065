//! WebSocket change feed.
//!
//! Clients connect to `/api/v1/ws`, then join the polls they are watching:
//!
//! ```text
//! → {"type":"join_poll","pollId":"…"}
//! ← {"type":"vote_update","pollId":"…"}
//! → {"type":"leave_poll","pollId":"…"}
//! ```
//!
//! A `vote_update` carries no counts. Clients re-read the poll or its stats
//! over HTTP, so a dropped or coalesced signal never leaves them with stale
//! numbers.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use pollcast_core::{now_millis, Observer, PollChanged, PollId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::node::NodeState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Start receiving updates for a poll
    #[serde(rename_all = "camelCase")]
    JoinPoll { poll_id: PollId },
    /// Stop receiving updates for a poll
    #[serde(rename_all = "camelCase")]
    LeavePoll { poll_id: PollId },
}

/// Messages pushed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A watched poll changed
    #[serde(rename_all = "camelCase")]
    VoteUpdate { poll_id: PollId },
    /// Heartbeat to keep connection alive
    Heartbeat { timestamp: u64 },
    /// A client command could not be honoured
    Error { message: String },
}

impl From<PollChanged> for ServerEvent {
    fn from(changed: PollChanged) -> Self {
        ServerEvent::VoteUpdate {
            poll_id: changed.poll_id,
        }
    }
}

/// WebSocket handler for poll updates
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<NodeState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<NodeState>) {
    let mut observer = state.engine.notifier().observer();
    info!(observer = ?observer.id(), "WebSocket client connected");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_command(&text, &state, &observer) {
                            if let Err(e) = send_event(&mut socket, &reply).await {
                                warn!("Failed to send reply: {}", e);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(observer = ?observer.id(), "WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            changed = observer.changed() => {
                if let Err(e) = send_event(&mut socket, &changed.into()).await {
                    warn!("Failed to send vote update: {}", e);
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let event = ServerEvent::Heartbeat { timestamp: now_millis() };
                if let Err(e) = send_event(&mut socket, &event).await {
                    warn!("Failed to send heartbeat: {}", e);
                    break;
                }
            }
        }
    }
    // Dropping the observer leaves every poll it joined.
}

/// Apply one client message. Returns an event to send back, if any.
fn handle_command(text: &str, state: &NodeState, observer: &Observer) -> Option<ServerEvent> {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            debug!("Ignoring malformed client message: {}", e);
            return Some(ServerEvent::Error {
                message: format!("Invalid message: {}", e),
            });
        }
    };

    match command {
        ClientCommand::JoinPoll { poll_id } => match state.engine.get_poll(&poll_id) {
            Ok(_) => {
                debug!(observer = ?observer.id(), poll = %poll_id, "joined poll");
                observer.subscribe(&poll_id);
                None
            }
            Err(e) => Some(ServerEvent::Error {
                message: e.to_string(),
            }),
        },
        ClientCommand::LeavePoll { poll_id } => {
            debug!(observer = ?observer.id(), poll = %poll_id, "left poll");
            observer.unsubscribe(&poll_id);
            None
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(json)).await
}
