//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for operators to inspect, close, delete and
//! reconcile polls without going through the creator-only HTTP routes.

use crate::error::Result;
use crate::node::NodeState;
use pollcast_core::{Poll, PollId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Ping (health check)
    Ping,
    /// Show a poll with its counters
    GetPoll { poll_id: String },
    /// List every stored poll
    ListPolls,
    /// Close a poll regardless of creator
    ClosePoll { poll_id: String },
    /// Delete a poll and its ledger
    DeletePoll { poll_id: String },
    /// Recompute a poll's counters from its ledger
    ReconcilePoll { poll_id: String },
}

/// Response from admin command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Poll { poll: Poll },
    Polls { polls: Vec<Poll> },
    Reconciled { poll_id: String, repaired: bool },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    state: Arc<NodeState>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(state: Arc<NodeState>, socket_path: &Path) -> Self {
        Self {
            state,
            socket_path: socket_path.to_path_buf(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

}

async fn handle_connection(stream: UnixStream, state: Arc<NodeState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &state).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

async fn execute_command(cmd: AdminCommand, state: &NodeState) -> AdminResponse {
    let engine = &state.engine;
    let result = match cmd {
        AdminCommand::Ping => return AdminResponse::Pong,

        AdminCommand::GetPoll { poll_id } => engine
            .get_poll(&PollId::new(poll_id))
            .map(|poll| AdminResponse::Poll { poll }),

        AdminCommand::ListPolls => {
            return match engine.store().list_polls() {
                Ok(polls) => AdminResponse::Polls { polls },
                Err(e) => AdminResponse::Error {
                    error: e.to_string(),
                },
            };
        }

        AdminCommand::ClosePoll { poll_id } => {
            let id = PollId::new(poll_id);
            engine.admin_close_poll(&id).await.map(|_| {
                tracing::info!("Admin closed poll {}", id);
                AdminResponse::Ok {
                    message: format!("Closed poll: {}", id),
                }
            })
        }

        AdminCommand::DeletePoll { poll_id } => {
            let id = PollId::new(poll_id);
            engine.admin_delete_poll(&id).await.map(|()| {
                tracing::info!("Admin deleted poll {}", id);
                AdminResponse::Ok {
                    message: format!("Deleted poll: {}", id),
                }
            })
        }

        AdminCommand::ReconcilePoll { poll_id } => {
            let id = PollId::new(poll_id);
            engine
                .reconcile_poll(&id)
                .await
                .map(|repaired| AdminResponse::Reconciled {
                    poll_id: id.to_string(),
                    repaired,
                })
        }
    };

    result.unwrap_or_else(|e| AdminResponse::Error {
        error: e.to_string(),
    })
}

/// Socket file name inside the data directory.
pub const SOCKET_FILE: &str = "admin.sock";

/// Default data directory when `POLLCAST_DATA_DIR` is unset.
pub const DEFAULT_DATA_DIR: &str = "./pollcast-data";

/// Socket path from `POLLCAST_ADMIN_SOCKET`, else `POLLCAST_DATA_DIR/admin.sock`.
pub fn socket_path_from(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = lookup("POLLCAST_ADMIN_SOCKET") {
        return PathBuf::from(path);
    }
    let data_dir = lookup("POLLCAST_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    Path::new(&data_dir).join(SOCKET_FILE)
}

/// Socket path the node uses under the current environment.
pub fn default_socket_path() -> PathBuf {
    socket_path_from(|key| std::env::var(key).ok())
}
