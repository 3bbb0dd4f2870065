//! Pollcast Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - HTTP API and WebSocket change feed for clients
//! - Unix admin socket for local operator commands (pollcast-admin CLI)

use crate::admin_socket::{self, AdminSocket};
use crate::api;
use crate::error::{Error, Result};
use crate::storage::Storage;
use pollcast_core::{Notifier, OriginResolver, PollEngine};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a Pollcast node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for pollcast-admin CLI)
    pub admin_socket: PathBuf,

    /// Change signals buffered per observer
    pub notify_capacity: usize,

    /// Honour `X-Forwarded-For` when deriving anonymous identities
    pub trust_forwarded: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from(admin_socket::DEFAULT_DATA_DIR);
        Self {
            admin_socket: data_dir.join(admin_socket::SOCKET_FILE),
            data_dir,
            api_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            notify_capacity: pollcast_core::notifier::DEFAULT_OBSERVER_CAPACITY,
            trust_forwarded: true,
        }
    }
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let data_dir = lookup("POLLCAST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let api_addr = match lookup("POLLCAST_API_ADDR") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid POLLCAST_API_ADDR: {raw}")))?,
            None => defaults.api_addr,
        };

        let admin_socket = admin_socket::socket_path_from(&lookup);

        let notify_capacity = match lookup("POLLCAST_NOTIFY_CAPACITY") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| Error::Config(format!("invalid POLLCAST_NOTIFY_CAPACITY: {raw}")))?,
            None => defaults.notify_capacity,
        };

        let trust_forwarded = match lookup("POLLCAST_TRUST_FORWARDED").as_deref() {
            None => defaults.trust_forwarded,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(raw) => {
                return Err(Error::Config(format!(
                    "invalid POLLCAST_TRUST_FORWARDED: {raw}"
                )))
            }
        };

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            notify_capacity,
            trust_forwarded,
        })
    }
}

/// Shared state for the node - one engine over one storage instance.
pub struct NodeState {
    pub engine: PollEngine<Storage>,
    pub resolver: OriginResolver,
}

impl NodeState {
    pub fn new(storage: Arc<Storage>, config: &NodeConfig) -> Self {
        let notifier = Arc::new(Notifier::new(config.notify_capacity));
        Self {
            engine: PollEngine::new(storage, notifier),
            resolver: OriginResolver::new(config.trust_forwarded),
        }
    }
}

/// A Pollcast node instance.
pub struct PollcastNode {
    state: Arc<NodeState>,
    config: NodeConfig,
}

impl PollcastNode {
    /// Create a new node, opening storage under the data directory.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Arc::new(Storage::open(config.data_dir.join("db"))?);
        let state = Arc::new(NodeState::new(storage, &config));

        Ok(Self { state, config })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts HTTP server and admin socket).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Pollcast node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);

        let admin_socket = AdminSocket::new(self.state(), &self.config.admin_socket);
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        let app = api::build_router(self.state());

        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = NodeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./pollcast-data"));
        assert_eq!(config.api_addr.port(), 8080);
        assert_eq!(config.admin_socket, PathBuf::from("./pollcast-data/admin.sock"));
        assert!(config.trust_forwarded);
    }

    #[test]
    fn env_overrides() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("POLLCAST_DATA_DIR", "/var/lib/pollcast"),
            ("POLLCAST_API_ADDR", "127.0.0.1:9999"),
            ("POLLCAST_NOTIFY_CAPACITY", "4"),
            ("POLLCAST_TRUST_FORWARDED", "false"),
        ]))
        .unwrap();
        assert_eq!(config.api_addr.port(), 9999);
        assert_eq!(config.notify_capacity, 4);
        assert!(!config.trust_forwarded);
        assert_eq!(
            config.admin_socket,
            PathBuf::from("/var/lib/pollcast/admin.sock")
        );
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("POLLCAST_API_ADDR", "not-an-addr")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("POLLCAST_NOTIFY_CAPACITY", "0")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("POLLCAST_TRUST_FORWARDED", "maybe")])),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn node_opens_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            ..NodeConfig::default()
        };
        let node = PollcastNode::new(config).await.unwrap();
        assert_eq!(node.state().engine.notifier().topic_count(), 0);
    }
}
