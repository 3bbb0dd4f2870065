//! Pollcast Node - poll voting service
//!
//! Hosts a [`pollcast_core::PollEngine`] over RocksDB storage and exposes it
//! to clients and operators.
//!
//! # Architecture
//!
//! - **Storage**: RocksDB-backed poll and vote ledger
//! - **API**: HTTP endpoints for polls, votes and stats
//! - **WebSocket**: Per-poll change signals for live clients
//! - **Admin Socket**: Unix socket for local admin commands (pollcast-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use pollcast_node::{NodeConfig, PollcastNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = PollcastNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod error;
pub mod node;
pub mod storage;
pub mod ws;

pub use error::{Error, Result};
pub use node::{NodeConfig, NodeState, PollcastNode};
pub use storage::Storage;
