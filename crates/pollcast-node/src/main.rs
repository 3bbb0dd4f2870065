//! Pollcast Node binary
//!
//! Serves the poll HTTP API, the WebSocket change feed and the admin socket.

use pollcast_node::{NodeConfig, PollcastNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pollcast_node=info,pollcast_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Pollcast Node");

    let config = NodeConfig::from_env()?;

    let node = PollcastNode::new(config).await?;
    node.run().await?;

    Ok(())
}
