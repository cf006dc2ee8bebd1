//! atomlink sensor node.
//!
//! Brings up the wireless link and relays IMU telemetry and camera frames
//! over the configured transport.

use anyhow::Result;

use atomlink_common::init_tracing;
use atomlink_node::{NodeArgs, NodeConfig, NodeRunner};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = NodeArgs::parse_with_default("atomlink.json5");

    let mut config = NodeConfig::load(&args.config)?;

    // CLI log level wins over the file
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config.logging)?;

    tracing::info!(config = %args.config.display(), "Configuration loaded");

    NodeRunner::new(config).run().await?;
    Ok(())
}
