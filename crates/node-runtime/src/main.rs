//! # Transaction Index Node
//!
//! Runs the block-connection and prune workers over a data directory.
//!
//! ## Startup Sequence
//!
//! 1. Telemetry from `TXI_SERVICE_NAME`, `TXI_LOG_LEVEL`, `TXI_JSON_LOGS`
//! 2. Node configuration from the `TXI_*` variables, validated
//! 3. Open services (lock, block files, boundary, index)
//! 4. Start workers
//! 5. Optionally feed `TXI_DEVNET_BLOCKS` synthetic blocks
//! 6. Run until Ctrl+C, then shut down gracefully

use anyhow::{Context, Result};
use tracing::{debug, info};

use node_runtime::{DevnetFeeder, Node, NodeConfig, NodeServices};
use node_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};

const DEVNET_TXS_PER_BLOCK: u32 = 4;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_telemetry(&telemetry).context("failed to initialize telemetry")?;

    let config = NodeConfig::from_env().context("invalid node configuration")?;
    info!(
        service = %telemetry.service_name,
        data_dir = %config.data_dir.display(),
        txindex = config.enable_txindex,
        pruning = config.enable_pruning,
        "starting node"
    );

    let services = NodeServices::open(config).context("failed to open node services")?;
    let node = Node::start(services)?;

    if let Some(blocks) = devnet_blocks()? {
        feed_devnet(&node, blocks).await?;
    }

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    node.shutdown().await?;
    debug!(metrics = ?encode_metrics(), "final metrics");
    Ok(())
}

fn devnet_blocks() -> Result<Option<u64>> {
    match std::env::var("TXI_DEVNET_BLOCKS") {
        Ok(value) => Ok(Some(
            value
                .trim()
                .parse()
                .with_context(|| format!("TXI_DEVNET_BLOCKS: invalid value {:?}", value))?,
        )),
        Err(_) => Ok(None),
    }
}

/// Extend the stored chain with synthetic blocks.
async fn feed_devnet(node: &Node, blocks: u64) -> Result<()> {
    let services = node.services();
    let parent = match &services.index {
        Some(index) => index.best_block()?.map(|best| best.block_hash),
        None => None,
    };
    let next_height = node.tip().map_or(0, |tip| tip + 1);
    let mut feeder = DevnetFeeder::resume(DEVNET_TXS_PER_BLOCK, next_height, parent.unwrap_or([0; 32]));

    for _ in 0..blocks {
        let event = feeder.next_block(services.blocks.as_ref())?;
        node.submit(event).await?;
    }
    node.sync().await?;
    info!(blocks, tip = ?node.tip(), "devnet blocks applied");
    Ok(())
}
