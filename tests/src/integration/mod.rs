//! Scenarios driven through [`node_runtime::Node`] over real block files in a
//! temporary data directory.

pub mod lookup_flows;
pub mod restart;

#[cfg(test)]
pub(crate) mod fixtures {
    use std::time::Duration;

    use node_runtime::{DevnetFeeder, Node, NodeConfig, NodeServices};
    use tempfile::TempDir;

    /// One block per file, depth and minimum window of 10, no timer cycles.
    pub fn pruning_config(dir: &TempDir) -> NodeConfig {
        NodeConfig {
            enable_txindex: true,
            enable_pruning: true,
            retention_depth: 10,
            min_blocks_to_keep: 10,
            prune_interval: Duration::from_secs(3600),
            preferred_block_file_size: 1,
            data_dir: dir.path().to_path_buf(),
            ..NodeConfig::default()
        }
    }

    pub fn start(config: NodeConfig) -> Node {
        Node::start(NodeServices::open(config).unwrap()).unwrap()
    }

    /// Feed `blocks` blocks and wait until the index has applied them.
    pub async fn feed(node: &Node, feeder: &mut DevnetFeeder, blocks: u64) {
        for _ in 0..blocks {
            let event = feeder.next_block(node.services().blocks.as_ref()).unwrap();
            node.submit(event).await.unwrap();
        }
        node.sync().await.unwrap();
    }

    pub async fn reorg(node: &Node, feeder: &mut DevnetFeeder, depth: u64) {
        let events = feeder.reorg(node.services().blocks.as_ref(), depth).unwrap();
        for event in events {
            node.submit(event).await.unwrap();
        }
        node.sync().await.unwrap();
    }
}
