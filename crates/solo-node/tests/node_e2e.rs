//! End-to-end tests for the development node.

use solo_consensus::{EngineState, Transaction};
use solo_node::{Node, NodeConfig};
use solo_program::{Address, KeyPair};
use std::io::Write;
use std::time::Duration;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

fn dev_config() -> NodeConfig {
    let file = write_config(
        r#"
leader:
  dev_seed: 1
engine:
  block_interval_ms: 100
  replay_window: 4
"#,
    );
    NodeConfig::load(file.path()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_node_produces_blocks_and_prunes_pool() {
    let node = Node::launch(&dev_config()).await.unwrap();

    let sender = KeyPair::from_seed(77);
    let tx = Transaction::transfer(
        Address::from_public_key(&sender.public_key()),
        Address::from_bytes([2; 20]),
        10,
        1,
        1,
    )
    .sign(&sender);
    let id = node.pool().submit(tx, 0).unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;

    let block = node.ledger().block_at(1).unwrap();
    assert_eq!(block.tx_count(), 2);
    assert_eq!(node.ledger().transaction_height(&id), Some(1));
    assert!(node.pool().is_empty());

    tokio::time::sleep(Duration::from_millis(500)).await;
    let status = node.handle().status().await.unwrap();
    assert_eq!(status.state, EngineState::Running);
    assert_eq!(status.replay_range, (3, 7));

    node.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_backlog_drains_with_small_window() {
    let file = write_config(
        r#"
leader:
  dev_seed: 1
engine:
  block_interval_ms: 100
  replay_window: 2
  max_txs_per_block: 1
"#,
    );
    let node = Node::launch(&NodeConfig::load(file.path()).unwrap())
        .await
        .unwrap();

    let ids: Vec<_> = (1..=5)
        .map(|seed| {
            let sender = KeyPair::from_seed(100 + seed);
            let tx = Transaction::transfer(
                Address::from_public_key(&sender.public_key()),
                Address::from_bytes([3; 20]),
                seed,
                seed,
                1,
            )
            .sign(&sender);
            node.pool().submit(tx, 0).unwrap()
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(1050)).await;

    assert_eq!(node.ledger().height(), 10);
    for (position, id) in ids.iter().enumerate() {
        assert_eq!(
            node.ledger().transaction_height(id),
            Some(position as u32 + 1)
        );
    }
    assert!(node.pool().is_empty());

    node.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_node_shutdown_stops_production() {
    let node = Node::launch(&dev_config()).await.unwrap();
    let handle = node.handle().clone();
    let ledger = node.ledger().clone();

    tokio::time::sleep(Duration::from_millis(250)).await;
    node.shutdown().await.unwrap();
    let height = ledger.height();
    assert_eq!(height, 2);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ledger.height(), height);
    assert!(handle.status().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_leader_identity_from_config() {
    let node = Node::launch(&dev_config()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let block = node.ledger().block_at(1).unwrap();
    assert_eq!(
        block.header.bookkeepers,
        vec![KeyPair::from_seed(1).public_key()]
    );
    node.shutdown().await.unwrap();
}

#[test]
fn test_sample_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/devnet.yaml");
    let config = NodeConfig::load(path).unwrap();
    assert_eq!(config.leader.dev_seed, Some(1));
    assert_eq!(config, {
        let mut expected = NodeConfig::default();
        expected.leader.dev_seed = Some(1);
        expected
    });
}
