//! End-to-end tests for the solo consensus engine.
//!
//! These tests verify:
//! - Block production against an in-memory ledger and pool
//! - Replay filtering of transactions committed in recent blocks
//! - Idempotent start and stop

use solo_consensus::{
    ConsensusEngine, ConsensusEvent, EngineConfig, EngineHandle, EngineState, MemoryLedger,
    LocalSigner, Mempool, Transaction,
};
use solo_program::{Address, KeyPair};
use std::sync::Arc;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_millis(100);

struct Harness {
    handle: EngineHandle,
    ledger: Arc<MemoryLedger>,
    pool: Arc<Mempool>,
}

fn spawn_engine() -> Harness {
    let key = KeyPair::from_seed(42);
    let ledger = Arc::new(MemoryLedger::with_bookkeeper(&key.public_key()));
    let pool = Arc::new(Mempool::with_defaults());
    let config = EngineConfig {
        block_interval: INTERVAL,
        ..Default::default()
    };

    let (engine, handle) = ConsensusEngine::new(
        config,
        ledger.clone(),
        pool.clone(),
        Arc::new(LocalSigner::new(key)),
    );
    tokio::spawn(engine.run());

    Harness {
        handle,
        ledger,
        pool,
    }
}

fn transfer(seed: u64, gas_price: u64) -> Transaction {
    let key = KeyPair::from_seed(seed);
    let from = Address::from_public_key(&key.public_key());
    Transaction::transfer(from, Address::from_bytes([1; 20]), 25, seed, gas_price).sign(&key)
}

#[tokio::test(start_paused = true)]
async fn test_committed_transaction_is_not_reincluded() {
    let h = spawn_engine();
    h.handle.start().await.unwrap();

    // First tick with an empty pool: only the leader transaction.
    tokio::time::sleep(INTERVAL + Duration::from_millis(50)).await;
    let first = h.ledger.block_at(1).expect("block 1 should be committed");
    assert_eq!(first.tx_count(), 1);
    assert_eq!(first.transactions[0].kind(), "book_keeping");
    assert_eq!(h.handle.status().await.unwrap().replay_range, (1, 2));

    // Offer the already committed leader transaction again.
    let replayed = first.transactions[0].clone();
    h.pool.add(replayed.clone(), 1).unwrap();

    tokio::time::sleep(INTERVAL).await;
    let second = h.ledger.block_at(2).expect("block 2 should be committed");
    assert_eq!(second.tx_count(), 1);
    assert_eq!(second.transactions[0].kind(), "book_keeping");
    assert_ne!(second.transactions[0].id(), replayed.id());
    assert_eq!(h.handle.status().await.unwrap().replay_range, (1, 3));
}

#[tokio::test(start_paused = true)]
async fn test_pool_transactions_included_by_price() {
    let h = spawn_engine();
    h.pool.submit(transfer(1, 5), 0).unwrap();
    h.pool.submit(transfer(2, 500), 0).unwrap();
    h.pool.submit(transfer(3, 50), 0).unwrap();

    h.handle.start().await.unwrap();
    tokio::time::sleep(INTERVAL + Duration::from_millis(50)).await;

    let block = h.ledger.block_at(1).unwrap();
    let nonces: Vec<_> = block.transactions[1..].iter().map(|tx| tx.nonce).collect();
    assert_eq!(block.transactions[0].kind(), "book_keeping");
    assert_eq!(nonces, vec![2, 3, 1]);
    assert!(block.verify_tx_root());
}

#[tokio::test(start_paused = true)]
async fn test_block_respects_transaction_limit() {
    let key = KeyPair::from_seed(42);
    let ledger = Arc::new(MemoryLedger::with_bookkeeper(&key.public_key()));
    let pool = Arc::new(Mempool::with_defaults());
    for seed in 1..=5 {
        pool.submit(transfer(seed, 1), 0).unwrap();
    }
    let config = EngineConfig {
        block_interval: INTERVAL,
        max_txs_per_block: 2,
        ..Default::default()
    };
    let (engine, handle) =
        ConsensusEngine::new(config, ledger.clone(), pool, Arc::new(LocalSigner::new(key)));
    tokio::spawn(engine.run());

    handle.start().await.unwrap();
    tokio::time::sleep(INTERVAL + Duration::from_millis(50)).await;

    assert_eq!(ledger.block_at(1).unwrap().tx_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_double_start_arms_one_timer() {
    let h = spawn_engine();
    let mut events = h.handle.subscribe();

    h.handle.start().await.unwrap();
    h.handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1050)).await;

    assert_eq!(h.ledger.height(), 10);
    let status = h.handle.status().await.unwrap();
    assert_eq!(status.state, EngineState::Running);
    assert_eq!(status.blocks_produced, 10);

    let mut transitions = 0;
    let mut produced = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            ConsensusEvent::StateChanged { .. } => transitions += 1,
            ConsensusEvent::BlockProduced { .. } => produced += 1,
            ConsensusEvent::TickFailed { reason } => panic!("unexpected tick failure: {reason}"),
        }
    }
    assert_eq!(transitions, 1);
    assert_eq!(produced, 10);
}

#[tokio::test(start_paused = true)]
async fn test_double_stop_is_noop() {
    let h = spawn_engine();
    let mut events = h.handle.subscribe();

    h.handle.stop().await.unwrap();
    h.handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    h.handle.stop().await.unwrap();
    h.handle.stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(h.ledger.height(), 3);
    let status = h.handle.status().await.unwrap();
    assert_eq!(status.state, EngineState::Idle);
    assert_eq!(status.replay_range, (0, 0));

    let mut transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ConsensusEvent::StateChanged { old, new } = event {
            transitions.push((old, new));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (EngineState::Idle, EngineState::Running),
            (EngineState::Running, EngineState::Idle)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_window_slides_with_chain() {
    let h = spawn_engine();
    h.handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1250)).await;

    // Default window of 10 blocks over a chain of 12.
    assert_eq!(h.ledger.height(), 12);
    assert_eq!(h.handle.status().await.unwrap().replay_range, (3, 13));
}
