//! Node wiring.
//!
//! Builds the in-memory ledger, the mempool and the leader signer, spawns
//! the consensus engine, and prunes the pool whenever a block is committed.

use crate::config::{ConfigError, NodeConfig};
use solo_consensus::{
    Block, ConsensusEngine, ConsensusError, EngineHandle, Ledger, LocalSigner, MemoryLedger,
    Mempool,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors raised while running the node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Consensus error.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// The engine task panicked.
    #[error("engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A running development node.
pub struct Node {
    handle: EngineHandle,
    ledger: Arc<MemoryLedger>,
    pool: Arc<Mempool>,
    engine_task: JoinHandle<()>,
    pruner: JoinHandle<()>,
}

impl Node {
    /// Builds the collaborators, spawns the engine and starts consensus.
    pub async fn launch(config: &NodeConfig) -> Result<Self, NodeError> {
        let key = config.leader_key()?;
        let leader = key.public_key();
        info!(leader = %leader, "leader key loaded");

        let ledger = Arc::new(MemoryLedger::with_bookkeeper(&leader));
        let pool = Arc::new(Mempool::new(config.mempool_config()));
        let signer = Arc::new(LocalSigner::new(key));

        let pruner = tokio::spawn(prune_on_commit(ledger.subscribe(), pool.clone()));

        let (engine, handle) = ConsensusEngine::new(
            config.engine_config(),
            ledger.clone(),
            pool.clone(),
            signer,
        );
        let engine_task = tokio::spawn(engine.run());

        handle.start().await?;

        Ok(Self {
            handle,
            ledger,
            pool,
            engine_task,
            pruner,
        })
    }

    /// Returns the engine handle.
    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Returns the ledger.
    pub fn ledger(&self) -> &Arc<MemoryLedger> {
        &self.ledger
    }

    /// Returns the transaction pool.
    pub fn pool(&self) -> &Arc<Mempool> {
        &self.pool
    }

    /// Stops consensus and waits for the engine to exit.
    pub async fn shutdown(self) -> Result<(), NodeError> {
        self.handle.stop().await?;
        self.handle.shutdown().await?;
        self.engine_task.await?;
        self.pruner.abort();
        info!(height = self.ledger.height(), "node stopped");
        Ok(())
    }
}

/// Removes committed transactions from the pool.
async fn prune_on_commit(mut commits: broadcast::Receiver<Arc<Block>>, pool: Arc<Mempool>) {
    loop {
        match commits.recv().await {
            Ok(block) => {
                let removed = pool.remove_committed(&block);
                let expired = pool.reap_expired();
                let stats = pool.stats();
                debug!(
                    height = block.height(),
                    removed,
                    expired,
                    pending = stats.transaction_count,
                    oldest_age = ?stats.oldest_transaction_age,
                    "pruned mempool"
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "mempool pruner lagged behind commits");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
