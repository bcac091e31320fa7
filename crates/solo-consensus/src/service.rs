//! Collaborators consumed by the consensus engine.
//!
//! The engine only talks to the ledger, the transaction pool and the leader
//! key through these traits, so tests and the dev node can plug in their own
//! implementations.

use crate::block::{Block, BlockHash};
use crate::error::{ConsensusError, Result};
use crate::transaction::{Transaction, TransactionId};
use async_trait::async_trait;
use solo_program::{KeyPair, PublicKey, Signature};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Chain state the engine builds on.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Returns the height of the chain head.
    async fn current_height(&self) -> Result<u32>;

    /// Returns the hash of the chain head.
    async fn current_block_hash(&self) -> Result<BlockHash>;

    /// Returns the state root after applying a block at `height` with the
    /// given transaction root on top of the current head.
    async fn state_root_after(&self, height: u32, tx_root: [u8; 32]) -> Result<[u8; 32]>;

    /// Validates and commits a block.
    async fn add_block(&self, block: Block) -> Result<()>;

    /// Subscribes to committed blocks.
    fn subscribe(&self) -> broadcast::Receiver<Arc<Block>>;
}

/// Source of candidate transactions.
#[async_trait]
pub trait TransactionPool: Send + Sync {
    /// Returns candidates verified at or after `min_height`, in priority
    /// order when `by_priority` is set and arrival order otherwise.
    async fn candidates(&self, by_priority: bool, min_height: u32) -> Result<Vec<Transaction>>;

    /// Checks transactions against the pool before they are admitted.
    async fn verify_against_pending(
        &self,
        transactions: &[Transaction],
        height: u32,
    ) -> std::result::Result<(), Vec<(TransactionId, ConsensusError)>>;
}

/// The leader's signing identity.
pub trait KeySigner: Send + Sync {
    /// Returns the leader public key.
    fn public_key(&self) -> PublicKey;

    /// Signs `message`.
    fn sign(&self, message: &[u8]) -> Result<Signature>;
}

/// Shared ledger handle.
pub type LedgerHandle = Arc<dyn Ledger>;

/// Shared pool handle.
pub type PoolHandle = Arc<dyn TransactionPool>;

/// Shared signer handle.
pub type SignerHandle = Arc<dyn KeySigner>;

/// A signer holding its key in memory.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    key: KeyPair,
}

impl LocalSigner {
    /// Wraps a key pair.
    pub fn new(key: KeyPair) -> Self {
        Self { key }
    }
}

impl KeySigner for LocalSigner {
    fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    fn sign(&self, message: &[u8]) -> Result<Signature> {
        Ok(self.key.sign(message))
    }
}
