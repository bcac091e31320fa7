//! In-memory ledger.
//!
//! Keeps the whole chain in memory and validates every block before
//! committing it. Committed blocks are broadcast to subscribers.

use crate::block::{Block, BlockHash};
use crate::error::{ConsensusError, Result};
use crate::service::Ledger;
use crate::transaction::TransactionId;
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use solo_program::PublicKey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the commit notification channel.
const COMMIT_CHANNEL_CAPACITY: usize = 256;

/// Chain contents guarded by a single lock.
#[derive(Debug)]
struct ChainState {
    /// Blocks by height.
    blocks: Vec<Arc<Block>>,

    /// State root after each block.
    state_roots: Vec<[u8; 32]>,

    /// Height each committed transaction was included at.
    committed: HashMap<TransactionId, u32>,
}

impl ChainState {
    fn head(&self) -> &Arc<Block> {
        // The genesis block is inserted on construction and never removed.
        &self.blocks[self.blocks.len() - 1]
    }

    fn head_state_root(&self) -> [u8; 32] {
        self.state_roots[self.state_roots.len() - 1]
    }

    fn state_root_after(&self, height: u32, tx_root: &[u8; 32]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.head_state_root());
        hasher.update(height.to_be_bytes());
        hasher.update(tx_root);
        hasher.finalize().into()
    }
}

/// A ledger that keeps every block in memory.
pub struct MemoryLedger {
    chain: RwLock<ChainState>,
    commits: broadcast::Sender<Arc<Block>>,
}

impl MemoryLedger {
    /// Creates a ledger starting from `genesis`.
    pub fn new(genesis: Block) -> Self {
        let state_root = genesis.header.state_root;
        let (commits, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
        Self {
            chain: RwLock::new(ChainState {
                blocks: vec![Arc::new(genesis)],
                state_roots: vec![state_root],
                committed: HashMap::new(),
            }),
            commits,
        }
    }

    /// Creates a ledger whose genesis names `bookkeeper` as the producer.
    pub fn with_bookkeeper(bookkeeper: &PublicKey) -> Self {
        Self::new(Block::genesis(bookkeeper))
    }

    /// Returns the current head height.
    pub fn height(&self) -> u32 {
        self.chain.read().head().height()
    }

    /// Returns the head block.
    pub fn head(&self) -> Arc<Block> {
        self.chain.read().head().clone()
    }

    /// Returns the block at `height`.
    pub fn block_at(&self, height: u32) -> Option<Arc<Block>> {
        self.chain.read().blocks.get(height as usize).cloned()
    }

    /// Returns the height a transaction was committed at.
    pub fn transaction_height(&self, id: &TransactionId) -> Option<u32> {
        self.chain.read().committed.get(id).copied()
    }

    /// Validates `block` against the head and commits it.
    pub fn commit(&self, block: Block) -> Result<Arc<Block>> {
        let mut chain = self.chain.write();
        let head = chain.head().clone();
        let height = block.height();

        if height != head.height() + 1 {
            return Err(ConsensusError::InvalidBlock(format!(
                "expected height {}, got {}",
                head.height() + 1,
                height
            )));
        }

        if block.header.prev_hash != head.hash() {
            return Err(ConsensusError::InvalidBlock(format!(
                "block {} does not extend head {}",
                height,
                head.hash()
            )));
        }

        if !block.verify_tx_root() {
            return Err(ConsensusError::InvalidBlock(format!(
                "block {} transaction root mismatch",
                height
            )));
        }

        let state_root = chain.state_root_after(height, &block.header.tx_root);
        if block.header.state_root != state_root {
            return Err(ConsensusError::InvalidBlock(format!(
                "block {} state root mismatch",
                height
            )));
        }

        if block.bookkeeper_address()? != head.header.next_bookkeeper {
            return Err(ConsensusError::InvalidBlock(format!(
                "block {} produced by an unauthorized bookkeeper",
                height
            )));
        }
        block.verify_leader_signature()?;

        let mut seen = HashSet::with_capacity(block.tx_count());
        for tx in &block.transactions {
            let id = tx.id();
            if !seen.insert(id) {
                return Err(ConsensusError::InvalidBlock(format!(
                    "block {} repeats transaction {}",
                    height, id
                )));
            }
            if let Some(at) = chain.committed.get(&id) {
                return Err(ConsensusError::DuplicateTransaction(format!(
                    "{} already committed at height {}",
                    id, at
                )));
            }
            tx.verify()?;
        }

        let block = Arc::new(block);
        chain.committed.extend(seen.into_iter().map(|id| (id, height)));
        chain.blocks.push(block.clone());
        chain.state_roots.push(state_root);
        drop(chain);

        tracing::info!(
            height,
            block_hash = %block.hash(),
            tx_count = block.tx_count(),
            "committed block"
        );

        // No subscribers is not an error.
        let _ = self.commits.send(block.clone());
        Ok(block)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn current_height(&self) -> Result<u32> {
        Ok(self.height())
    }

    async fn current_block_hash(&self) -> Result<BlockHash> {
        Ok(self.head().hash())
    }

    async fn state_root_after(&self, height: u32, tx_root: [u8; 32]) -> Result<[u8; 32]> {
        Ok(self.chain.read().state_root_after(height, &tx_root))
    }

    async fn add_block(&self, block: Block) -> Result<()> {
        self.commit(block).map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<Block>> {
        self.commits.subscribe()
    }
}
