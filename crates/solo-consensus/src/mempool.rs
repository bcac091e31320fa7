//! Transaction mempool for pending transactions.
//!
//! The mempool holds transactions that have been submitted but not yet
//! included in a committed block. Each entry remembers the chain height it
//! was last verified at; entries verified before the height a proposal asks
//! for are re-verified before being offered.

use crate::block::Block;
use crate::error::{ConsensusError, Result};
use crate::service::TransactionPool;
use crate::transaction::{Transaction, TransactionId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for the mempool.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the mempool.
    pub max_transactions: usize,

    /// Maximum transaction age before eviction.
    pub max_transaction_age: Duration,

    /// Maximum transactions per block proposal.
    pub max_transactions_per_block: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
            max_transaction_age: Duration::from_secs(600), // 10 minutes
            max_transactions_per_block: 1000,
        }
    }
}

/// Metadata about a pending transaction.
#[derive(Debug, Clone)]
struct PendingTransaction {
    /// The transaction.
    transaction: Transaction,

    /// When the transaction was added.
    added_at: Instant,

    /// Chain height the transaction was last verified at.
    verified_height: u32,
}

/// The transaction mempool.
pub struct Mempool {
    /// Configuration.
    config: MempoolConfig,

    /// Pending transactions indexed by ID.
    transactions: RwLock<HashMap<TransactionId, PendingTransaction>>,

    /// Order of transaction arrival.
    order: RwLock<VecDeque<TransactionId>>,
}

impl Mempool {
    /// Creates a new mempool with the given configuration.
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            transactions: RwLock::new(HashMap::new()),
            order: RwLock::new(VecDeque::new()),
        }
    }

    /// Creates a new mempool with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MempoolConfig::default())
    }

    /// Verifies a transaction's witnesses and adds it as verified at
    /// `height`.
    pub fn submit(&self, transaction: Transaction, height: u32) -> Result<TransactionId> {
        transaction.verify()?;
        self.add(transaction, height)
    }

    /// Adds an already verified transaction.
    pub fn add(&self, transaction: Transaction, verified_height: u32) -> Result<TransactionId> {
        let id = transaction.id();

        let mut txs = self.transactions.write();
        let mut order = self.order.write();

        if txs.contains_key(&id) {
            return Err(ConsensusError::DuplicateTransaction(id.to_hex()));
        }

        // Evict oldest transactions if at capacity
        while txs.len() >= self.config.max_transactions {
            if let Some(old_id) = order.pop_front() {
                txs.remove(&old_id);
                tracing::debug!(%old_id, "evicted transaction due to mempool capacity");
            } else {
                break;
            }
        }

        let pending = PendingTransaction {
            transaction,
            added_at: Instant::now(),
            verified_height,
        };

        txs.insert(id, pending);
        order.push_back(id);

        tracing::trace!(%id, verified_height, "added transaction to mempool");

        Ok(id)
    }

    /// Gets a transaction by ID.
    pub fn get(&self, id: &TransactionId) -> Option<Transaction> {
        self.transactions
            .read()
            .get(id)
            .map(|p| p.transaction.clone())
    }

    /// Checks if a transaction exists in the mempool.
    pub fn contains(&self, id: &TransactionId) -> bool {
        self.transactions.read().contains_key(id)
    }

    /// Returns the number of pending transactions.
    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    /// Returns true if the mempool is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }

    /// Removes a transaction from the mempool.
    pub fn remove(&self, id: &TransactionId) -> Option<Transaction> {
        let mut txs = self.transactions.write();
        let mut order = self.order.write();

        let pending = txs.remove(id)?;
        order.retain(|tx_id| tx_id != id);
        Some(pending.transaction)
    }

    /// Removes multiple transactions from the mempool.
    pub fn remove_batch(&self, ids: &[TransactionId]) -> usize {
        let mut txs = self.transactions.write();
        let mut order = self.order.write();

        let removed = ids.iter().filter(|id| txs.remove(*id).is_some()).count();
        let ids: HashSet<_> = ids.iter().collect();
        order.retain(|tx_id| !ids.contains(tx_id));

        tracing::debug!(removed, "removed batch from mempool");
        removed
    }

    /// Drops every transaction included in a committed block.
    pub fn remove_committed(&self, block: &Block) -> usize {
        let ids: Vec<_> = block.transaction_ids().collect();
        self.remove_batch(&ids)
    }

    /// Gets transactions for a block proposal.
    ///
    /// Expired entries are skipped. Entries verified before `min_height`
    /// are re-verified first; those that fail are dropped. At most
    /// `max_transactions_per_block` are returned, by descending gas price
    /// when `by_priority` is set (ties keep arrival order) and in arrival
    /// order otherwise.
    pub fn take_candidates(&self, by_priority: bool, min_height: u32) -> Vec<Transaction> {
        let now = Instant::now();
        let mut txs = self.transactions.write();
        let mut order = self.order.write();

        let mut ready = Vec::new();
        let mut rejected = Vec::new();

        for id in order.iter() {
            let Some(pending) = txs.get_mut(id) else {
                continue;
            };

            if now.duration_since(pending.added_at) > self.config.max_transaction_age {
                continue;
            }

            if pending.verified_height < min_height {
                if let Err(error) = pending.transaction.verify() {
                    tracing::debug!(
                        %id,
                        %error,
                        "dropping transaction that failed re-verification"
                    );
                    rejected.push(*id);
                    continue;
                }
                pending.verified_height = min_height;
            }

            ready.push(*id);
        }

        for id in &rejected {
            txs.remove(id);
        }
        if !rejected.is_empty() {
            order.retain(|id| txs.contains_key(id));
        }

        if by_priority {
            ready.sort_by_key(|id| std::cmp::Reverse(txs[id].transaction.gas_price));
        }
        ready.truncate(self.config.max_transactions_per_block);

        ready
            .iter()
            .filter_map(|id| txs.get(id))
            .map(|pending| pending.transaction.clone())
            .collect()
    }

    /// Checks transactions for valid witnesses and against pending entries.
    pub fn check_pending(
        &self,
        transactions: &[Transaction],
    ) -> std::result::Result<(), Vec<(TransactionId, ConsensusError)>> {
        let txs = self.transactions.read();
        let mut seen = HashSet::new();
        let mut errors = Vec::new();

        for tx in transactions {
            let id = tx.id();
            if txs.contains_key(&id) || !seen.insert(id) {
                errors.push((id, ConsensusError::DuplicateTransaction(id.to_hex())));
                continue;
            }
            if let Err(error) = tx.verify() {
                errors.push((id, error));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Reaps expired transactions from the mempool.
    pub fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let mut txs = self.transactions.write();
        let mut order = self.order.write();

        let initial_len = txs.len();
        txs.retain(|_, pending| {
            now.duration_since(pending.added_at) <= self.config.max_transaction_age
        });
        order.retain(|id| txs.contains_key(id));

        let removed = initial_len - txs.len();
        if removed > 0 {
            tracing::debug!(removed, "reaped expired transactions");
        }

        removed
    }

    /// Returns statistics about the mempool.
    pub fn stats(&self) -> MempoolStats {
        let txs = self.transactions.read();
        let now = Instant::now();

        let oldest_age = txs
            .values()
            .map(|pending| now.duration_since(pending.added_at))
            .max()
            .unwrap_or_default();

        MempoolStats {
            transaction_count: txs.len(),
            oldest_transaction_age: oldest_age,
        }
    }
}

#[async_trait]
impl TransactionPool for Mempool {
    async fn candidates(&self, by_priority: bool, min_height: u32) -> Result<Vec<Transaction>> {
        Ok(self.take_candidates(by_priority, min_height))
    }

    async fn verify_against_pending(
        &self,
        transactions: &[Transaction],
        height: u32,
    ) -> std::result::Result<(), Vec<(TransactionId, ConsensusError)>> {
        tracing::trace!(count = transactions.len(), height, "verifying against pending");
        self.check_pending(transactions)
    }
}

/// Statistics about the mempool.
#[derive(Debug, Clone)]
pub struct MempoolStats {
    /// Number of pending transactions.
    pub transaction_count: usize,

    /// Age of the oldest transaction.
    pub oldest_transaction_age: Duration,
}
