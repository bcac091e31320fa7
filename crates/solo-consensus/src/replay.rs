//! Sliding-window duplicate transaction guard.
//!
//! The guard keeps the transaction ids of the last few committed blocks so
//! block assembly can drop candidates that were just committed without a
//! full ledger lookup. Anything older than the window is the pool's
//! responsibility.

use crate::block::Block;
use crate::error::ReplayError;
use crate::transaction::{Transaction, TransactionId};
use std::collections::{HashSet, VecDeque};
use tracing::error;

/// Default number of blocks retained.
pub const DEFAULT_REPLAY_WINDOW: usize = 10;

/// Window size used when zero is requested.
pub const MIN_REPLAY_WINDOW: usize = 2;

/// Transaction ids of recently committed blocks.
///
/// Invariant: `base_height + blocks.len()` is the next height the window
/// accepts.
#[derive(Debug, Clone)]
pub struct ReplayGuard {
    max_blocks: usize,
    base_height: u32,
    blocks: VecDeque<HashSet<TransactionId>>,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_WINDOW)
    }
}

impl ReplayGuard {
    /// Creates an empty guard retaining up to `max_blocks` blocks.
    pub fn new(max_blocks: usize) -> Self {
        let max_blocks = if max_blocks == 0 {
            MIN_REPLAY_WINDOW
        } else {
            max_blocks
        };
        Self {
            max_blocks,
            base_height: 0,
            blocks: VecDeque::with_capacity(max_blocks),
        }
    }

    /// Returns the half-open height range `(start, end)` covered.
    pub fn block_range(&self) -> (u32, u32) {
        (self.base_height, self.next_height())
    }

    /// Returns the configured window size.
    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }

    /// Returns the number of retained blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if no block is retained.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn next_height(&self) -> u32 {
        self.base_height.saturating_add(self.blocks.len() as u32)
    }

    /// Records a committed block.
    ///
    /// A block that does not extend the window is reported and ignored.
    pub fn add_block(&mut self, block: &Block) -> Result<(), ReplayError> {
        let height = block.height();
        if self.blocks.is_empty() {
            self.base_height = height;
        }

        let expected = self.next_height();
        if height != expected {
            error!(expected, got = height, "replay window discontinuity");
            return Err(ReplayError::Discontinuity {
                expected,
                got: height,
            });
        }

        if self.blocks.len() >= self.max_blocks {
            self.blocks.pop_front();
            self.base_height += 1;
        }
        self.blocks.push_back(block.transaction_ids().collect());
        Ok(())
    }

    /// Checks that `tx` was not committed at or after `start_height`.
    pub fn verify(&self, tx: &Transaction, start_height: u32) -> Result<(), ReplayError> {
        self.verify_id(&tx.id(), start_height)
    }

    /// Checks that the transaction `id` was not committed at or after
    /// `start_height`.
    pub fn verify_id(&self, id: &TransactionId, start_height: u32) -> Result<(), ReplayError> {
        if start_height < self.base_height {
            return Err(ReplayError::StaleStartHeight {
                start: start_height,
                base: self.base_height,
            });
        }

        let skip = (start_height - self.base_height) as usize;
        if self.blocks.iter().skip(skip).any(|ids| ids.contains(id)) {
            return Err(ReplayError::DuplicateTransaction(*id));
        }
        Ok(())
    }

    /// Empties the window.
    pub fn clean(&mut self) {
        self.blocks.clear();
        self.base_height = 0;
    }
}
