//! Consensus error types.

use crate::transaction::TransactionId;
use solo_program::ProgramError;
use thiserror::Error;

/// Errors reported by the replay guard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// A block does not extend the retained window.
    #[error("block height discontinuity: expected {expected}, got {got}")]
    Discontinuity {
        /// Height the window expects next.
        expected: u32,
        /// Height of the offered block.
        got: u32,
    },

    /// The requested start height is older than the retained window.
    #[error("start height {start} is below the window base {base}")]
    StaleStartHeight {
        /// Requested start height.
        start: u32,
        /// Oldest retained height.
        base: u32,
    },

    /// The transaction was already committed inside the window.
    #[error("transaction {0} already committed")]
    DuplicateTransaction(TransactionId),
}

/// Errors that can occur during consensus operations.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Authorization program error.
    #[error("program error: {0}")]
    Program(#[from] ProgramError),

    /// Replay guard error.
    #[error("replay guard: {0}")]
    Replay(#[from] ReplayError),

    /// The ledger failed or refused a request.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// The transaction pool failed a request.
    #[error("pool error: {0}")]
    Pool(String),

    /// The leader key could not sign.
    #[error("signing failed: {0}")]
    Signing(String),

    /// A collaborator did not answer in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Block failed validation.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Transaction failed validation.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Transaction is already known.
    #[error("duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// The engine is no longer accepting messages.
    #[error("engine stopped")]
    EngineStopped,
}

/// A specialized Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;
