//! Solo Consensus Engine
//!
//! A single fixed leader produces every block. On a fixed interval the
//! engine pulls candidate transactions from the pool, drops those committed
//! in the last few blocks, signs a block and hands it to the ledger.
//!
//! # Components
//!
//! - [`ConsensusEngine`]: timer-driven actor that assembles and submits blocks
//! - [`ReplayGuard`]: sliding window of recently committed transaction ids
//! - [`Ledger`], [`TransactionPool`], [`KeySigner`]: collaborators the engine
//!   is built against
//! - [`MemoryLedger`], [`Mempool`], [`LocalSigner`]: in-memory implementations
//!   of those collaborators
//! - [`Block`], [`Transaction`]: the chain data model
//!
//! # Block Production
//!
//! ```text
//! ┌──────────────┐  TimerTick   ┌──────────────┐  candidates  ┌──────────────┐
//! │    Timer     │─────────────▶│    Engine    │◀─────────────│     Pool     │
//! └──────────────┘              │   (actor)    │              └──────────────┘
//!                               └──┬────────▲──┘
//!                       add_block  │        │  BlockCommitted
//!                                  ▼        │
//!                               ┌───────────┴──┐
//!                               │    Ledger    │
//!                               └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use solo_consensus::{ConsensusEngine, EngineConfig, LocalSigner, MemoryLedger, Mempool};
//! use solo_program::KeyPair;
//! use std::sync::Arc;
//!
//! # async fn example() -> solo_consensus::Result<()> {
//! let key = KeyPair::generate();
//! let ledger = Arc::new(MemoryLedger::with_bookkeeper(&key.public_key()));
//! let pool = Arc::new(Mempool::with_defaults());
//! let signer = Arc::new(LocalSigner::new(key));
//!
//! let (engine, handle) = ConsensusEngine::new(EngineConfig::default(), ledger, pool, signer);
//! tokio::spawn(engine.run());
//! handle.start().await?;
//! # Ok(())
//! # }
//! ```

mod block;
mod engine;
mod error;
mod ledger;
mod mempool;
mod replay;
mod service;
mod transaction;

pub use block::{Block, BlockHash, BlockHeader};
pub use engine::{
    ConsensusEngine, ConsensusEvent, EngineConfig, EngineHandle, EngineState, EngineStatus,
    Message,
};
pub use error::{ConsensusError, ReplayError, Result};
pub use ledger::MemoryLedger;
pub use mempool::{Mempool, MempoolConfig, MempoolStats};
pub use replay::{ReplayGuard, DEFAULT_REPLAY_WINDOW, MIN_REPLAY_WINDOW};
pub use service::{
    KeySigner, Ledger, LedgerHandle, LocalSigner, PoolHandle, SignerHandle, TransactionPool,
};
pub use transaction::{Payload, Transaction, TransactionId};
