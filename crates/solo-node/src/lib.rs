//! Solo Node
//!
//! A development node that runs the solo consensus engine over the
//! in-memory ledger and mempool.

pub mod config;
pub mod logging;
pub mod node;

pub use config::{ConfigError, NodeConfig};
pub use node::{Node, NodeError};
