//! Block structure.
//!
//! The block hash covers the unsigned header only. Bookkeeper keys,
//! signatures and the bookkeeper program are attached after hashing so the
//! leader can sign the hash.

use crate::error::{ConsensusError, Result};
use crate::transaction::{Transaction, TransactionId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use solo_program::{
    decode_program_info, encode_parameter_program, verify_witness, Address, PublicKey, Signature,
    Witness,
};

/// A unique block identifier (SHA-256 of the unsigned header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// The parent of the genesis block.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Creates a block hash from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Creates a block hash from a hex string.
    pub fn from_hex(hex_str: &str) -> std::result::Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Default for BlockHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A block header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Header format version.
    pub version: u32,

    /// Hash of the previous block.
    pub prev_hash: BlockHash,

    /// Merkle root of the block's transactions.
    pub tx_root: [u8; 32],

    /// State root after applying the block.
    pub state_root: [u8; 32],

    /// Timestamp (unix seconds).
    pub timestamp: u64,

    /// Block height (0 = genesis).
    pub height: u32,

    /// Random value chosen by the producer.
    pub consensus_data: u64,

    /// Address that must produce the next block.
    pub next_bookkeeper: Address,

    /// Keys that signed this block.
    pub bookkeepers: Vec<PublicKey>,

    /// Signatures over the block hash, one per signing bookkeeper.
    pub sig_data: Vec<Signature>,

    /// Authorization program for the bookkeepers.
    pub program: Vec<u8>,
}

/// The hashed portion of a header.
#[derive(Serialize)]
struct UnsignedHeader<'a> {
    version: u32,
    prev_hash: &'a BlockHash,
    tx_root: &'a [u8; 32],
    state_root: &'a [u8; 32],
    timestamp: u64,
    height: u32,
    consensus_data: u64,
    next_bookkeeper: &'a Address,
}

impl BlockHeader {
    /// Current header format version.
    pub const VERSION: u32 = 0;

    /// Computes the block hash from the unsigned fields.
    pub fn hash(&self) -> BlockHash {
        let unsigned = UnsignedHeader {
            version: self.version,
            prev_hash: &self.prev_hash,
            tx_root: &self.tx_root,
            state_root: &self.state_root,
            timestamp: self.timestamp,
            height: self.height,
            consensus_data: self.consensus_data,
            next_bookkeeper: &self.next_bookkeeper,
        };
        let bytes = serde_json::to_vec(&unsigned).expect("header serialization should not fail");
        BlockHash(Sha256::digest(&bytes).into())
    }
}

/// A full block containing header and transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,

    /// Ordered transactions in this block.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Creates the genesis block, naming `bookkeeper` as the first producer.
    pub fn genesis(bookkeeper: &PublicKey) -> Self {
        let header = BlockHeader {
            version: BlockHeader::VERSION,
            prev_hash: BlockHash::ZERO,
            tx_root: [0u8; 32],
            state_root: [0u8; 32],
            timestamp: 0,
            height: 0,
            consensus_data: 0,
            next_bookkeeper: Address::from_public_key(bookkeeper),
            bookkeepers: Vec::new(),
            sig_data: Vec::new(),
            program: Vec::new(),
        };
        Self {
            header,
            transactions: Vec::new(),
        }
    }

    /// Returns the block hash.
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// Returns the block height.
    pub fn height(&self) -> u32 {
        self.header.height
    }

    /// Returns the number of transactions.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Computes the Merkle root of transactions.
    ///
    /// Odd levels duplicate their last node.
    pub fn compute_tx_root(transactions: &[Transaction]) -> [u8; 32] {
        if transactions.is_empty() {
            return [0u8; 32];
        }

        let mut hashes: Vec<[u8; 32]> = transactions
            .iter()
            .map(|tx| *tx.id().as_bytes())
            .collect();

        while hashes.len() > 1 {
            hashes = hashes
                .chunks(2)
                .map(|pair| {
                    let mut hasher = Sha256::new();
                    hasher.update(pair[0]);
                    hasher.update(pair.get(1).unwrap_or(&pair[0]));
                    hasher.finalize().into()
                })
                .collect();
        }

        hashes[0]
    }

    /// Verifies the transaction root matches.
    pub fn verify_tx_root(&self) -> bool {
        Self::compute_tx_root(&self.transactions) == self.header.tx_root
    }

    /// Returns an iterator over transaction IDs.
    pub fn transaction_ids(&self) -> impl Iterator<Item = TransactionId> + '_ {
        self.transactions.iter().map(|tx| tx.id())
    }

    /// Returns the address controlled by this block's bookkeepers.
    pub fn bookkeeper_address(&self) -> Result<Address> {
        Ok(Address::from_bookkeepers(&self.header.bookkeepers)?)
    }

    /// Checks that the header signatures satisfy the bookkeeper program and
    /// that the program names exactly the listed bookkeepers.
    pub fn verify_leader_signature(&self) -> Result<()> {
        let header = &self.header;
        if header.bookkeepers.is_empty() {
            return Err(ConsensusError::InvalidBlock(format!(
                "block {} has no bookkeepers",
                header.height
            )));
        }

        let info = decode_program_info(&header.program)?;
        let mut listed = header.bookkeepers.clone();
        listed.sort();
        if info.pubkeys != listed {
            return Err(ConsensusError::InvalidBlock(format!(
                "block {} program does not match its bookkeepers",
                header.height
            )));
        }

        let signatures: Vec<&[u8]> = header
            .sig_data
            .iter()
            .map(|s| s.as_bytes().as_slice())
            .collect();
        let witness = Witness {
            invocation: encode_parameter_program(&signatures)?,
            verification: header.program.clone(),
        };
        verify_witness(self.hash().as_bytes(), &witness)?;
        Ok(())
    }
}
