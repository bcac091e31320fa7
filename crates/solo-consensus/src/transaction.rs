//! Ledger transaction types.
//!
//! A transaction's identity is the hash of its unsigned content, so adding
//! or reordering witnesses never changes its id.

use crate::error::{ConsensusError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use solo_program::{sign_witness, verify_witness, Address, KeyPair, PublicKey, Witness};

/// A unique transaction identifier (SHA-256 of the unsigned transaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId([u8; 32]);

impl TransactionId {
    /// Creates a transaction ID from raw bytes.
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

    /// Creates a transaction ID from a hex string.
    pub fn from_hex(hex_str: &str) -> std::result::Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// What a transaction does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Payload {
    /// Leader reward transaction, one per block.
    BookKeeping {
        /// The block producer.
        producer: PublicKey,
    },

    /// Value transfer between accounts.
    Transfer {
        /// Paying account.
        from: Address,
        /// Receiving account.
        to: Address,
        /// Amount transferred.
        amount: u64,
    },
}

/// A ledger transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// Format version.
    pub version: u8,
    /// Sender-chosen nonce.
    pub nonce: u64,
    /// Price offered per unit of work; higher is included first.
    pub gas_price: u64,
    /// The operation.
    pub payload: Payload,
    /// Authorizations over the transaction id.
    pub witnesses: Vec<Witness>,
}

/// The hashed portion of a transaction.
#[derive(Serialize)]
struct Unsigned<'a> {
    version: u8,
    nonce: u64,
    gas_price: u64,
    payload: &'a Payload,
}

impl Transaction {
    /// Current transaction format version.
    pub const VERSION: u8 = 0;

    /// Creates an unsigned transaction.
    pub fn new(payload: Payload, nonce: u64, gas_price: u64) -> Self {
        Self {
            version: Self::VERSION,
            nonce,
            gas_price,
            payload,
            witnesses: Vec::new(),
        }
    }

    /// Creates an unsigned leader transaction.
    pub fn book_keeping(producer: PublicKey, nonce: u64) -> Self {
        Self::new(Payload::BookKeeping { producer }, nonce, 0)
    }

    /// Creates an unsigned transfer.
    pub fn transfer(from: Address, to: Address, amount: u64, nonce: u64, gas_price: u64) -> Self {
        Self::new(Payload::Transfer { from, to, amount }, nonce, gas_price)
    }

    /// Computes the transaction ID.
    pub fn id(&self) -> TransactionId {
        let unsigned = Unsigned {
            version: self.version,
            nonce: self.nonce,
            gas_price: self.gas_price,
            payload: &self.payload,
        };
        let bytes =
            serde_json::to_vec(&unsigned).expect("transaction serialization should not fail");
        TransactionId(Sha256::digest(&bytes).into())
    }

    /// Appends a single-key witness signed by `key`.
    pub fn sign(mut self, key: &KeyPair) -> Self {
        let witness = sign_witness(key, self.id().as_bytes());
        self.witnesses.push(witness);
        self
    }

    /// Appends a prepared witness.
    pub fn with_witness(mut self, witness: Witness) -> Self {
        self.witnesses.push(witness);
        self
    }

    /// Returns the address that must authorize this transaction.
    pub fn payer(&self) -> Address {
        match &self.payload {
            Payload::BookKeeping { producer } => Address::from_public_key(producer),
            Payload::Transfer { from, .. } => *from,
        }
    }

    /// Checks every witness against the transaction id and requires one of
    /// them to control the paying account.
    ///
    /// Malformed witnesses reject the transaction.
    pub fn verify(&self) -> Result<()> {
        if self.witnesses.is_empty() {
            return Err(ConsensusError::InvalidTransaction(format!(
                "transaction {} carries no witness",
                self.id()
            )));
        }

        let id = self.id();
        for witness in &self.witnesses {
            verify_witness(id.as_bytes(), witness)?;
        }

        let payer = self.payer();
        if !self.witnesses.iter().any(|w| w.address() == payer) {
            return Err(ConsensusError::InvalidTransaction(format!(
                "payer {} did not authorize transaction {}",
                payer, id
            )));
        }

        Ok(())
    }

    /// Returns the transaction kind as a string.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            Payload::BookKeeping { .. } => "book_keeping",
            Payload::Transfer { .. } => "transfer",
        }
    }
}
