//! Ed25519 key material and content addresses.

use crate::builder::{encode_multi_key_program, encode_single_key_program};
use crate::error::{ProgramError, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Serialized length of a public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Serialized length of a signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of an account address.
pub const ADDRESS_LENGTH: usize = 20;

/// An Ed25519 public key.
///
/// Keys order by their serialized bytes, which is the canonical sort used
/// when building multi-key programs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    /// Deserializes a public key, rejecting wrong lengths and invalid points.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            ProgramError::KeyDeserializationFailed(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        ed25519_consensus::VerificationKey::try_from(arr)
            .map_err(|e| ProgramError::KeyDeserializationFailed(e.to_string()))?;
        Ok(Self(arr))
    }

    /// Returns the canonical serialization.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a public key from hex.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| ProgramError::KeyDeserializationFailed(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Verifies `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = ed25519_consensus::VerificationKey::try_from(self.0) else {
            return false;
        };
        let sig = ed25519_consensus::Signature::from(signature.0);
        key.verify(&sig, message).is_ok()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for PublicKey {
    type Error = ProgramError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_hex()
    }
}

/// An Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    /// Creates a signature from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl TryFrom<String> for Signature {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        hex::decode_to_slice(value, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl From<Signature> for String {
    fn from(sig: Signature) -> Self {
        sig.to_hex()
    }
}

/// An Ed25519 signing key.
#[derive(Clone)]
pub struct KeyPair {
    signing: ed25519_consensus::SigningKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        Self::from_signing_key(ed25519_consensus::SigningKey::new(rand::thread_rng()))
    }

    /// Derives a deterministic key pair from a numeric seed.
    ///
    /// Only suitable for tests and development networks.
    pub fn from_seed(seed: u64) -> Self {
        Self::from_signing_key(ed25519_consensus::SigningKey::new(StdRng::seed_from_u64(
            seed,
        )))
    }

    /// Creates a key pair from a 32-byte secret.
    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        Self::from_signing_key(ed25519_consensus::SigningKey::from(secret))
    }

    fn from_signing_key(signing: ed25519_consensus::SigningKey) -> Self {
        let public = PublicKey(signing.verification_key().to_bytes());
        Self { signing, public }
    }

    /// Returns the public key.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Signs a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// A content address derived from an authorization program.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// Creates an address from raw bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Derives the address of a serialized program.
    pub fn from_program(program: &[u8]) -> Self {
        let digest = Sha256::digest(program);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[..ADDRESS_LENGTH]);
        Self(bytes)
    }

    /// Derives the address of a single key's program.
    pub fn from_public_key(key: &PublicKey) -> Self {
        Self::from_program(&encode_single_key_program(key))
    }

    /// Derives the address controlled by a set of bookkeepers.
    ///
    /// More than one key yields a multi-key program requiring
    /// `n - (n - 1) / 3` signatures.
    pub fn from_bookkeepers(keys: &[PublicKey]) -> Result<Self> {
        match keys {
            [] => Err(ProgramError::InvalidMultiSigParam { m: 0, n: 0 }),
            [key] => Ok(Self::from_public_key(key)),
            _ => {
                let n = keys.len();
                let m = n - (n - 1) / 3;
                Ok(Self::from_program(&encode_multi_key_program(keys, m)?))
            }
        }
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
