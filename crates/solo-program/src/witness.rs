//! Transaction witnesses and their verification.

use crate::builder::{
    encode_multi_key_program, encode_parameter_program, encode_single_key_program,
};
use crate::error::{ProgramError, Result};
use crate::keys::{Address, KeyPair, PublicKey, Signature};
use crate::parser::{decode_parameter_list, decode_program_info};
use serde::{Deserialize, Serialize};

/// The on-chain form of an authorization: a parameter program supplying
/// signatures and the program they must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Parameter program pushing the signatures.
    pub invocation: Vec<u8>,
    /// Authorization program naming the keys and threshold.
    pub verification: Vec<u8>,
}

impl Witness {
    /// Decodes both programs.
    pub fn decode(&self) -> Result<SignatureSet> {
        let signatures = decode_parameter_list(&self.invocation)?;
        let info = decode_program_info(&self.verification)?;
        Ok(SignatureSet {
            signatures,
            pubkeys: info.pubkeys,
            threshold: info.threshold,
        })
    }

    /// Returns the address this witness authorizes.
    pub fn address(&self) -> Address {
        Address::from_program(&self.verification)
    }
}

/// The decoded form of a [`Witness`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSet {
    /// Raw signatures, in supplied order.
    pub signatures: Vec<Vec<u8>>,
    /// Authorized keys.
    pub pubkeys: Vec<PublicKey>,
    /// Signatures required.
    pub threshold: u16,
}

impl SignatureSet {
    /// Encodes this set back into a witness.
    pub fn to_witness(&self) -> Result<Witness> {
        let verification = match self.pubkeys.as_slice() {
            [] => {
                return Err(ProgramError::InvalidMultiSigParam {
                    m: self.threshold as i64,
                    n: 0,
                })
            }
            [key] if self.threshold == 1 => encode_single_key_program(key),
            [_] => {
                return Err(ProgramError::InvalidMultiSigParam {
                    m: self.threshold as i64,
                    n: 1,
                })
            }
            keys => encode_multi_key_program(keys, self.threshold as usize)?,
        };
        Ok(Witness {
            invocation: encode_parameter_program(&self.signatures)?,
            verification,
        })
    }
}

/// Builds a single-key witness by signing `message`.
pub fn sign_witness(key: &KeyPair, message: &[u8]) -> Witness {
    let sig = key.sign(message);
    Witness {
        // A signature is never empty, so the push cannot fail.
        invocation: encode_parameter_program(&[sig.as_bytes()]).unwrap_or_default(),
        verification: encode_single_key_program(&key.public_key()),
    }
}

/// Verifies that `witness` authorizes `message`.
///
/// Any decoding failure denies authorization. Every supplied signature must
/// match a distinct key, and at least `threshold` must be supplied.
pub fn verify_witness(message: &[u8], witness: &Witness) -> Result<()> {
    let set = witness.decode()?;
    let need = set.threshold as usize;
    if set.signatures.len() < need {
        return Err(ProgramError::InsufficientSignatures {
            have: set.signatures.len(),
            need,
        });
    }

    let mut used = vec![false; set.pubkeys.len()];
    for raw in &set.signatures {
        let sig = Signature::from_bytes(raw).ok_or(ProgramError::SignatureMismatch)?;
        let slot = set
            .pubkeys
            .iter()
            .enumerate()
            .position(|(i, key)| !used[i] && key.verify(message, &sig))
            .ok_or(ProgramError::SignatureMismatch)?;
        used[slot] = true;
    }

    Ok(())
}
