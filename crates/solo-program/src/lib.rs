//! Solo Authorization Programs
//!
//! Accounts are controlled by an *authorization program*: a short script in
//! a restricted stack-machine instruction set that names the keys allowed to
//! sign and how many of them must. The serialized program is the account's
//! identity, since its [`Address`] is derived from the program bytes, so
//! encoding is canonical and decoding is strict.
//!
//! # Program shapes
//!
//! ```text
//! single key:  PUSH(pubkey) CHECKSIG
//! m-of-n:      PUSHNUM(m) PUSH(key_1) .. PUSH(key_n) PUSHNUM(n) CHECKMULTISIG
//! parameters:  PUSH(sig_1) .. PUSH(sig_k)
//! ```
//!
//! Multi-key programs always list their keys in ascending byte order, so the
//! same key set and threshold produce identical bytes regardless of input
//! order.
//!
//! # Example
//!
//! ```
//! use solo_program::{decode_program_info, encode_multi_key_program, KeyPair};
//!
//! let keys: Vec<_> = (0..3).map(|i| KeyPair::from_seed(i).public_key()).collect();
//! let program = encode_multi_key_program(&keys, 2).unwrap();
//! let info = decode_program_info(&program).unwrap();
//! assert_eq!(info.threshold, 2);
//! assert_eq!(info.pubkeys.len(), 3);
//! ```

mod builder;
mod error;
mod keys;
mod opcode;
mod parser;
mod witness;

pub use builder::{
    encode_multi_key_program, encode_parameter_program, encode_single_key_program,
    ProgramBuilder,
};
pub use error::{ProgramError, Result};
pub use keys::{
    Address, KeyPair, PublicKey, Signature, ADDRESS_LENGTH, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH,
};
pub use opcode::{OpCode, MAX_INLINE_PUSH};
pub use parser::{decode_parameter_list, decode_program_info, ProgramInfo, ProgramParser};
pub use witness::{sign_witness, verify_witness, SignatureSet, Witness};

/// Maximum number of keys in a multi-key program.
pub const MAX_MULTISIG_KEYS: usize = 16;
