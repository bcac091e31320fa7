//! Program construction.

use crate::error::{ProgramError, Result};
use crate::keys::PublicKey;
use crate::opcode::{OpCode, MAX_INLINE_PUSH};
use crate::MAX_MULTISIG_KEYS;
use bytes::{BufMut, BytesMut};

/// Incrementally assembles a program.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    buf: BytesMut,
}

impl ProgramBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a bare opcode.
    pub fn push_opcode(&mut self, op: OpCode) -> &mut Self {
        self.buf.put_u8(op.to_byte());
        self
    }

    /// Appends a data push using the shortest encoding for its length.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<&mut Self> {
        if data.is_empty() {
            return Err(ProgramError::EmptyPushOperand);
        }

        let len = data.len();
        if len <= MAX_INLINE_PUSH {
            self.buf.put_u8(OpCode::PushBytes(len as u8).to_byte());
        } else if len < 0x100 {
            self.buf.put_u8(OpCode::PushData1.to_byte());
            self.buf.put_u8(len as u8);
        } else if len < 0x10000 {
            self.buf.put_u8(OpCode::PushData2.to_byte());
            self.buf.put_u16_le(len as u16);
        } else {
            let len = u32::try_from(len).map_err(|_| ProgramError::MalformedProgram)?;
            self.buf.put_u8(OpCode::PushData4.to_byte());
            self.buf.put_u32_le(len);
        }
        self.buf.put_slice(data);

        Ok(self)
    }

    /// Appends a number, as a small-number opcode when it fits.
    pub fn push_num(&mut self, num: u64) -> &mut Self {
        match num {
            0 => self.push_opcode(OpCode::Push0),
            1..=16 => self.push_opcode(OpCode::PushNum(num as u8)),
            _ => {
                let encoded = encode_signed_le(num);
                self.buf.put_u8(OpCode::PushBytes(encoded.len() as u8).to_byte());
                self.buf.put_slice(&encoded);
                self
            }
        }
    }

    /// Appends a public key's canonical serialization.
    pub fn push_pubkey(&mut self, key: &PublicKey) -> &mut Self {
        // A serialized key is never empty.
        self.buf.put_u8(OpCode::PushBytes(key.as_bytes().len() as u8).to_byte());
        self.buf.put_slice(key.as_bytes());
        self
    }

    /// Returns the assembled program.
    pub fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Minimal two's-complement little-endian encoding of a non-negative number.
///
/// A sign byte is appended when the top bit of the last byte is set.
pub(crate) fn encode_signed_le(num: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    let mut n = num;
    while n > 0 {
        out.push((n & 0xFF) as u8);
        n >>= 8;
    }
    if out.last().is_some_and(|b| b & 0x80 != 0) {
        out.push(0);
    }
    out
}

/// Builds the program of a single-key account.
pub fn encode_single_key_program(key: &PublicKey) -> Vec<u8> {
    let mut builder = ProgramBuilder::new();
    builder.push_pubkey(key).push_opcode(OpCode::CheckSig);
    builder.finish()
}

/// Builds the program of an `m`-of-`n` multi-key account.
///
/// Keys are sorted so that the same set always encodes to the same bytes.
/// Repeated keys are rejected.
pub fn encode_multi_key_program(keys: &[PublicKey], m: usize) -> Result<Vec<u8>> {
    let n = keys.len();
    if !(1 <= m && m <= n && n > 1 && n <= MAX_MULTISIG_KEYS) {
        return Err(ProgramError::InvalidMultiSigParam {
            m: m as i64,
            n: n as i64,
        });
    }

    let mut sorted = keys.to_vec();
    sorted.sort();
    if sorted.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(ProgramError::InvalidMultiSigParam {
            m: m as i64,
            n: n as i64,
        });
    }

    let mut builder = ProgramBuilder::new();
    builder.push_num(m as u64);
    for key in &sorted {
        builder.push_pubkey(key);
    }
    builder.push_num(n as u64).push_opcode(OpCode::CheckMultiSig);

    Ok(builder.finish())
}

/// Builds a parameter program pushing each signature in order.
pub fn encode_parameter_program<S: AsRef<[u8]>>(signatures: &[S]) -> Result<Vec<u8>> {
    let mut builder = ProgramBuilder::new();
    for sig in signatures {
        builder.push_bytes(sig.as_ref())?;
    }
    Ok(builder.finish())
}
