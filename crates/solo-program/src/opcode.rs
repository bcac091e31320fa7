//! The restricted instruction set used by authorization programs.

use crate::error::{ProgramError, Result};

const PUSH0: u8 = 0x00;
const PUSHBYTES1: u8 = 0x01;
const PUSHBYTES75: u8 = 0x4B;
const PUSHDATA1: u8 = 0x4C;
const PUSHDATA2: u8 = 0x4D;
const PUSHDATA4: u8 = 0x4E;
const PUSH1: u8 = 0x51;
const PUSH16: u8 = 0x60;
const CHECKSIG: u8 = 0xAC;
const CHECKMULTISIG: u8 = 0xAE;

/// Largest payload that fits in a single `PUSHBYTES` opcode.
pub const MAX_INLINE_PUSH: usize = (PUSHBYTES75 - PUSHBYTES1 + 1) as usize;

/// An instruction of the authorization program subset.
///
/// Every byte value outside of this set is rejected by [`OpCode::from_byte`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Pushes the number zero (an empty byte array).
    Push0,
    /// Pushes the next `n` bytes, `1 <= n <= 75`.
    PushBytes(u8),
    /// Pushes data prefixed by a one-byte length.
    PushData1,
    /// Pushes data prefixed by a two-byte little-endian length.
    PushData2,
    /// Pushes data prefixed by a four-byte little-endian length.
    PushData4,
    /// Pushes a small number, `1 <= n <= 16`.
    PushNum(u8),
    /// Checks a single signature against a single key.
    CheckSig,
    /// Checks `m` signatures against `n` keys.
    CheckMultiSig,
}

impl OpCode {
    /// Parses an opcode from its byte value.
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            PUSH0 => Ok(OpCode::Push0),
            PUSHBYTES1..=PUSHBYTES75 => Ok(OpCode::PushBytes(b - PUSHBYTES1 + 1)),
            PUSHDATA1 => Ok(OpCode::PushData1),
            PUSHDATA2 => Ok(OpCode::PushData2),
            PUSHDATA4 => Ok(OpCode::PushData4),
            PUSH1..=PUSH16 => Ok(OpCode::PushNum(b - PUSH1 + 1)),
            CHECKSIG => Ok(OpCode::CheckSig),
            CHECKMULTISIG => Ok(OpCode::CheckMultiSig),
            _ => Err(ProgramError::UnexpectedOpcode(b)),
        }
    }

    /// Returns the byte value of this opcode.
    ///
    /// Out-of-range operands of `PushBytes` and `PushNum` are clamped into
    /// their valid range; the builder never constructs them.
    pub fn to_byte(self) -> u8 {
        match self {
            OpCode::Push0 => PUSH0,
            OpCode::PushBytes(n) => n.clamp(1, MAX_INLINE_PUSH as u8) + PUSHBYTES1 - 1,
            OpCode::PushData1 => PUSHDATA1,
            OpCode::PushData2 => PUSHDATA2,
            OpCode::PushData4 => PUSHDATA4,
            OpCode::PushNum(n) => n.clamp(1, 16) + PUSH1 - 1,
            OpCode::CheckSig => CHECKSIG,
            OpCode::CheckMultiSig => CHECKMULTISIG,
        }
    }

    /// Returns the small number pushed by this opcode, if it is one.
    pub fn small_number(self) -> Option<u8> {
        match self {
            OpCode::Push0 => Some(0),
            OpCode::PushNum(n) => Some(n),
            _ => None,
        }
    }
}
