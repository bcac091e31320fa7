//! Program codec error types.

use thiserror::Error;

/// Errors that can occur while building, parsing or verifying programs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// A push instruction was given no data.
    #[error("push operand is empty")]
    EmptyPushOperand,

    /// The program ended in the middle of an instruction.
    #[error("unexpected end of program")]
    UnexpectedEof,

    /// Bytes remained after the last expected instruction.
    #[error("expected end of program, {remaining} bytes remain")]
    ExpectedEof {
        /// Number of unconsumed bytes.
        remaining: usize,
    },

    /// A numeric push decoded outside of the accepted range.
    #[error("number not in range (16, 65535]: {0}")]
    NumberOutOfRange(i64),

    /// The program is too short to be meaningful.
    #[error("malformed program")]
    MalformedProgram,

    /// The program does not end in a recognised signature check.
    #[error("unsupported program")]
    UnsupportedProgram,

    /// The declared key count does not match the keys present.
    #[error("key count mismatch: declared {declared}, found {found}")]
    KeyCountMismatch {
        /// Key count claimed by the program.
        declared: i64,
        /// Key count actually present.
        found: usize,
    },

    /// Threshold or key count outside of the multi-signature bounds.
    #[error("invalid multi-sig params: m={m}, n={n}")]
    InvalidMultiSigParam {
        /// Required signatures.
        m: i64,
        /// Number of keys.
        n: i64,
    },

    /// A pushed buffer is not a valid public key.
    #[error("public key deserialization failed: {0}")]
    KeyDeserializationFailed(String),

    /// An opcode outside of the supported subset, or in the wrong position.
    #[error("unexpected opcode: {0:#04x}")]
    UnexpectedOpcode(u8),

    /// Fewer signatures than the program's threshold were supplied.
    #[error("insufficient signatures: have {have}, need {need}")]
    InsufficientSignatures {
        /// Signatures supplied.
        have: usize,
        /// Signatures required.
        need: usize,
    },

    /// The supplied signatures do not satisfy the program.
    #[error("signature verification failed")]
    SignatureMismatch,
}

/// A specialized Result type for program operations.
pub type Result<T> = std::result::Result<T, ProgramError>;
