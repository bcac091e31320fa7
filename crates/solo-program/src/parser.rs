//! Program parsing.
//!
//! Programs arrive from the network, so every read is bounds-checked and
//! reports a [`ProgramError`] instead of panicking.

use crate::error::{ProgramError, Result};
use crate::keys::PublicKey;
use crate::opcode::OpCode;
use crate::MAX_MULTISIG_KEYS;
use bytes::Buf;
use std::collections::HashSet;

/// The keys and threshold required to authorize an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    /// Public keys, in program order.
    pub pubkeys: Vec<PublicKey>,
    /// Number of signatures required.
    pub threshold: u16,
}

/// A read cursor over a serialized program.
#[derive(Debug, Clone)]
pub struct ProgramParser<'a> {
    buf: &'a [u8],
}

impl<'a> ProgramParser<'a> {
    /// Creates a parser positioned at the start of `program`.
    pub fn new(program: &'a [u8]) -> Self {
        Self { buf: program }
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Returns true when every byte has been consumed.
    pub fn is_eof(&self) -> bool {
        !self.buf.has_remaining()
    }

    /// Fails unless every byte has been consumed.
    pub fn expect_eof(&self) -> Result<()> {
        if self.is_eof() {
            Ok(())
        } else {
            Err(ProgramError::ExpectedEof {
                remaining: self.remaining(),
            })
        }
    }

    fn need(&self, len: usize) -> Result<()> {
        if self.buf.remaining() < len {
            return Err(ProgramError::UnexpectedEof);
        }
        Ok(())
    }

    /// Reads the next opcode.
    pub fn read_opcode(&mut self) -> Result<OpCode> {
        self.need(1)?;
        OpCode::from_byte(self.buf.get_u8())
    }

    /// Returns the next opcode without consuming it.
    pub fn peek_opcode(&self) -> Result<OpCode> {
        match self.buf.first() {
            Some(b) => OpCode::from_byte(*b),
            None => Err(ProgramError::UnexpectedEof),
        }
    }

    /// Reads the payload of a data push.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = match self.read_opcode()? {
            OpCode::PushBytes(n) => n as usize,
            OpCode::PushData1 => {
                self.need(1)?;
                self.buf.get_u8() as usize
            }
            OpCode::PushData2 => {
                self.need(2)?;
                self.buf.get_u16_le() as usize
            }
            OpCode::PushData4 => {
                self.need(4)?;
                self.buf.get_u32_le() as usize
            }
            other => return Err(ProgramError::UnexpectedOpcode(other.to_byte())),
        };

        self.need(len)?;
        let data = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(data)
    }

    /// Reads a number pushed by [`ProgramBuilder::push_num`](crate::ProgramBuilder::push_num).
    ///
    /// Data pushes must decode to a value in `(16, 65535]`; smaller values
    /// have a dedicated opcode and are rejected in long form.
    pub fn read_num(&mut self) -> Result<u16> {
        if let Some(n) = self.peek_opcode()?.small_number() {
            self.read_opcode()?;
            return Ok(n as u16);
        }

        let data = self.read_bytes()?;
        let num = decode_signed_le(&data);
        if num <= 16 || num > u16::MAX as i64 {
            return Err(ProgramError::NumberOutOfRange(num));
        }
        Ok(num as u16)
    }

    /// Reads a pushed public key.
    pub fn read_pubkey(&mut self) -> Result<PublicKey> {
        let data = self.read_bytes()?;
        PublicKey::from_bytes(&data)
    }
}

/// Decodes a two's-complement little-endian number, saturating when it
/// does not fit in an `i64`.
pub(crate) fn decode_signed_le(data: &[u8]) -> i64 {
    let negative = data.last().is_some_and(|b| b & 0x80 != 0);
    if data.len() > 8 {
        return if negative { i64::MIN } else { i64::MAX };
    }
    let mut bytes = if negative { [0xFF; 8] } else { [0u8; 8] };
    bytes[..data.len()].copy_from_slice(data);
    i64::from_le_bytes(bytes)
}

/// Decodes an unsigned big-endian number, saturating at `i64::MAX`.
fn decode_unsigned_be(data: &[u8]) -> i64 {
    let start = data.iter().position(|b| *b != 0).unwrap_or(data.len());
    let significant = &data[start..];
    if significant.len() > 8 {
        return i64::MAX;
    }
    let mut bytes = [0u8; 8];
    bytes[8 - significant.len()..].copy_from_slice(significant);
    i64::try_from(u64::from_be_bytes(bytes)).unwrap_or(i64::MAX)
}

/// Minimal big-endian form of a small number; zero is the empty buffer.
fn small_number_bytes(n: u8) -> Vec<u8> {
    if n == 0 {
        Vec::new()
    } else {
        vec![n]
    }
}

/// Decodes the keys and threshold of a single-key or multi-key program.
pub fn decode_program_info(program: &[u8]) -> Result<ProgramInfo> {
    if program.len() <= 2 {
        return Err(ProgramError::MalformedProgram);
    }

    let (body, last) = program.split_at(program.len() - 1);
    match OpCode::from_byte(last[0]) {
        Ok(OpCode::CheckSig) => {
            let mut parser = ProgramParser::new(body);
            let pubkey = parser.read_pubkey()?;
            parser.expect_eof()?;
            Ok(ProgramInfo {
                pubkeys: vec![pubkey],
                threshold: 1,
            })
        }
        Ok(OpCode::CheckMultiSig) => decode_multi_key_program(program),
        _ => Err(ProgramError::UnsupportedProgram),
    }
}

fn decode_multi_key_program(program: &[u8]) -> Result<ProgramInfo> {
    let mut parser = ProgramParser::new(program);
    let m = parser.read_num()?;

    let mut pubkeys = Vec::new();
    for _ in 0..m {
        pubkeys.push(parser.read_pubkey()?);
    }

    let mut buffers = Vec::new();
    loop {
        let op = parser.peek_opcode()?;
        if op == OpCode::CheckMultiSig {
            parser.read_opcode()?;
            break;
        }
        match op.small_number() {
            Some(n) => {
                parser.read_opcode()?;
                buffers.push(small_number_bytes(n));
            }
            None => buffers.push(parser.read_bytes()?),
        }
    }
    parser.expect_eof()?;

    let Some((count, keys)) = buffers.split_last() else {
        return Err(ProgramError::MalformedProgram);
    };
    let n = decode_unsigned_be(count);

    for key in keys {
        pubkeys.push(PublicKey::from_bytes(key)?);
    }
    if pubkeys.len() as i64 != n {
        return Err(ProgramError::KeyCountMismatch {
            declared: n,
            found: pubkeys.len(),
        });
    }

    let m = m as i64;
    if !(1 <= m && m <= n && n > 1 && n <= MAX_MULTISIG_KEYS as i64) {
        return Err(ProgramError::InvalidMultiSigParam { m, n });
    }
    let mut distinct = HashSet::with_capacity(pubkeys.len());
    if !pubkeys.iter().all(|key| distinct.insert(*key)) {
        return Err(ProgramError::InvalidMultiSigParam { m, n });
    }

    Ok(ProgramInfo {
        pubkeys,
        threshold: m as u16,
    })
}

/// Decodes a parameter program into its pushed signatures.
pub fn decode_parameter_list(program: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut parser = ProgramParser::new(program);
    let mut params = Vec::new();
    while !parser.is_eof() {
        params.push(parser.read_bytes()?);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{
        encode_multi_key_program, encode_parameter_program, encode_single_key_program,
        ProgramBuilder,
    };
    use crate::keys::KeyPair;

    fn keys(count: u64) -> Vec<PublicKey> {
        (0..count).map(|i| KeyPair::from_seed(i).public_key()).collect()
    }

    fn num_roundtrip(n: u64) -> Result<u16> {
        let mut builder = ProgramBuilder::new();
        builder.push_num(n);
        let program = builder.finish();
        let mut parser = ProgramParser::new(&program);
        let value = parser.read_num()?;
        parser.expect_eof()?;
        Ok(value)
    }

    #[test]
    fn test_read_num_roundtrip() {
        for n in [0u64, 1, 16, 17, 1000, 65535] {
            assert_eq!(num_roundtrip(n).unwrap() as u64, n);
        }
    }

    #[test]
    fn test_large_numbers_use_byte_push() {
        let mut builder = ProgramBuilder::new();
        builder.push_num(65536);
        let program = builder.finish();

        let mut parser = ProgramParser::new(&program);
        let data = parser.read_bytes().unwrap();
        assert_eq!(decode_signed_le(&data), 65536);
        assert!(parser.is_eof());

        assert_eq!(
            num_roundtrip(65536),
            Err(ProgramError::NumberOutOfRange(65536))
        );
    }

    #[test]
    fn test_read_num_rejects_long_form_small_numbers() {
        // 5 pushed as data instead of PUSH5.
        let mut parser = ProgramParser::new(&[0x01, 0x05]);
        assert_eq!(parser.read_num(), Err(ProgramError::NumberOutOfRange(5)));
    }

    #[test]
    fn test_read_bytes_truncated() {
        for program in [
            &[0x4C][..],
            &[0x4D, 0x01][..],
            &[0x4E, 0x01, 0x00, 0x00][..],
            &[0x05, 1, 2, 3][..],
            &[0x4C, 0x03, 1][..],
            &[][..],
        ] {
            let mut parser = ProgramParser::new(program);
            assert_eq!(parser.read_bytes(), Err(ProgramError::UnexpectedEof));
        }
    }

    #[test]
    fn test_read_bytes_rejects_non_push() {
        let mut parser = ProgramParser::new(&[0xAC]);
        assert_eq!(parser.read_bytes(), Err(ProgramError::UnexpectedOpcode(0xAC)));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let parser = ProgramParser::new(&[0x51]);
        assert_eq!(parser.peek_opcode().unwrap(), OpCode::PushNum(1));
        assert_eq!(parser.remaining(), 1);
    }

    #[test]
    fn test_single_key_roundtrip() {
        let key = KeyPair::from_seed(11).public_key();
        let info = decode_program_info(&encode_single_key_program(&key)).unwrap();
        assert_eq!(info.pubkeys, vec![key]);
        assert_eq!(info.threshold, 1);
    }

    #[test]
    fn test_multi_key_roundtrip_sorted() {
        let mut input = keys(5);
        input.reverse();
        let info = decode_program_info(&encode_multi_key_program(&input, 3).unwrap()).unwrap();

        let mut expected = input.clone();
        expected.sort();
        assert_eq!(info.pubkeys, expected);
        assert_eq!(info.threshold, 3);
    }

    #[test]
    fn test_short_programs_are_malformed() {
        assert_eq!(decode_program_info(&[]), Err(ProgramError::MalformedProgram));
        assert_eq!(
            decode_program_info(&[0x51, 0xAC]),
            Err(ProgramError::MalformedProgram)
        );
    }

    #[test]
    fn test_unsupported_program() {
        assert_eq!(
            decode_program_info(&[0x01, 0x02, 0x03]),
            Err(ProgramError::UnsupportedProgram)
        );
    }

    #[test]
    fn test_single_key_trailing_bytes() {
        let key = KeyPair::from_seed(1).public_key();
        let mut builder = ProgramBuilder::new();
        builder
            .push_pubkey(&key)
            .push_opcode(OpCode::Push0)
            .push_opcode(OpCode::CheckSig);
        assert_eq!(
            decode_program_info(&builder.finish()),
            Err(ProgramError::ExpectedEof { remaining: 1 })
        );
    }

    #[test]
    fn test_single_key_bad_key() {
        let mut builder = ProgramBuilder::new();
        builder.push_bytes(&[0x01; 5]).unwrap();
        builder.push_opcode(OpCode::CheckSig);
        assert!(matches!(
            decode_program_info(&builder.finish()),
            Err(ProgramError::KeyDeserializationFailed(_))
        ));
    }

    #[test]
    fn test_multi_key_count_mismatch() {
        let keys = keys(3);
        let mut builder = ProgramBuilder::new();
        builder.push_num(2);
        for key in &keys {
            builder.push_pubkey(key);
        }
        builder.push_num(4).push_opcode(OpCode::CheckMultiSig);
        assert_eq!(
            decode_program_info(&builder.finish()),
            Err(ProgramError::KeyCountMismatch {
                declared: 4,
                found: 3
            })
        );
    }

    #[test]
    fn test_multi_key_invalid_threshold() {
        let keys = keys(3);
        let mut builder = ProgramBuilder::new();
        builder.push_num(0);
        for key in &keys {
            builder.push_pubkey(key);
        }
        builder.push_num(3).push_opcode(OpCode::CheckMultiSig);
        assert_eq!(
            decode_program_info(&builder.finish()),
            Err(ProgramError::InvalidMultiSigParam { m: 0, n: 3 })
        );
    }

    #[test]
    fn test_multi_key_single_key_rejected() {
        let keys = keys(1);
        let mut builder = ProgramBuilder::new();
        builder
            .push_num(1)
            .push_pubkey(&keys[0])
            .push_num(1)
            .push_opcode(OpCode::CheckMultiSig);
        assert_eq!(
            decode_program_info(&builder.finish()),
            Err(ProgramError::InvalidMultiSigParam { m: 1, n: 1 })
        );
    }

    #[test]
    fn test_multi_key_repeated_key_rejected() {
        let keys = keys(2);
        let mut builder = ProgramBuilder::new();
        builder
            .push_num(2)
            .push_pubkey(&keys[0])
            .push_pubkey(&keys[1])
            .push_pubkey(&keys[0])
            .push_num(3)
            .push_opcode(OpCode::CheckMultiSig);
        assert_eq!(
            decode_program_info(&builder.finish()),
            Err(ProgramError::InvalidMultiSigParam { m: 2, n: 3 })
        );
    }

    #[test]
    fn test_multi_key_missing_count() {
        // No key count before CHECKMULTISIG.
        let key = KeyPair::from_seed(1).public_key();
        let mut builder = ProgramBuilder::new();
        builder
            .push_num(1)
            .push_pubkey(&key)
            .push_opcode(OpCode::CheckMultiSig);
        assert_eq!(
            decode_program_info(&builder.finish()),
            Err(ProgramError::MalformedProgram)
        );
    }

    #[test]
    fn test_multi_key_truncated_tail() {
        let program = encode_multi_key_program(&keys(3), 2).unwrap();
        // Drop the key count; the program still ends in CHECKMULTISIG.
        let mut tampered = program[..program.len() - 2].to_vec();
        tampered.push(0xAE);
        tampered.insert(tampered.len() - 1, 0x4C);
        assert!(decode_program_info(&tampered).is_err());
    }

    #[test]
    fn test_parameter_list_roundtrip() {
        let key = KeyPair::from_seed(2);
        let sigs = vec![key.sign(b"a"), key.sign(b"b")];
        let program =
            encode_parameter_program(&sigs.iter().map(|s| s.as_bytes()).collect::<Vec<_>>())
                .unwrap();
        let params = decode_parameter_list(&program).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], sigs[0].as_bytes().to_vec());
        assert_eq!(params[1], sigs[1].as_bytes().to_vec());
    }

    #[test]
    fn test_parameter_list_rejects_opcodes() {
        assert_eq!(
            decode_parameter_list(&[0x01, 0xFF, 0xAC]),
            Err(ProgramError::UnexpectedOpcode(0xAC))
        );
        assert_eq!(decode_parameter_list(&[]).unwrap(), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn test_decode_helpers() {
        assert_eq!(decode_signed_le(&[]), 0);
        assert_eq!(decode_signed_le(&[0xFF]), -1);
        assert_eq!(decode_signed_le(&[0x80, 0x00]), 128);
        assert_eq!(decode_signed_le(&[0x01; 9]), i64::MAX);
        assert_eq!(decode_unsigned_be(&[]), 0);
        assert_eq!(decode_unsigned_be(&[0x01, 0x00]), 256);
        assert_eq!(decode_unsigned_be(&[0xFF; 32]), i64::MAX);
    }
}
