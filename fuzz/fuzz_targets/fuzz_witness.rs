//! Fuzz target for witness verification.
//!
//! Tests that verification of arbitrary witnesses fails closed without
//! panicking.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use solo_program::{verify_witness, Witness};

#[derive(Debug, Arbitrary)]
struct Input {
    message: Vec<u8>,
    invocation: Vec<u8>,
    verification: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let witness = Witness {
        invocation: input.invocation,
        verification: input.verification,
    };
    let _ = verify_witness(&input.message, &witness);
    let _ = witness.decode();
});
