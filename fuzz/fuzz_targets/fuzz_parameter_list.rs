//! Fuzz target for parameter program decoding.
//!
//! Tests that the decoder handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use solo_program::{decode_parameter_list, encode_parameter_program};

fuzz_target!(|data: &[u8]| {
    if let Ok(params) = decode_parameter_list(data) {
        // Re-encoding uses the shortest push for each parameter.
        if let Ok(encoded) = encode_parameter_program(&params) {
            assert_eq!(decode_parameter_list(&encoded).ok(), Some(params));
        }
    }
});
