#![no_main]

//! Fuzz target for COSE public key decoding
//!
//! Decodes arbitrary bytes as a COSE key and, when one comes out, verifies a
//! garbage signature against it.
//!
//! Run with: cargo +nightly fuzz run fuzz_public_key

use keygate_core::codec::{decode_public_key_descriptor, verify_signature};
use keygate_core::CoseAlgorithm;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(key) = decode_public_key_descriptor(data, &CoseAlgorithm::ALL) {
        // Re-encoding must round-trip through the decoder
        let reencoded = key.to_cose_key().expect("COSE key encodes");
        assert_eq!(
            decode_public_key_descriptor(&reencoded, &CoseAlgorithm::ALL).ok(),
            Some(key.clone())
        );
        let _ = verify_signature(&key, data, data);
    }
});
