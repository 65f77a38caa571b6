#![no_main]

//! Fuzz target for attestation object decoding
//!
//! Feeds arbitrary bytes through the attestation object decoder and, when that
//! succeeds, through the authenticator data parser it carries. Also treats the
//! raw input as authenticator data and as client data JSON directly.
//!
//! Run with: cargo +nightly fuzz run fuzz_attestation_object

use keygate_core::codec::{
    decode_attestation_object, decode_attested_credential, decode_authenticator_data,
    decode_client_data,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // None of these may panic, whatever the input
    if let Ok(object) = decode_attestation_object(data) {
        let _ = decode_attested_credential(&object.auth_data);
    }
    let _ = decode_attested_credential(data);
    let _ = decode_authenticator_data(data);
    let _ = decode_client_data(data);
});
