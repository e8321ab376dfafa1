#![no_main]

//! Fuzz target for `Stripe-Signature` header parsing.

use libfuzzer_sys::fuzz_target;
use serpent_api::crypto::parse_signature_header;

fuzz_target!(|data: &[u8]| {
    let Ok(header) = std::str::from_utf8(data) else { return };
    if let Ok(parsed) = parse_signature_header(header) {
        assert!(!parsed.signatures.is_empty());
    }
});
