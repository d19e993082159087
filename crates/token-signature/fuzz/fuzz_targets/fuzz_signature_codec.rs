//! Fuzz target for the r || s / DER signature codec.
//!
//! Decoding untrusted DER must never panic, and anything that decodes must
//! survive a round trip through the token's raw layout.
//!
//! ## Running
//!
//! ```bash
//! cd crates/token-signature
//! cargo +nightly fuzz run fuzz_signature_codec
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use token_signature::domain::algorithm::DSA_SIGNATURE_LEN;
use token_signature::domain::codec::{decode_der, der_to_dsa, der_to_ecdsa, raw_to_der};

#[derive(Debug, arbitrary::Arbitrary)]
enum FuzzInput {
    /// Signature handed to verify
    Der(Vec<u8>),
    /// Block returned by a token
    Raw(Vec<u8>),
}

fuzz_target!(|input: FuzzInput| {
    match input {
        FuzzInput::Der(bytes) => {
            if let Ok(raw) = der_to_dsa(&bytes) {
                assert_eq!(raw.len(), DSA_SIGNATURE_LEN);
            }
            if let Ok(raw) = der_to_ecdsa(&bytes) {
                assert!(raw.len() % 2 == 0 && !raw.is_empty());
                let (r, s) = decode_der(&bytes).expect("decoded once already");
                let reencoded = raw_to_der(&raw).expect("even, non-empty block");
                assert_eq!(decode_der(&reencoded).ok(), Some((r, s)));
            }
        }
        FuzzInput::Raw(block) => {
            if let Ok(der) = raw_to_der(&block) {
                let raw = der_to_ecdsa(&der).expect("own encoding decodes");
                assert!(raw.len() <= block.len());
            }
        }
    }
});
