//! Fuzz target for detached signature and relay info documents

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaytrust::crypto::Jwks;
use relaytrust::relay::{RelayInfoDocument, SignatureDocument};

fuzz_target!(|data: &[u8]| {
    let _ = SignatureDocument::from_json(data);

    if let Ok(doc) = RelayInfoDocument::from_json(data) {
        let _ = doc.decode_payload();
    }

    if let Ok(jwks) = Jwks::from_slice(data) {
        for key in &jwks.keys {
            let _ = key.thumbprint();
            let _ = key.public_key();
        }
    }
});
