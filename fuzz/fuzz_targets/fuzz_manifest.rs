//! Fuzz target for bundle manifest parsing
//!
//! Security concerns:
//! - Panics on malformed timestamps or hashes during validation
//! - Unbounded allocation from attacker-controlled JSON

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaytrust::relay::RelayBundleManifest;

fuzz_target!(|data: &[u8]| {
    if let Ok(manifest) = RelayBundleManifest::from_json(data) {
        let _ = manifest.validate();
    }
});
