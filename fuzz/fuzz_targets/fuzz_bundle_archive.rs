//! Fuzz target for bundle archive unpacking
//!
//! Security concerns:
//! - Zip bombs and oversized members
//! - Duplicate or directory entries shadowing required members

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaytrust::relay::archive::unpack;
use relaytrust::relay::ArchiveLimits;

fuzz_target!(|data: &[u8]| {
    let limits = ArchiveLimits {
        max_archive_bytes: 1024 * 1024,
        max_member_bytes: 256 * 1024,
        max_members: 64,
    };
    let _ = unpack(data, &limits);
});
