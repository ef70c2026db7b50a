//! File integrity checks for unpacked bundles

use super::manifest::RelayBundleFileRef;
use crate::crypto::{hashes_match, sha256_hex};
use crate::error::RelayError;
use std::collections::BTreeMap;

/// Check every file referenced by the manifest against the archive members.
///
/// Each referenced member must exist and hash to the declared SHA-256
/// (compared case-insensitively). The first missing file or mismatch aborts.
pub fn verify_files(
    files: &[RelayBundleFileRef],
    members: &BTreeMap<String, Vec<u8>>,
) -> Result<(), RelayError> {
    for file in files {
        let content = members
            .get(&file.name)
            .ok_or_else(|| RelayError::MissingFile(file.name.clone()))?;
        let actual = sha256_hex(content);
        if !hashes_match(&file.sha256, &actual) {
            return Err(RelayError::HashMismatch {
                name: file.name.clone(),
                expected: file.sha256.clone(),
                actual,
            });
        }
        log::debug!("{}: sha256 ok", file.name);
    }
    Ok(())
}
