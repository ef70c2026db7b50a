//! SHA-256 digests for file-integrity checks

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    hmac_sha256::Hash::hash(data)
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Compare two hex digests, ignoring ASCII case.
///
/// Surrounding whitespace in `expected` is not trimmed: a manifest that
/// declares `" abc"` does not match `"abc"`.
pub fn hashes_match(expected: &str, actual: &str) -> bool {
    expected.len() == actual.len() && expected.eq_ignore_ascii_case(actual)
}
