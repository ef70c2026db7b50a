//! Crypto primitives adapter
//!
//! Thin wrappers over `ed25519-compact`, `hmac-sha256` and `ct-codecs` that
//! the relay protocol builds on:
//!
//! - **JWK** ([`jwk`]): Ed25519/OKP keys from JWK fields, RFC 7638 thumbprints
//! - **Digest** ([`digest`]): SHA-256 over byte content, hex comparison
//! - base64url without padding, the encoding used by every protocol field

pub mod digest;
pub mod jwk;

pub use digest::{hashes_match, sha256, sha256_hex};
pub use jwk::{Jwk, Jwks, ED25519_CURVE, OKP_KEY_TYPE};

use crate::error::RelayError;
use ct_codecs::{Base64UrlSafeNoPadding, Decoder, Encoder};

/// Encode bytes as unpadded base64url.
pub fn b64url_encode(data: &[u8]) -> Result<String, RelayError> {
    Base64UrlSafeNoPadding::encode_to_string(data)
        .map_err(|e| RelayError::InternalError(format!("base64url encoding failed: {:?}", e)))
}

/// Decode unpadded base64url. Padding and any other non-alphabet character
/// are rejected.
pub fn b64url_decode(s: &str) -> Result<Vec<u8>, RelayError> {
    if s.contains('=') {
        return Err(RelayError::ParseError("padded base64url encoding".to_string()));
    }
    Base64UrlSafeNoPadding::decode_to_vec(s, None)
        .map_err(|_| RelayError::ParseError("invalid base64url encoding".to_string()))
}
