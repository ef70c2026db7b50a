//! Detached JWS signatures
//!
//! Bundles and info documents carry JWS-style signature entries
//! `{protected, signature}`. The signing input is always
//! `protected_b64 + "." + payload_b64`, where `protected_b64` is the entry's
//! `protected` string exactly as received.

use crate::crypto::{b64url_decode, b64url_encode};
use crate::error::RelayError;
use ed25519_compact::{KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// The only accepted JWS algorithm.
pub const EDDSA_ALG: &str = "EdDSA";

/// One detached signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    /// base64url-encoded protected header JSON.
    pub protected: String,
    /// base64url-encoded Ed25519 signature.
    pub signature: String,
}

/// Decoded protected header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: String,
}

/// The signature member of a bundle archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDocument {
    pub signatures: Vec<SignatureEntry>,
}

impl SignatureDocument {
    /// Parse a signature document.
    pub fn from_json(data: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(data).map_err(|e| {
            RelayError::ParseError(format!("Failed to parse signature document: {}", e))
        })
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, RelayError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

impl SignatureEntry {
    /// Sign `payload_b64` with `key_pair`, advertising `kid` in the header.
    pub fn sign(kid: &str, payload_b64: &str, key_pair: &KeyPair) -> Result<Self, RelayError> {
        let header = serde_json::to_vec(&ProtectedHeader {
            alg: EDDSA_ALG.to_string(),
            kid: kid.to_string(),
        })?;
        let protected = b64url_encode(&header)?;
        let sig = key_pair
            .sk
            .sign(signing_input(&protected, payload_b64).as_bytes(), None);
        Ok(Self {
            protected,
            signature: b64url_encode(sig.as_ref())?,
        })
    }

    /// Decode the protected header.
    pub fn header(&self) -> Result<ProtectedHeader, RelayError> {
        let raw = b64url_decode(&self.protected)
            .map_err(|_| RelayError::SignatureError("protected header is not base64url".to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| {
            RelayError::SignatureError(format!("protected header is not valid JSON: {}", e))
        })
    }

    /// Verify this entry over `payload_b64` with `public_key`.
    pub fn verify(&self, payload_b64: &str, public_key: &PublicKey) -> Result<(), RelayError> {
        let raw = b64url_decode(&self.signature)
            .map_err(|_| RelayError::SignatureError("signature is not base64url".to_string()))?;
        let sig = Signature::from_slice(&raw).map_err(|_| {
            RelayError::SignatureError(format!(
                "signature must be {} bytes, got {}",
                Signature::BYTES,
                raw.len()
            ))
        })?;
        public_key
            .verify(signing_input(&self.protected, payload_b64).as_bytes(), &sig)
            .map_err(|_| RelayError::SignatureError("Ed25519 verification failed".to_string()))
    }
}

/// `protected_b64 + "." + payload_b64`
pub fn signing_input(protected_b64: &str, payload_b64: &str) -> String {
    let mut input = String::with_capacity(protected_b64.len() + 1 + payload_b64.len());
    input.push_str(protected_b64);
    input.push('.');
    input.push_str(payload_b64);
    input
}

/// Sign raw payload bytes, returning the base64url payload and the entry.
pub fn sign_detached(
    kid: &str,
    payload: &[u8],
    key_pair: &KeyPair,
) -> Result<(String, SignatureEntry), RelayError> {
    let payload_b64 = b64url_encode(payload)?;
    let entry = SignatureEntry::sign(kid, &payload_b64, key_pair)?;
    Ok((payload_b64, entry))
}
