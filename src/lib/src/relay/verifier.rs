//! Bundle signature verification over pinned keys
//!
//! A key may verify a signature only if it is both pinned by the tenant (by
//! key id and RFC 7638 thumbprint) and currently published in the relay's
//! JWKS. A relay therefore cannot introduce a new signing key on its own:
//! the key must already be pinned by a previous import.
//!
//! Bundles may carry several signatures. The first one that verifies with an
//! allowed key wins; the others are not examined.

use super::bundle::TrustedRelayKey;
use super::certs::{CertsCache, JwksOrigin};
use super::jws::{SignatureEntry, EDDSA_ALG};
use super::transport::FetchContext;
use crate::crypto::{b64url_encode, Jwks};
use crate::error::RelayError;
use ed25519_compact::PublicKey;
use std::sync::Arc;

/// A key that is both pinned and published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedKey {
    pub key_id: String,
    pub public_key: PublicKey,
}

/// The intersection of pinned keys and the live JWKS, in pinned order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedKeys {
    keys: Vec<AllowedKey>,
}

impl AllowedKeys {
    pub fn get(&self, key_id: &str) -> Option<&AllowedKey> {
        self.keys.iter().find(|k| k.key_id == key_id)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.key_id.as_str())
    }
}

/// Intersect `pinned` with `jwks`.
///
/// A pinned key is kept only if the JWKS publishes an entry with the same
/// `kid` whose recomputed thumbprint equals the pinned one and which is a
/// well-formed Ed25519 key. Every exclusion is logged; none is
/// fatal on its own.
pub fn build_allowed_keys(pinned: &[TrustedRelayKey], jwks: &Jwks) -> AllowedKeys {
    let mut keys: Vec<AllowedKey> = Vec::with_capacity(pinned.len());
    for pin in pinned {
        if keys.iter().any(|k| k.key_id == pin.key_id) {
            continue;
        }
        if let Some(key) = allowed_key_for(pin, jwks) {
            keys.push(key);
        }
    }
    AllowedKeys { keys }
}

/// The published key matching `pin` by kid and thumbprint.
///
/// Every entry carrying the kid is considered; one whose thumbprint differs
/// is skipped, not fatal.
fn allowed_key_for(pin: &TrustedRelayKey, jwks: &Jwks) -> Option<AllowedKey> {
    let mut published = 0;
    for jwk in jwks.find_all(&pin.key_id) {
        published += 1;
        let thumbprint = match jwk.thumbprint() {
            Ok(tp) => tp,
            Err(e) => {
                log::warn!("Excluding published key '{}': {}", pin.key_id, e);
                continue;
            }
        };
        if thumbprint != pin.thumbprint {
            log::warn!(
                "Excluding published key '{}': thumbprint mismatch (pinned {}, published {})",
                pin.key_id,
                pin.thumbprint,
                thumbprint
            );
            continue;
        }
        match jwk.public_key() {
            Ok(public_key) => {
                return Some(AllowedKey {
                    key_id: pin.key_id.clone(),
                    public_key,
                })
            }
            Err(e) => log::warn!("Excluding published key '{}': {}", pin.key_id, e),
        }
    }
    if published == 0 {
        log::warn!("Pinned key '{}' is not published by the relay", pin.key_id);
    }
    None
}

/// Verify `signatures` over `payload_b64` with `allowed`.
///
/// Returns the key id of the first signature that verifies. An entry with a
/// malformed header, an algorithm other than EdDSA, an unknown key id or a
/// bad signature is skipped. If no entry verifies the result is
/// [`RelayError::SignatureError`].
pub fn verify_with_keys(
    payload_b64: &str,
    signatures: &[SignatureEntry],
    allowed: &AllowedKeys,
) -> Result<String, RelayError> {
    if signatures.is_empty() {
        return Err(RelayError::SignatureError("no signatures present".to_string()));
    }
    if allowed.is_empty() {
        return Err(RelayError::SignatureError(
            "no pinned key is currently published by the relay".to_string(),
        ));
    }

    for (i, entry) in signatures.iter().enumerate() {
        let header = match entry.header() {
            Ok(h) => h,
            Err(e) => {
                log::debug!("signature {}: {}", i, e);
                continue;
            }
        };
        if header.alg != EDDSA_ALG {
            log::debug!("signature {}: unsupported alg '{}'", i, header.alg);
            continue;
        }
        let Some(key) = allowed.get(&header.kid) else {
            log::debug!("signature {}: key '{}' is not allowed", i, header.kid);
            continue;
        };
        match entry.verify(payload_b64, &key.public_key) {
            Ok(()) => {
                log::debug!("signature {} verified with key '{}'", i, key.key_id);
                return Ok(key.key_id.clone());
            }
            Err(e) => log::debug!("signature {} with key '{}': {}", i, key.key_id, e),
        }
    }

    Err(RelayError::SignatureError(format!(
        "none of {} signature(s) verified with an allowed key",
        signatures.len()
    )))
}

/// Verifies detached signatures against a tenant's pinned keys and the
/// relay's JWKS.
pub struct SignatureVerifier {
    certs: Arc<CertsCache>,
}

impl SignatureVerifier {
    pub fn new(certs: Arc<CertsCache>) -> Self {
        Self { certs }
    }

    pub fn certs(&self) -> &CertsCache {
        &self.certs
    }

    /// Build the allowed-key set for a tenant.
    ///
    /// The JWKS comes from the certs cache. If a cache hit does not publish
    /// every pinned key id, it is refreshed before intersecting, so a key
    /// rotation on the relay is picked up without waiting for the TTL. Such a
    /// forced refresh happens at most once per TTL window: a pinned key the
    /// relay has retired does not cause a fetch on every call.
    ///
    /// # Errors
    ///
    /// Returns an error if no JWKS can be obtained. An empty intersection is
    /// not an error here; it makes every signature check fail.
    pub fn allowed_keys(
        &self,
        relay_url: &str,
        domain: &str,
        pinned: &[TrustedRelayKey],
        ctx: &FetchContext,
    ) -> Result<AllowedKeys, RelayError> {
        let (entry, origin) = self.certs.lookup(relay_url, domain, ctx)?;
        let mut jwks = entry.jwks;
        if origin == JwksOrigin::Cache
            && !entry.forced
            && !jwks.contains_all(pinned.iter().map(|k| k.key_id.as_str()))
        {
            log::debug!("cached JWKS for {} lacks a pinned key; refreshing", domain);
            jwks = self.certs.force_refresh(relay_url, domain, ctx)?;
        }
        Ok(build_allowed_keys(pinned, &jwks))
    }

    /// Verify signatures over an already base64url-encoded payload.
    ///
    /// Returns the key id that verified.
    pub fn verify_payload(
        &self,
        relay_url: &str,
        domain: &str,
        payload_b64: &str,
        signatures: &[SignatureEntry],
        pinned: &[TrustedRelayKey],
        ctx: &FetchContext,
    ) -> Result<String, RelayError> {
        let allowed = self.allowed_keys(relay_url, domain, pinned, ctx)?;
        verify_with_keys(payload_b64, signatures, &allowed)
    }

    /// Verify signatures over raw manifest bytes.
    pub fn verify_manifest(
        &self,
        relay_url: &str,
        domain: &str,
        manifest: &[u8],
        signatures: &[SignatureEntry],
        pinned: &[TrustedRelayKey],
        ctx: &FetchContext,
    ) -> Result<String, RelayError> {
        let payload_b64 = b64url_encode(manifest)?;
        self.verify_payload(relay_url, domain, &payload_b64, signatures, pinned, ctx)
    }
}
