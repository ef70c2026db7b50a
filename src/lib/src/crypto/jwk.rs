//! Ed25519 JSON Web Keys
//!
//! Only `kty = "OKP"`, `crv = "Ed25519"` keys are supported. Any other key
//! type is rejected rather than ignored, so a JWKS entry with an unexpected
//! type can never verify a signature.

use super::{b64url_decode, b64url_encode, sha256};
use crate::error::RelayError;
use ed25519_compact::{KeyPair, PublicKey, Seed};
use serde::{Deserialize, Serialize};

/// JWK key type for octet key pairs.
pub const OKP_KEY_TYPE: &str = "OKP";

/// JWK curve name for Ed25519.
pub const ED25519_CURVE: &str = "Ed25519";

/// A single JSON Web Key.
///
/// Fields other than `kty` default to empty so that a JWKS containing key
/// types we do not understand still parses; such entries fail later in
/// [`Jwk::public_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub crv: String,
    #[serde(default)]
    pub kid: String,
    #[serde(default)]
    pub x: String,
    /// Private seed. Present only in signing keys, never in a published JWKS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl Jwk {
    /// Public JWK for an Ed25519 key.
    pub fn from_public_key(kid: &str, pk: &PublicKey) -> Result<Self, RelayError> {
        Ok(Self {
            kty: OKP_KEY_TYPE.to_string(),
            crv: ED25519_CURVE.to_string(),
            kid: kid.to_string(),
            x: b64url_encode(pk.as_ref())?,
            d: None,
        })
    }

    /// Private JWK (seed in `d`) for an Ed25519 key pair.
    pub fn from_key_pair(kid: &str, kp: &KeyPair) -> Result<Self, RelayError> {
        let mut jwk = Self::from_public_key(kid, &kp.pk)?;
        jwk.d = Some(b64url_encode(kp.sk.seed().as_ref())?);
        Ok(jwk)
    }

    fn invalid(&self, reason: impl Into<String>) -> RelayError {
        RelayError::InvalidKey {
            kid: self.kid.clone(),
            reason: reason.into(),
        }
    }

    fn ensure_ed25519(&self) -> Result<(), RelayError> {
        if self.kty != OKP_KEY_TYPE {
            return Err(self.invalid(format!("unsupported kty '{}'", self.kty)));
        }
        if self.crv != ED25519_CURVE {
            return Err(self.invalid(format!("unsupported crv '{}'", self.crv)));
        }
        Ok(())
    }

    fn decode_exact(&self, field: &str, value: &str, len: usize) -> Result<Vec<u8>, RelayError> {
        let bytes =
            b64url_decode(value).map_err(|_| self.invalid(format!("'{}' is not base64url", field)))?;
        if bytes.len() != len {
            return Err(self.invalid(format!(
                "'{}' must decode to {} bytes, got {}",
                field,
                len,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// The Ed25519 public key in `x`.
    pub fn public_key(&self) -> Result<PublicKey, RelayError> {
        self.ensure_ed25519()?;
        let x = self.decode_exact("x", &self.x, PublicKey::BYTES)?;
        PublicKey::from_slice(&x).map_err(|_| self.invalid("'x' is not a valid Ed25519 public key"))
    }

    /// The Ed25519 key pair derived from the seed in `d`.
    ///
    /// If `x` is also present it must match the public key derived from the
    /// seed.
    pub fn key_pair(&self) -> Result<KeyPair, RelayError> {
        self.ensure_ed25519()?;
        let d = self
            .d
            .as_deref()
            .ok_or_else(|| self.invalid("missing private key 'd'"))?;
        let seed_bytes = self.decode_exact("d", d, Seed::BYTES)?;
        let seed = Seed::from_slice(&seed_bytes).map_err(|_| self.invalid("'d' is not a valid seed"))?;
        let kp = KeyPair::from_seed(seed);
        if !self.x.is_empty() && self.public_key()? != kp.pk {
            return Err(self.invalid("'x' does not match the public key derived from 'd'"));
        }
        Ok(kp)
    }

    /// RFC 7638 thumbprint: base64url(SHA-256(canonical JSON)).
    ///
    /// For OKP keys the canonical form is exactly
    /// `{"crv":"Ed25519","kty":"OKP","x":"..."}`, members in lexicographic
    /// order with no whitespace. The private `d` never contributes.
    pub fn thumbprint(&self) -> Result<String, RelayError> {
        self.ensure_ed25519()?;
        self.decode_exact("x", &self.x, PublicKey::BYTES)?;
        let canonical = serde_json::to_string(&CanonicalOkp {
            crv: &self.crv,
            kty: &self.kty,
            x: &self.x,
        })?;
        b64url_encode(&sha256(canonical.as_bytes()))
    }
}

/// Required members of an OKP JWK in RFC 7638 order.
#[derive(Serialize)]
struct CanonicalOkp<'a> {
    crv: &'a str,
    kty: &'a str,
    x: &'a str,
}

/// A JSON Web Key Set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Parse a JWKS document.
    pub fn from_slice(data: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(data)
            .map_err(|e| RelayError::ParseError(format!("Failed to parse JWKS: {}", e)))
    }

    /// Find the first key with the given `kid`.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Every key with the given `kid`, in document order.
    ///
    /// A relay may publish an old and a new key under one id while it
    /// rotates.
    pub fn find_all<'a>(&'a self, kid: &'a str) -> impl Iterator<Item = &'a Jwk> + 'a {
        self.keys.iter().filter(move |k| k.kid == kid)
    }

    /// True if every id in `kids` is published in this set.
    pub fn contains_all<'a>(&self, mut kids: impl Iterator<Item = &'a str>) -> bool {
        kids.all(|kid| self.find(kid).is_some())
    }
}
