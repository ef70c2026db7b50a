//! Trust-bundle manifest
//!
//! The manifest is the relay's unverified claim about a bundle: which relay
//! and tenant it is for, when it is valid, which keys may sign for the tenant
//! and which files the archive must contain. [`RelayBundleManifest::validate`]
//! is a pure structural check and runs before any signature work.

use serde::{Deserialize, Serialize};

/// The only manifest format version this crate understands.
pub const MANIFEST_VERSION: u32 = 1;

/// A signing key identity as claimed by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayBundleKey {
    pub key_id: String,
    pub thumbprint: String,
}

/// Integrity record for one archive member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayBundleFileRef {
    pub name: String,
    /// Hex-encoded SHA-256 of the member's bytes.
    pub sha256: String,
}

/// Trust-bundle manifest as shipped in the archive.
///
/// Missing string members deserialize as empty so that validation, not
/// parsing, reports which field is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayBundleManifest {
    pub version: u32,
    #[serde(default)]
    pub relay_url: String,
    #[serde(default)]
    pub allowed_domain: String,
    #[serde(default)]
    pub issued_at: String,
    #[serde(default)]
    pub expires_at: String,
    #[serde(default)]
    pub relay_keys: Vec<RelayBundleKey>,
    #[serde(default)]
    pub files: Vec<RelayBundleFileRef>,
}

/// Structural manifest failures. The first failing check wins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("unsupported manifest version: {0}")]
    UnsupportedVersion(u32),

    #[error("relay_url is required")]
    MissingRelayUrl,

    #[error("allowed_domain is required")]
    MissingAllowedDomain,

    #[error("issued_at is required")]
    MissingIssuedAt,

    #[error("expires_at is required")]
    MissingExpiresAt,

    #[error("relay_keys must not be empty")]
    MissingRelayKeys,

    #[error("relay_keys[{0}].key_id is required")]
    MissingKeyId(usize),

    #[error("relay_keys[{0}].thumbprint is required")]
    MissingThumbprint(usize),
}

impl RelayBundleManifest {
    /// Parse a manifest from its raw JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Self, crate::RelayError> {
        serde_json::from_slice(data)
            .map_err(|e| crate::RelayError::ParseError(format!("Failed to parse manifest: {}", e)))
    }

    /// Check version, required fields and key entries.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(self.version));
        }
        if self.relay_url.is_empty() {
            return Err(ManifestError::MissingRelayUrl);
        }
        if self.allowed_domain.is_empty() {
            return Err(ManifestError::MissingAllowedDomain);
        }
        if self.issued_at.is_empty() {
            return Err(ManifestError::MissingIssuedAt);
        }
        if self.expires_at.is_empty() {
            return Err(ManifestError::MissingExpiresAt);
        }
        if self.relay_keys.is_empty() {
            return Err(ManifestError::MissingRelayKeys);
        }
        for (i, key) in self.relay_keys.iter().enumerate() {
            if key.key_id.is_empty() {
                return Err(ManifestError::MissingKeyId(i));
            }
            if key.thumbprint.is_empty() {
                return Err(ManifestError::MissingThumbprint(i));
            }
        }
        Ok(())
    }
}
