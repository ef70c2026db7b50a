//! Trusted bundle records
//!
//! A [`TrustedBundle`] is the unit of trust the rest of the CLI consumes: the
//! relay to talk to, the tenant it is scoped to, the bearer token for the
//! relay, and the signing keys pinned by the last successful import. Records
//! are only ever produced by [`BundleImporter`](super::BundleImporter) and
//! replaced wholesale, never edited in place.

use super::manifest::RelayBundleKey;
use crate::error::RelayError;
use crate::time::parse_rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A signing key identity pinned by a successful import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedRelayKey {
    pub key_id: String,
    /// RFC 7638 thumbprint of the key as published in the relay's JWKS.
    pub thumbprint: String,
}

impl From<&RelayBundleKey> for TrustedRelayKey {
    fn from(key: &RelayBundleKey) -> Self {
        Self {
            key_id: key.key_id.clone(),
            thumbprint: key.thumbprint.clone(),
        }
    }
}

/// A verified, persisted trust bundle.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedBundle {
    /// Always equal to `allowed_domain`.
    pub id: String,
    pub relay_url: String,
    pub allowed_domain: String,
    /// Bearer credential for the relay. Sensitive.
    pub bundle_token: String,
    pub relay_keys: Vec<TrustedRelayKey>,
    pub issued_at: String,
    pub expires_at: String,
    pub imported_at: String,
}

impl TrustedBundle {
    /// Parsed `issued_at`.
    pub fn issued_at_time(&self) -> Result<DateTime<Utc>, RelayError> {
        parse_rfc3339(&self.issued_at, "issued_at")
    }

    /// Parsed `expires_at`.
    pub fn expires_at_time(&self) -> Result<DateTime<Utc>, RelayError> {
        parse_rfc3339(&self.expires_at, "expires_at")
    }

    /// True if the bundle has expired at `now`. An unparseable expiry counts
    /// as expired.
    pub fn is_expired(&self, now: &DateTime<Utc>) -> bool {
        self.expires_at_time().map_or(true, |exp| exp <= *now)
    }

    /// Fail with [`RelayError::Expired`] if the bundle is not valid at `now`.
    pub fn ensure_not_expired(&self, now: &DateTime<Utc>) -> Result<(), RelayError> {
        if self.expires_at_time()? <= *now {
            return Err(RelayError::Expired {
                what: "Trusted bundle",
                expires_at: self.expires_at.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for TrustedBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedBundle")
            .field("id", &self.id)
            .field("relay_url", &self.relay_url)
            .field("allowed_domain", &self.allowed_domain)
            .field("bundle_token", &"<redacted>")
            .field("relay_keys", &self.relay_keys)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("imported_at", &self.imported_at)
            .finish()
    }
}
