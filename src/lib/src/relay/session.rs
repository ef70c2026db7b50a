//! Session-time trust checks
//!
//! [`RelaySession`] wires the certs cache, verifiers, importer and trust store
//! together and answers the one question the OAuth layer asks before using a
//! relay: which bearer token to send, and whether the stored bundle is still
//! authoritative.

use super::bundle::{TrustedBundle, TrustedRelayKey};
use super::certs::CertsCache;
use super::importer::{BundleImporter, ImportRequest};
use super::info::{RelayInfoPayload, RelayInfoVerifier};
use super::store::{TrustStore, TrustedBundles};
use super::transport::{FetchContext, RelayTransport};
use super::update::{check_bundle_update, BundleUpdateRequired};
use super::verifier::SignatureVerifier;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::time::TimeSource;
use std::fmt;
use std::sync::Arc;

/// Result of a session-time check.
#[derive(Clone)]
pub struct TrustCheck {
    /// Bearer credential for the relay. Sensitive.
    pub bundle_token: String,
    /// False when the relay asked for a re-import.
    pub valid: bool,
    pub update_required: Option<BundleUpdateRequired>,
    /// The verified attestation.
    pub info: RelayInfoPayload,
}

impl fmt::Debug for TrustCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustCheck")
            .field("bundle_token", &"<redacted>")
            .field("valid", &self.valid)
            .field("update_required", &self.update_required)
            .field("info", &self.info)
            .finish()
    }
}

/// Facade over the relay trust components.
pub struct RelaySession {
    certs: Arc<CertsCache>,
    info: RelayInfoVerifier,
    importer: BundleImporter,
    bundles: TrustedBundles,
}

impl RelaySession {
    /// Build a session from explicit parts.
    pub fn new(
        config: &RelayConfig,
        transport: Arc<dyn RelayTransport>,
        store: Arc<dyn TrustStore>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let certs = Arc::new(CertsCache::new(
            transport.clone(),
            clock.clone(),
            config.cache_dir(),
            config.certs_ttl,
        ));
        let signatures = Arc::new(SignatureVerifier::new(certs.clone()));
        let bundles = TrustedBundles::new(store);
        let info = RelayInfoVerifier::new(transport.clone(), signatures.clone(), clock.clone());
        let importer = BundleImporter::new(transport, signatures, bundles.clone(), clock)
            .with_limits(config.archive_limits())
            .with_pinned_keys(config.pinned_keys.clone());
        Self {
            certs,
            info,
            importer,
            bundles,
        }
    }

    pub fn certs(&self) -> &CertsCache {
        &self.certs
    }

    pub fn bundles(&self) -> &TrustedBundles {
        &self.bundles
    }

    pub fn importer(&self) -> &BundleImporter {
        &self.importer
    }

    /// The stored bundle for `domain`.
    pub fn bundle(&self, domain: &str) -> Result<TrustedBundle, RelayError> {
        self.bundles
            .find(domain)?
            .ok_or_else(|| RelayError::NotImported(domain.to_string()))
    }

    /// Import (or re-import) the bundle for a tenant.
    pub fn import(
        &self,
        relay_url: &str,
        domain: &str,
        bundle_token: &str,
        ctx: &FetchContext,
    ) -> Result<TrustedBundle, RelayError> {
        self.importer.import(
            &ImportRequest {
                relay_url,
                domain,
                bundle_token,
            },
            ctx,
        )
    }

    /// Check whether the stored bundle for `domain` may be used.
    ///
    /// Verifies the relay's live attestation against the stored bundle and
    /// evaluates the rotation cutoff. A rotation request is reported through
    /// [`TrustCheck::valid`], not as an error; `force` always reports one.
    ///
    /// # Errors
    ///
    /// - [`RelayError::NotImported`] if no bundle is stored for `domain`
    /// - any verification, network or expiry error from the info check
    pub fn check(&self, domain: &str, force: bool, ctx: &FetchContext) -> Result<TrustCheck, RelayError> {
        let bundle = self.bundle(domain)?;
        let info = self.info.fetch_and_verify(&bundle, ctx)?;
        let update_required = match check_bundle_update(Some(&info), Some(&bundle), force) {
            Ok(()) => None,
            Err(RelayError::BundleUpdateRequired(update)) => {
                log::debug!("{}", update);
                Some(update)
            }
            Err(e) => return Err(e),
        };
        Ok(TrustCheck {
            bundle_token: bundle.bundle_token,
            valid: update_required.is_none(),
            update_required,
            info,
        })
    }

    /// Keys currently pinned for `domain`.
    pub fn pinned_keys(&self, domain: &str) -> Result<Vec<TrustedRelayKey>, RelayError> {
        Ok(self.bundle(domain)?.relay_keys)
    }
}
