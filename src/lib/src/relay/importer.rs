//! Trust-bundle import pipeline
//!
//! ```text
//! Fetching -> Unpacking -> ValidatingManifest -> VerifyingSignature
//!          -> VerifyingFiles -> Persisting -> Done
//! ```
//!
//! Any step may move the import to `Failed`. Nothing is written until
//! `Persisting`, so a failed import leaves the previously trusted bundle for
//! the domain exactly as it was.

use super::archive::{self, ArchiveLimits, BundleContents};
use super::bundle::{TrustedBundle, TrustedRelayKey};
use super::integrity::verify_files;
use super::manifest::RelayBundleManifest;
use super::store::TrustedBundles;
use super::transport::{FetchContext, RelayRequest, RelayTransport};
use super::url::{build_bundle_url, check_endpoint_inputs, same_relay_url};
use super::verifier::SignatureVerifier;
use crate::error::RelayError;
use crate::time::{parse_rfc3339, TimeSource};
use std::fmt;
use std::sync::Arc;

/// Import pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Fetching,
    Unpacking,
    ValidatingManifest,
    VerifyingSignature,
    VerifyingFiles,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportState::Fetching => "fetching",
            ImportState::Unpacking => "unpacking",
            ImportState::ValidatingManifest => "validating manifest",
            ImportState::VerifyingSignature => "verifying signature",
            ImportState::VerifyingFiles => "verifying files",
            ImportState::Persisting => "persisting",
            ImportState::Done => "done",
            ImportState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What to import.
#[derive(Clone, Copy)]
pub struct ImportRequest<'a> {
    pub relay_url: &'a str,
    pub domain: &'a str,
    /// Bearer credential obtained by the auth flow. Sensitive.
    pub bundle_token: &'a str,
}

impl fmt::Debug for ImportRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportRequest")
            .field("relay_url", &self.relay_url)
            .field("domain", &self.domain)
            .field("bundle_token", &"<redacted>")
            .finish()
    }
}

/// Fetches, verifies and persists trust bundles.
pub struct BundleImporter {
    transport: Arc<dyn RelayTransport>,
    signatures: Arc<SignatureVerifier>,
    bundles: TrustedBundles,
    clock: Arc<dyn TimeSource>,
    limits: ArchiveLimits,
    pinned_keys: Vec<TrustedRelayKey>,
}

impl BundleImporter {
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        signatures: Arc<SignatureVerifier>,
        bundles: TrustedBundles,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            transport,
            signatures,
            bundles,
            clock,
            limits: ArchiveLimits::default(),
            pinned_keys: Vec::new(),
        }
    }

    /// Set archive size limits.
    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Keys to trust on first import, when no bundle exists for the domain.
    pub fn with_pinned_keys(mut self, keys: Vec<TrustedRelayKey>) -> Self {
        self.pinned_keys = keys;
        self
    }

    /// Run the full pipeline and persist the resulting bundle.
    ///
    /// # Errors
    ///
    /// Any error from the failing step. The trust store is only modified
    /// when every step has succeeded.
    pub fn import(&self, request: &ImportRequest<'_>, ctx: &FetchContext) -> Result<TrustedBundle, RelayError> {
        let mut state = ImportState::Fetching;
        match self.run(request, ctx, &mut state) {
            Ok(bundle) => {
                transition(&mut state, ImportState::Done, request.domain);
                log::info!(
                    "Imported trust bundle for {} (expires {})",
                    bundle.allowed_domain,
                    bundle.expires_at
                );
                Ok(bundle)
            }
            Err(e) => {
                log::debug!("import for {} failed while {}: {}", request.domain, state, e);
                transition(&mut state, ImportState::Failed, request.domain);
                Err(e)
            }
        }
    }

    fn run(
        &self,
        request: &ImportRequest<'_>,
        ctx: &FetchContext,
        state: &mut ImportState,
    ) -> Result<TrustedBundle, RelayError> {
        check_endpoint_inputs(request.relay_url, request.domain)?;
        log::debug!("import for {}: {}", request.domain, state);
        let body = self.fetch(request, ctx)?;

        transition(state, ImportState::Unpacking, request.domain);
        let contents = archive::unpack(&body, &self.limits)?;

        transition(state, ImportState::ValidatingManifest, request.domain);
        let manifest = self.validate_manifest(request, &contents)?;

        transition(state, ImportState::VerifyingSignature, request.domain);
        let pinned = self.pinned_keys_for(request.domain, &manifest)?;
        let kid = self.signatures.verify_manifest(
            request.relay_url,
            request.domain,
            &contents.manifest,
            &contents.signature.signatures,
            &pinned,
            ctx,
        )?;
        log::debug!("manifest for {} signed by '{}'", request.domain, kid);

        transition(state, ImportState::VerifyingFiles, request.domain);
        verify_files(&manifest.files, &contents.files)?;

        transition(state, ImportState::Persisting, request.domain);
        let bundle = TrustedBundle {
            id: manifest.allowed_domain.clone(),
            relay_url: manifest.relay_url.clone(),
            allowed_domain: manifest.allowed_domain.clone(),
            bundle_token: request.bundle_token.to_string(),
            relay_keys: manifest.relay_keys.iter().map(TrustedRelayKey::from).collect(),
            issued_at: manifest.issued_at.clone(),
            expires_at: manifest.expires_at.clone(),
            imported_at: self.clock.now_rfc3339(),
        };
        self.bundles.upsert(bundle.clone())?;
        Ok(bundle)
    }

    fn fetch(&self, request: &ImportRequest<'_>, ctx: &FetchContext) -> Result<Vec<u8>, RelayError> {
        let url = build_bundle_url(request.relay_url, request.domain);
        let relay_request = RelayRequest {
            url: &url,
            bearer: Some(request.bundle_token),
        };
        self.transport.get(&relay_request, ctx)?.into_ok_body(&url)
    }

    fn validate_manifest(
        &self,
        request: &ImportRequest<'_>,
        contents: &BundleContents,
    ) -> Result<RelayBundleManifest, RelayError> {
        let manifest = RelayBundleManifest::from_json(&contents.manifest)?;
        manifest.validate()?;
        if manifest.allowed_domain != request.domain {
            return Err(RelayError::DomainMismatch {
                expected: request.domain.to_string(),
                actual: manifest.allowed_domain,
            });
        }
        if !same_relay_url(&manifest.relay_url, request.relay_url) {
            return Err(RelayError::RelayUrlMismatch {
                expected: request.relay_url.to_string(),
                actual: manifest.relay_url,
            });
        }
        parse_rfc3339(&manifest.issued_at, "issued_at")?;
        if parse_rfc3339(&manifest.expires_at, "expires_at")? <= self.clock.now() {
            return Err(RelayError::Expired {
                what: "Bundle manifest",
                expires_at: manifest.expires_at,
            });
        }
        Ok(manifest)
    }

    /// Keys allowed to sign the incoming manifest.
    ///
    /// The keys of the bundle already trusted for the domain take priority,
    /// then configured pins. Only when neither exists are the manifest's own
    /// keys used; they must still match the relay's published thumbprints.
    fn pinned_keys_for(
        &self,
        domain: &str,
        manifest: &RelayBundleManifest,
    ) -> Result<Vec<TrustedRelayKey>, RelayError> {
        if let Some(existing) = self.bundles.find(domain)? {
            log::debug!("verifying {} against keys of the current bundle", domain);
            return Ok(existing.relay_keys);
        }
        if !self.pinned_keys.is_empty() {
            log::debug!("verifying {} against configured pins", domain);
            return Ok(self.pinned_keys.clone());
        }
        log::warn!(
            "No keys pinned for {}; trusting the manifest's keys on first import",
            domain
        );
        Ok(manifest.relay_keys.iter().map(TrustedRelayKey::from).collect())
    }
}

fn transition(state: &mut ImportState, next: ImportState, domain: &str) {
    log::debug!("import for {}: {} -> {}", domain, state, next);
    *state = next;
}
