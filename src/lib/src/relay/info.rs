//! Signed relay attestation
//!
//! The relay publishes a short-lived, signed info document per tenant. It is
//! checked at session start and token refresh to detect key rotation and
//! expiry without re-importing the whole bundle.

use super::bundle::TrustedBundle;
use super::jws::SignatureEntry;
use super::transport::{FetchContext, RelayRequest, RelayTransport};
use super::url::{build_relay_info_url, check_endpoint_inputs, same_relay_url};
use super::verifier::SignatureVerifier;
use crate::crypto::b64url_decode;
use crate::error::RelayError;
use crate::time::{parse_rfc3339, TimeSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The only info payload version this crate understands.
pub const RELAY_INFO_VERSION: u32 = 1;

/// Decoded attestation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayInfoPayload {
    pub version: u32,
    pub relay_url: String,
    pub allowed_domain: String,
    #[serde(default)]
    pub space: String,
    #[serde(default)]
    pub domain: String,
    pub issued_at: String,
    pub expires_at: String,
    /// Rotation cutoff. Bundles issued before it must be re-imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_before: Option<String>,
}

/// Info document as served: base64url payload plus detached signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayInfoDocument {
    pub payload: String,
    pub signatures: Vec<SignatureEntry>,
}

impl RelayInfoDocument {
    pub fn from_json(data: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(data)
            .map_err(|e| RelayError::ParseError(format!("Failed to parse relay info: {}", e)))
    }

    /// Decode the payload. Does not check signatures.
    pub fn decode_payload(&self) -> Result<RelayInfoPayload, RelayError> {
        let raw = b64url_decode(&self.payload)?;
        serde_json::from_slice(&raw)
            .map_err(|e| RelayError::ParseError(format!("Failed to parse relay info payload: {}", e)))
    }
}

/// Post-signature checks of a payload against the pinned bundle.
pub fn check_payload(
    payload: &RelayInfoPayload,
    bundle: &TrustedBundle,
    now: &DateTime<Utc>,
) -> Result<(), RelayError> {
    if payload.version != RELAY_INFO_VERSION {
        return Err(RelayError::ParseError(format!(
            "unsupported relay info version: {}",
            payload.version
        )));
    }
    if payload.allowed_domain != bundle.allowed_domain {
        return Err(RelayError::DomainMismatch {
            expected: bundle.allowed_domain.clone(),
            actual: payload.allowed_domain.clone(),
        });
    }
    if !same_relay_url(&payload.relay_url, &bundle.relay_url) {
        return Err(RelayError::RelayUrlMismatch {
            expected: bundle.relay_url.clone(),
            actual: payload.relay_url.clone(),
        });
    }
    if parse_rfc3339(&payload.expires_at, "expires_at")? <= *now {
        return Err(RelayError::Expired {
            what: "Relay info",
            expires_at: payload.expires_at.clone(),
        });
    }
    Ok(())
}

/// Fetches and verifies relay info documents.
pub struct RelayInfoVerifier {
    transport: Arc<dyn RelayTransport>,
    signatures: Arc<SignatureVerifier>,
    clock: Arc<dyn TimeSource>,
}

impl RelayInfoVerifier {
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        signatures: Arc<SignatureVerifier>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            transport,
            signatures,
            clock,
        }
    }

    /// Fetch the tenant's info document and verify it against `bundle`.
    ///
    /// The bundle itself must not be expired; that is checked before any
    /// network call.
    pub fn fetch_and_verify(
        &self,
        bundle: &TrustedBundle,
        ctx: &FetchContext,
    ) -> Result<RelayInfoPayload, RelayError> {
        check_endpoint_inputs(&bundle.relay_url, &bundle.allowed_domain)?;
        bundle.ensure_not_expired(&self.clock.now())?;

        let url = build_relay_info_url(&bundle.relay_url, &bundle.allowed_domain);
        let request = RelayRequest {
            url: &url,
            bearer: Some(&bundle.bundle_token),
        };
        let body = self.transport.get(&request, ctx)?.into_ok_body(&url)?;
        let document = RelayInfoDocument::from_json(&body)?;
        self.verify_document(&document, bundle, ctx)
    }

    /// Verify an already fetched info document.
    ///
    /// The signature is checked over the `payload` string exactly as
    /// received, before the payload is decoded or trusted.
    pub fn verify_document(
        &self,
        document: &RelayInfoDocument,
        bundle: &TrustedBundle,
        ctx: &FetchContext,
    ) -> Result<RelayInfoPayload, RelayError> {
        let kid = self.signatures.verify_payload(
            &bundle.relay_url,
            &bundle.allowed_domain,
            &document.payload,
            &document.signatures,
            &bundle.relay_keys,
            ctx,
        )?;
        let payload = document.decode_payload()?;
        check_payload(&payload, bundle, &self.clock.now())?;
        log::debug!(
            "relay info for {} verified with key '{}', expires {}",
            bundle.allowed_domain,
            kid,
            payload.expires_at
        );
        Ok(payload)
    }
}
