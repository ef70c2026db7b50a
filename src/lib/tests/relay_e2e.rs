//! End-to-end tests for relay trust bundles
//!
//! These tests drive the complete flow against an in-process fake relay:
//! 1. Publish a JWKS and a signed bundle archive
//! 2. Import the bundle through `RelaySession`
//! 3. Check the stored bundle against a signed info document
//!
//! No test touches the network; the clock is a `FixedTimeSource`.

use ed25519_compact::KeyPair;
use relaytrust::crypto::{b64url_encode, sha256_hex, Jwk, Jwks};
use relaytrust::relay::jws::{sign_detached, SignatureEntry};
use relaytrust::relay::{
    build_bundle_url, build_certs_url, build_relay_info_url, CancellationToken, FetchContext,
    FileTrustStore, MemoryTrustStore, RelayBundleFileRef, RelayBundleKey, RelayBundleManifest,
    RelayInfoDocument, RelayInfoPayload, RelayRequest, RelayResponse, RelaySession,
    RelayTransport, SignatureDocument, TrustStore, TrustedBundle, TrustedRelayKey,
    MANIFEST_MEMBER, SIGNATURE_MEMBER,
};
use relaytrust::time::{FixedTimeSource, TimeSource};
use relaytrust::{ErrorKind, RelayConfig, RelayError};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;

const RELAY: &str = "https://relay.example.com";
const DOMAIN: &str = "space.backlog.jp";
const TOKEN: &str = "bundle-token-1";
const NOW: &str = "2025-01-15T00:00:00Z";
const ISSUED_AT: &str = "2025-01-10T12:00:00Z";
const EXPIRES_AT: &str = "2025-02-10T12:00:00Z";

// ============================================================================
// Fake relay
// ============================================================================

#[derive(Default)]
struct FakeRelay {
    routes: Mutex<HashMap<String, RelayResponse>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeRelay {
    fn serve(&self, url: String, status: u16, body: Vec<u8>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url, RelayResponse { status, body });
    }

    fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .count()
    }

    fn bearer_for(&self, url: &str) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(u, _)| u == url)
            .and_then(|(_, b)| b.clone())
    }
}

impl RelayTransport for FakeRelay {
    fn get(&self, request: &RelayRequest<'_>, ctx: &FetchContext) -> Result<RelayResponse, RelayError> {
        ctx.check(request.url)?;
        self.calls
            .lock()
            .unwrap()
            .push((request.url.to_string(), request.bearer.map(str::to_string)));
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(request.url)
            .cloned()
            .unwrap_or(RelayResponse {
                status: 404,
                body: b"not found".to_vec(),
            }))
    }
}

// ============================================================================
// Relay-side fixtures
// ============================================================================

struct SigningKey {
    kid: &'static str,
    kp: KeyPair,
}

impl SigningKey {
    fn new(kid: &'static str) -> Self {
        Self {
            kid,
            kp: KeyPair::generate(),
        }
    }

    fn jwk(&self) -> Jwk {
        Jwk::from_public_key(self.kid, &self.kp.pk).unwrap()
    }

    fn bundle_key(&self) -> RelayBundleKey {
        RelayBundleKey {
            key_id: self.kid.to_string(),
            thumbprint: self.jwk().thumbprint().unwrap(),
        }
    }

    fn pin(&self) -> TrustedRelayKey {
        TrustedRelayKey::from(&self.bundle_key())
    }
}

fn jwks_body(keys: &[&SigningKey]) -> Vec<u8> {
    serde_json::to_vec(&Jwks {
        keys: keys.iter().map(|k| k.jwk()).collect(),
    })
    .unwrap()
}

fn manifest(keys: &[&SigningKey], files: &[(&str, &[u8])]) -> RelayBundleManifest {
    RelayBundleManifest {
        version: 1,
        relay_url: format!("{}/", RELAY),
        allowed_domain: DOMAIN.to_string(),
        issued_at: ISSUED_AT.to_string(),
        expires_at: EXPIRES_AT.to_string(),
        relay_keys: keys.iter().map(|k| k.bundle_key()).collect(),
        files: files
            .iter()
            .map(|(name, data)| RelayBundleFileRef {
                name: name.to_string(),
                sha256: sha256_hex(data),
            })
            .collect(),
    }
}

fn sign_manifest(manifest_bytes: &[u8], signers: &[&SigningKey]) -> SignatureDocument {
    SignatureDocument {
        signatures: signers
            .iter()
            .map(|k| sign_detached(k.kid, manifest_bytes, &k.kp).unwrap().1)
            .collect(),
    }
}

fn zip_archive(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A complete bundle archive: manifest, signatures over it, and files.
fn bundle_archive(
    manifest: &RelayBundleManifest,
    signers: &[&SigningKey],
    files: &[(&str, &[u8])],
) -> Vec<u8> {
    let manifest_bytes = serde_json::to_vec(manifest).unwrap();
    let signatures = sign_manifest(&manifest_bytes, signers);
    let mut entries = vec![
        (MANIFEST_MEMBER, manifest_bytes),
        (SIGNATURE_MEMBER, signatures.to_json().unwrap()),
    ];
    for (name, data) in files {
        entries.push((*name, data.to_vec()));
    }
    zip_archive(&entries)
}

fn info_payload() -> RelayInfoPayload {
    RelayInfoPayload {
        version: 1,
        relay_url: RELAY.to_string(),
        allowed_domain: DOMAIN.to_string(),
        space: "space".to_string(),
        domain: "backlog.jp".to_string(),
        issued_at: "2025-01-14T23:55:00Z".to_string(),
        expires_at: "2025-01-15T01:00:00Z".to_string(),
        update_before: None,
    }
}

fn info_document(payload: &RelayInfoPayload, signer: &SigningKey) -> Vec<u8> {
    let payload_b64 = b64url_encode(&serde_json::to_vec(payload).unwrap()).unwrap();
    let entry = SignatureEntry::sign(signer.kid, &payload_b64, &signer.kp).unwrap();
    serde_json::to_vec(&RelayInfoDocument {
        payload: payload_b64,
        signatures: vec![entry],
    })
    .unwrap()
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    _dir: tempfile::TempDir,
    relay: Arc<FakeRelay>,
    clock: Arc<FixedTimeSource>,
    store: Arc<dyn TrustStore>,
    session: RelaySession,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(|c| c)
    }

    fn with_config(adjust: impl FnOnce(RelayConfig) -> RelayConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = adjust(RelayConfig::default().with_home_dir(dir.path()));
        let store: Arc<dyn TrustStore> = Arc::new(MemoryTrustStore::new());
        Self::build(dir, config, store)
    }

    fn build(dir: tempfile::TempDir, config: RelayConfig, store: Arc<dyn TrustStore>) -> Self {
        let relay = Arc::new(FakeRelay::default());
        let clock = Arc::new(FixedTimeSource::from_rfc3339(NOW).unwrap());
        let session = RelaySession::new(&config, relay.clone(), store.clone(), clock.clone());
        Self {
            _dir: dir,
            relay,
            clock,
            store,
            session,
        }
    }

    fn publish_certs(&self, keys: &[&SigningKey]) {
        self.relay
            .serve(build_certs_url(RELAY, DOMAIN), 200, jwks_body(keys));
    }

    fn publish_bundle(&self, archive: Vec<u8>) {
        self.relay.serve(build_bundle_url(RELAY, DOMAIN), 200, archive);
    }

    fn publish_info(&self, payload: &RelayInfoPayload, signer: &SigningKey) {
        self.relay.serve(
            build_relay_info_url(RELAY, DOMAIN),
            200,
            info_document(payload, signer),
        );
    }

    fn import(&self) -> Result<TrustedBundle, RelayError> {
        self.session
            .import(RELAY, DOMAIN, TOKEN, &FetchContext::background())
    }

    fn stored(&self) -> Option<TrustedBundle> {
        self.session.bundles().find(DOMAIN).unwrap()
    }

    /// Import a bundle signed by `key` with one policy file.
    fn import_signed_by(&self, key: &SigningKey) -> TrustedBundle {
        let policy: &[u8] = b"{\"scopes\":[\"issues:read\"]}";
        self.publish_certs(&[key]);
        self.publish_bundle(bundle_archive(
            &manifest(&[key], &[("policy.json", policy)]),
            &[key],
            &[("policy.json", policy)],
        ));
        self.import().unwrap()
    }
}

// ============================================================================
// Import
// ============================================================================

#[test]
fn test_import_persists_verified_bundle() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    let bundle = h.import_signed_by(&k1);

    assert_eq!(bundle.id, DOMAIN);
    assert_eq!(bundle.allowed_domain, DOMAIN);
    assert_eq!(bundle.bundle_token, TOKEN);
    assert_eq!(bundle.issued_at, ISSUED_AT);
    assert_eq!(bundle.expires_at, EXPIRES_AT);
    assert_eq!(bundle.imported_at, NOW);
    assert_eq!(bundle.relay_keys, vec![k1.pin()]);
    assert_eq!(h.stored(), Some(bundle));
    assert_eq!(h.store.get("relay.trusted_bundles").unwrap().len(), 1);
}

#[test]
fn test_bundle_and_info_carry_bearer_but_certs_do_not() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    h.import_signed_by(&k1);
    h.publish_info(&info_payload(), &k1);
    h.session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap();

    assert_eq!(
        h.relay.bearer_for(&build_bundle_url(RELAY, DOMAIN)).as_deref(),
        Some(TOKEN)
    );
    assert_eq!(
        h.relay.bearer_for(&build_relay_info_url(RELAY, DOMAIN)).as_deref(),
        Some(TOKEN)
    );
    assert_eq!(h.relay.bearer_for(&build_certs_url(RELAY, DOMAIN)), None);
}

#[test]
fn test_import_failures_leave_prior_record_untouched() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    let original = h.import_signed_by(&k1);
    let policy: &[u8] = b"policy v2";

    let rogue = SigningKey::new("rogue");
    let mut other_domain = manifest(&[&k1], &[]);
    other_domain.allowed_domain = "other.backlog.jp".to_string();
    let mut expired = manifest(&[&k1], &[]);
    expired.expires_at = "2025-01-14T00:00:00Z".to_string();
    let mut bad_version = manifest(&[&k1], &[]);
    bad_version.version = 2;

    let cases: Vec<(&str, Vec<u8>, ErrorKind)> = vec![
        (
            "tampered file",
            bundle_archive(
                &manifest(&[&k1], &[("policy.json", policy)]),
                &[&k1],
                &[("policy.json", b"policy v3")],
            ),
            ErrorKind::Integrity,
        ),
        (
            "missing file",
            bundle_archive(&manifest(&[&k1], &[("policy.json", policy)]), &[&k1], &[]),
            ErrorKind::Integrity,
        ),
        (
            "unpinned signer",
            bundle_archive(&manifest(&[&k1], &[]), &[&rogue], &[]),
            ErrorKind::Signature,
        ),
        (
            "unsigned",
            bundle_archive(&manifest(&[&k1], &[]), &[], &[]),
            ErrorKind::Signature,
        ),
        (
            "other domain",
            bundle_archive(&other_domain, &[&k1], &[]),
            ErrorKind::Signature,
        ),
        (
            "expired manifest",
            bundle_archive(&expired, &[&k1], &[]),
            ErrorKind::Expired,
        ),
        (
            "manifest version",
            bundle_archive(&bad_version, &[&k1], &[]),
            ErrorKind::Validation,
        ),
        (
            "no signature member",
            zip_archive(&[(MANIFEST_MEMBER, serde_json::to_vec(&manifest(&[&k1], &[])).unwrap())]),
            ErrorKind::Validation,
        ),
        ("not a zip", b"garbage".to_vec(), ErrorKind::Validation),
    ];

    for (name, archive, kind) in cases {
        h.publish_bundle(archive);
        let err = h.import().unwrap_err();
        assert_eq!(err.kind(), kind, "{}: {}", name, err);
        assert_eq!(h.stored().as_ref(), Some(&original), "{}", name);
    }

    h.relay.serve(build_bundle_url(RELAY, DOMAIN), 403, vec![]);
    assert!(matches!(
        h.import(),
        Err(RelayError::HttpStatus { status: 403, .. })
    ));
    assert_eq!(h.stored(), Some(original));
}

#[test]
fn test_payload_tampering_after_signing_is_rejected() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    h.publish_certs(&[&k1]);

    let signed = serde_json::to_vec(&manifest(&[&k1], &[])).unwrap();
    let signatures = sign_manifest(&signed, &[&k1]);
    let mut altered = manifest(&[&k1], &[]);
    altered.expires_at = "2099-01-01T00:00:00Z".to_string();
    h.publish_bundle(zip_archive(&[
        (MANIFEST_MEMBER, serde_json::to_vec(&altered).unwrap()),
        (SIGNATURE_MEMBER, signatures.to_json().unwrap()),
    ]));

    assert!(matches!(h.import(), Err(RelayError::SignatureError(_))));
    assert!(h.stored().is_none());
}

#[test]
fn test_first_import_requires_published_thumbprint() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    let impostor = SigningKey::new("k1");
    // The relay publishes a different key under the same kid
    h.publish_certs(&[&impostor]);
    h.publish_bundle(bundle_archive(&manifest(&[&k1], &[]), &[&k1], &[]));

    assert!(matches!(h.import(), Err(RelayError::SignatureError(_))));
    assert!(h.stored().is_none());
}

#[test]
fn test_configured_pins_take_priority_on_first_import() {
    let operator = SigningKey::new("ops");
    let k1 = SigningKey::new("k1");
    let h = Harness::with_config(|c| c.with_pinned_keys(vec![operator.pin()]));

    h.publish_certs(&[&k1, &operator]);
    h.publish_bundle(bundle_archive(&manifest(&[&k1], &[]), &[&k1], &[]));
    assert!(h.import().unwrap_err().indicates_tampering());

    h.publish_bundle(bundle_archive(&manifest(&[&k1], &[]), &[&k1, &operator], &[]));
    let bundle = h.import().unwrap();
    assert_eq!(bundle.relay_keys, vec![k1.pin()]);
}

#[test]
fn test_key_rotation_through_reimport() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    let k2 = SigningKey::new("k2");
    h.import_signed_by(&k1);

    // New bundle lists only k2, signed by the currently pinned k1
    h.publish_certs(&[&k1, &k2]);
    h.publish_bundle(bundle_archive(&manifest(&[&k2], &[]), &[&k1], &[]));
    let rotated = h.import().unwrap();
    assert_eq!(rotated.relay_keys, vec![k2.pin()]);

    // k1 is no longer pinned, so it can no longer sign
    h.publish_bundle(bundle_archive(&manifest(&[&k1], &[]), &[&k1], &[]));
    assert!(matches!(h.import(), Err(RelayError::SignatureError(_))));
    assert_eq!(h.stored(), Some(rotated));
}

#[test]
fn test_thumbprint_mismatch_skips_only_that_key() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    let k2 = SigningKey::new("k2");
    h.publish_certs(&[&k1, &k2]);
    h.publish_bundle(bundle_archive(&manifest(&[&k1, &k2], &[]), &[&k1], &[]));
    h.import().unwrap();

    // The relay swaps the key behind k1; k2 is untouched
    let swapped = SigningKey::new("k1");
    h.publish_certs(&[&swapped, &k2]);
    h.clock.advance(chrono::Duration::hours(2));

    let mut by_swapped = bundle_archive(&manifest(&[&k1, &k2], &[]), &[&swapped], &[]);
    h.publish_bundle(by_swapped.clone());
    assert!(h.import().is_err());

    by_swapped = bundle_archive(&manifest(&[&k1, &k2], &[]), &[&swapped, &k2], &[]);
    h.publish_bundle(by_swapped);
    assert!(h.import().is_ok());
}

#[test]
fn test_cancelled_import_stores_nothing() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    h.publish_certs(&[&k1]);
    h.publish_bundle(bundle_archive(&manifest(&[&k1], &[]), &[&k1], &[]));

    let token = CancellationToken::new();
    token.cancel();
    let ctx = FetchContext::background().with_cancellation(token);
    let err = h.session.import(RELAY, DOMAIN, TOKEN, &ctx).unwrap_err();
    assert!(matches!(err, RelayError::Cancelled));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(h.stored().is_none());
    assert_eq!(h.relay.calls_to(&build_bundle_url(RELAY, DOMAIN)), 0);
}

#[test]
fn test_invalid_domain_rejected_before_fetch() {
    let h = Harness::new();
    let err = h
        .session
        .import(RELAY, "space.backlog.jp/../x", TOKEN, &FetchContext::background())
        .unwrap_err();
    assert!(matches!(err, RelayError::InvalidArgument(_)));

    // Dot segments would send the token to another path on the relay
    for domain in ["..", "."] {
        let err = h
            .session
            .import(RELAY, domain, TOKEN, &FetchContext::background())
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidArgument(_)));
    }
    assert!(h.relay.calls.lock().unwrap().is_empty());
    assert!(h.stored().is_none());
}

// ============================================================================
// Session checks
// ============================================================================

#[test]
fn test_check_valid_bundle() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    h.import_signed_by(&k1);
    h.publish_info(&info_payload(), &k1);

    let check = h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap();
    assert!(check.valid);
    assert!(check.update_required.is_none());
    assert_eq!(check.bundle_token, TOKEN);
    assert_eq!(check.info.space, "space");
    assert!(!format!("{:?}", check).contains(TOKEN));
}

#[test]
fn test_check_rejects_signed_info_for_other_domain() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    h.import_signed_by(&k1);

    let mut payload = info_payload();
    payload.allowed_domain = "other.backlog.jp".to_string();
    h.publish_info(&payload, &k1);

    let err = h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap_err();
    assert!(matches!(err, RelayError::DomainMismatch { .. }));
    assert!(err.indicates_tampering());
}

#[test]
fn test_check_rejects_info_from_unpinned_key() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    let rogue = SigningKey::new("rogue");
    h.import_signed_by(&k1);
    h.publish_certs(&[&k1, &rogue]);
    h.publish_info(&info_payload(), &rogue);

    assert!(matches!(
        h.session.check(DOMAIN, false, &FetchContext::background()),
        Err(RelayError::SignatureError(_))
    ));
}

#[test]
fn test_check_rejects_expired_info() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    h.import_signed_by(&k1);
    let mut payload = info_payload();
    payload.expires_at = "2025-01-14T23:59:59Z".to_string();
    h.publish_info(&payload, &k1);

    let err = h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap_err();
    assert!(err.requires_reauthentication());
    assert!(!err.indicates_tampering());
}

#[test]
fn test_check_rotation_cutoff_marks_bundle_invalid() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    h.import_signed_by(&k1);

    let mut payload = info_payload();
    payload.update_before = Some("2025-01-12T00:00:00Z".to_string());
    h.publish_info(&payload, &k1);

    let check = h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap();
    assert!(!check.valid);
    let update = check.update_required.unwrap();
    assert_eq!(update.domain, DOMAIN);
    assert_eq!(update.issued_at, ISSUED_AT);
    assert_eq!(update.update_before, "2025-01-12T00:00:00Z");
    assert!(!update.forced);

    // A cutoff at or before the bundle's issue time is satisfied
    payload.update_before = Some(ISSUED_AT.to_string());
    h.publish_info(&payload, &k1);
    assert!(h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap()
        .valid);
}

#[test]
fn test_check_force_always_requires_update() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    h.import_signed_by(&k1);
    h.publish_info(&info_payload(), &k1);

    let check = h
        .session
        .check(DOMAIN, true, &FetchContext::background())
        .unwrap();
    assert!(!check.valid);
    assert!(check.update_required.unwrap().forced);
}

#[test]
fn test_check_expired_bundle_fails_before_network() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    h.import_signed_by(&k1);
    h.publish_info(&info_payload(), &k1);
    h.clock
        .set(relaytrust::time::parse_rfc3339("2025-03-01T00:00:00Z", "now").unwrap());

    let err = h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap_err();
    assert!(matches!(err, RelayError::Expired { .. }));
    assert_eq!(h.relay.calls_to(&build_relay_info_url(RELAY, DOMAIN)), 0);
}

#[test]
fn test_check_without_import() {
    let h = Harness::new();
    let err = h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap_err();
    assert!(matches!(err, RelayError::NotImported(_)));
    assert!(err.requires_reauthentication());
}

// ============================================================================
// Certs cache behavior through the session
// ============================================================================

#[test]
fn test_certs_served_from_cache_within_ttl() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    h.import_signed_by(&k1);
    h.publish_info(&info_payload(), &k1);
    let certs_url = build_certs_url(RELAY, DOMAIN);
    assert_eq!(h.relay.calls_to(&certs_url), 1);

    // The relay's certs endpoint goes down; cached keys still verify
    h.relay.serve(certs_url.clone(), 503, vec![]);
    h.clock.advance(chrono::Duration::minutes(30));
    assert!(h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap()
        .valid);
    assert_eq!(h.relay.calls_to(&certs_url), 1);

    // An explicit refresh falls back to the still-fresh entry
    let jwks = h
        .session
        .certs()
        .refresh(RELAY, DOMAIN, &FetchContext::background())
        .unwrap();
    assert_eq!(jwks.keys[0].kid, "k1");
    assert_eq!(h.relay.calls_to(&certs_url), 2);

    // Past the TTL there is nothing to fall back to
    h.clock.advance(chrono::Duration::minutes(31));
    let mut payload = info_payload();
    payload.expires_at = "2025-01-15T06:00:00Z".to_string();
    h.publish_info(&payload, &k1);
    assert!(matches!(
        h.session.check(DOMAIN, false, &FetchContext::background()),
        Err(RelayError::HttpStatus { status: 503, .. })
    ));
}

#[test]
fn test_missing_pinned_kid_forces_refresh() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    let k2 = SigningKey::new("k2");
    // Bundle pins k1 and k2, but the relay only publishes k1 so far
    h.publish_certs(&[&k1]);
    h.publish_bundle(bundle_archive(&manifest(&[&k1, &k2], &[]), &[&k1], &[]));
    h.import().unwrap();
    let certs_url = build_certs_url(RELAY, DOMAIN);
    // A JWKS fetched just now is not refetched for the missing kid
    assert_eq!(h.relay.calls_to(&certs_url), 1);

    // The relay starts publishing k2 and signs with it; the cached JWKS is
    // still fresh but lacks k2, so it is refreshed once
    h.publish_certs(&[&k1, &k2]);
    h.publish_info(&info_payload(), &k2);
    assert!(h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap()
        .valid);
    assert_eq!(h.relay.calls_to(&certs_url), 2);

    // Now every pinned kid is cached
    assert!(h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap()
        .valid);
    assert_eq!(h.relay.calls_to(&certs_url), 2);
}

#[test]
fn test_retired_pinned_kid_refreshes_once_per_ttl() {
    let h = Harness::new();
    let k1 = SigningKey::new("k1");
    let k2 = SigningKey::new("k2");
    // Bundle pins k1 and k2; the relay has retired k2 and publishes only k1
    h.publish_certs(&[&k1]);
    h.publish_bundle(bundle_archive(&manifest(&[&k1, &k2], &[]), &[&k1], &[]));
    h.import().unwrap();
    let certs_url = build_certs_url(RELAY, DOMAIN);
    assert_eq!(h.relay.calls_to(&certs_url), 1);

    h.publish_info(&info_payload(), &k1);
    for _ in 0..5 {
        h.clock.advance(chrono::Duration::minutes(5));
        assert!(h
            .session
            .check(DOMAIN, false, &FetchContext::background())
            .unwrap()
            .valid);
    }
    assert_eq!(h.relay.calls_to(&certs_url), 2);

    // Past the TTL the entry is refetched as usual, without an extra forced fetch
    h.clock.advance(chrono::Duration::minutes(40));
    let mut payload = info_payload();
    payload.expires_at = "2025-01-15T06:00:00Z".to_string();
    h.publish_info(&payload, &k1);
    assert!(h
        .session
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap()
        .valid);
    assert_eq!(h.relay.calls_to(&certs_url), 3);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_file_store_survives_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = RelayConfig::default().with_home_dir(dir.path());
    let store_path = config.store_path();
    let k1 = SigningKey::new("k1");

    let store: Arc<dyn TrustStore> = Arc::new(FileTrustStore::new(&store_path));
    let h = Harness::build(dir, config.clone(), store);
    let imported = h.import_signed_by(&k1);

    let reopened = RelaySession::new(
        &config,
        h.relay.clone(),
        Arc::new(FileTrustStore::new(&store_path)),
        h.clock.clone(),
    );
    assert_eq!(reopened.bundle(DOMAIN).unwrap(), imported);
    assert!(h.clock.now() < imported.expires_at_time().unwrap());

    h.publish_info(&info_payload(), &k1);
    assert!(reopened
        .check(DOMAIN, false, &FetchContext::background())
        .unwrap()
        .valid);
}
