//! Relay trust bundles
//!
//! A relay brokers OAuth token refresh for the CLI so that no long-lived
//! secret has to live in local configuration. Before the CLI sends anything
//! to a relay it establishes trust in two steps:
//!
//! 1. **Import.** Download the tenant's trust bundle, validate its manifest,
//!    verify the manifest signature against pinned keys that the relay also
//!    publishes, check every referenced file's hash, then persist a
//!    [`TrustedBundle`].
//! 2. **Check.** At session start or token refresh, fetch the relay's signed
//!    info document, verify it against the same pinned keys, and compare its
//!    rotation cutoff with the stored bundle.
//!
//! # Endpoints
//!
//! | Path | Auth |
//! |---|---|
//! | `{relay}/v1/relay/tenants/{domain}/bundle` | bearer bundle token |
//! | `{relay}/v1/relay/tenants/{domain}/info` | bearer bundle token |
//! | `{relay}/v1/relay/tenants/{domain}/certs` | none |
//!
//! # Example
//!
//! ```rust,ignore
//! use relaytrust::relay::{FetchContext, FileTrustStore, RelaySession, UreqTransport};
//! use relaytrust::time::SystemTimeSource;
//! use relaytrust::RelayConfig;
//! use std::sync::Arc;
//!
//! let config = RelayConfig::from_env()?;
//! let session = RelaySession::new(
//!     &config,
//!     Arc::new(UreqTransport::new(config.request_timeout, config.max_bundle_bytes)),
//!     Arc::new(FileTrustStore::new(config.store_path())),
//!     Arc::new(SystemTimeSource),
//! );
//! let ctx = FetchContext::with_timeout(config.request_timeout);
//! session.import("https://relay.example.com", "space.backlog.jp", &token, &ctx)?;
//! let check = session.check("space.backlog.jp", false, &ctx)?;
//! if !check.valid {
//!     // re-run the import
//! }
//! ```

pub mod archive;
pub mod bundle;
pub mod certs;
pub mod importer;
pub mod info;
pub mod integrity;
pub mod jws;
pub mod manifest;
pub mod session;
pub mod store;
pub mod transport;
pub mod update;
pub mod url;
pub mod verifier;

pub use archive::{ArchiveLimits, BundleContents, MANIFEST_MEMBER, SIGNATURE_MEMBER};
pub use bundle::{TrustedBundle, TrustedRelayKey};
pub use certs::{CachedJwks, CertsCache, JwksOrigin};
pub use importer::{BundleImporter, ImportRequest, ImportState};
pub use info::{RelayInfoDocument, RelayInfoPayload, RelayInfoVerifier};
pub use integrity::verify_files;
pub use jws::{SignatureDocument, SignatureEntry};
pub use manifest::{ManifestError, RelayBundleFileRef, RelayBundleKey, RelayBundleManifest};
pub use session::{RelaySession, TrustCheck};
pub use store::{
    FileTrustStore, MemoryTrustStore, TrustStore, TrustedBundles, TRUSTED_BUNDLES_PATH,
};
pub use transport::{
    CancellationToken, FetchContext, RelayRequest, RelayResponse, RelayTransport, UreqTransport,
};
pub use update::{check_bundle_update, BundleUpdateRequired};
pub use url::{build_bundle_url, build_certs_url, build_relay_info_url};
pub use verifier::{build_allowed_keys, verify_with_keys, AllowedKey, AllowedKeys, SignatureVerifier};
