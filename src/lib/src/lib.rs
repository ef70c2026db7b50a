//! Relay trust-bundle verification and key-rotation detection.

// `relay::RelaySession` is what most callers need: it imports bundles and answers whether a stored bundle may still be used.
// The lower-level pieces (`relay::verifier`, `relay::certs`, `crypto`) are public for tools that verify documents offline.

#![forbid(unsafe_code)]

mod error;

/// Configuration for relay trust checks
///
/// Cache TTL, request timeout, size limits and first-import pins, with
/// `RELAYTRUST_*` environment overrides.
pub mod config;

/// Ed25519 JWKs, RFC 7638 thumbprints, SHA-256 and base64url
pub mod crypto;

/// Trust-bundle import, signed relay attestation and rotation checks
pub mod relay;

/// Secure file operations with restrictive permissions
///
/// Trust records carry bearer tokens, so they and the certs cache are
/// written owner-only (0600 on Unix) and replaced atomically.
pub mod secure_file;

/// Time source abstraction
///
/// Every expiry and TTL decision reads "now" through a [`time::TimeSource`],
/// so tests can pin or advance the clock.
pub mod time;

pub use config::RelayConfig;
pub use error::*;

pub mod reexports {
    pub use {chrono, ct_codecs, ed25519_compact, hmac_sha256, log, thiserror, ureq, zip};
}
