//! Configuration for relay trust checks

use crate::error::RelayError;
use crate::relay::{ArchiveLimits, TrustedRelayKey};
use std::path::PathBuf;
use std::time::Duration;

/// Overrides the base directory.
pub const ENV_HOME: &str = "RELAYTRUST_HOME";
/// Overrides the certs cache TTL, in seconds.
pub const ENV_CERTS_TTL_SECS: &str = "RELAYTRUST_CERTS_TTL_SECS";
/// Overrides the per-request timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "RELAYTRUST_TIMEOUT_SECS";
/// First-import pins, as `kid=thumbprint` pairs separated by commas.
pub const ENV_PINNED_KEYS: &str = "RELAYTRUST_PINNED_KEYS";

/// Configuration for relay trust checks
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Base directory for the certs cache and the file trust store
    pub home_dir: PathBuf,

    /// How long a fetched JWKS is served from cache
    ///
    /// Also bounds how long a cached JWKS may stand in for the relay when a
    /// refresh fails.
    pub certs_ttl: Duration,

    /// Upper bound for a single relay request
    pub request_timeout: Duration,

    /// Maximum size of a downloaded bundle archive
    pub max_bundle_bytes: u64,

    /// Maximum size of one archive member
    pub max_member_bytes: u64,

    /// Keys trusted on first import, when no bundle exists for a domain
    ///
    /// Empty means the first import trusts the manifest's own keys, provided
    /// they match the relay's published thumbprints.
    pub pinned_keys: Vec<TrustedRelayKey>,
}

fn default_home_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".relaytrust"),
        None => PathBuf::from(".relaytrust"),
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            certs_ttl: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(30),
            max_bundle_bytes: 32 * 1024 * 1024,
            max_member_bytes: 8 * 1024 * 1024,
            pinned_keys: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Create config for interactive CLI use (the default)
    pub fn interactive() -> Self {
        Self::default()
    }

    /// Create config for environments that must notice key rotation quickly
    pub fn strict() -> Self {
        Self {
            certs_ttl: Duration::from_secs(5 * 60),
            request_timeout: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Create config for flaky networks, tolerating a day-old JWKS
    pub fn tolerant() -> Self {
        Self {
            certs_ttl: Duration::from_secs(24 * 3600),
            request_timeout: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `RELAYTRUST_*` environment variables
    pub fn from_env() -> Result<Self, RelayError> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup`, keyed by environment variable name
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RelayError> {
        if let Some(home) = lookup(ENV_HOME).filter(|v| !v.is_empty()) {
            self.home_dir = PathBuf::from(home);
        }
        if let Some(secs) = lookup(ENV_CERTS_TTL_SECS) {
            self.certs_ttl = parse_secs(ENV_CERTS_TTL_SECS, &secs)?;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout = parse_secs(ENV_TIMEOUT_SECS, &secs)?;
        }
        if let Some(pins) = lookup(ENV_PINNED_KEYS) {
            self.pinned_keys = parse_pins(&pins)?;
        }
        Ok(self)
    }

    /// Set base directory
    pub fn with_home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.home_dir = dir.into();
        self
    }

    /// Set certs cache TTL
    pub fn with_certs_ttl(mut self, ttl: Duration) -> Self {
        self.certs_ttl = ttl;
        self
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set first-import pins
    pub fn with_pinned_keys(mut self, keys: Vec<TrustedRelayKey>) -> Self {
        self.pinned_keys = keys;
        self
    }

    /// Directory holding one JWKS cache file per (relay, domain)
    pub fn cache_dir(&self) -> PathBuf {
        self.home_dir.join("certs")
    }

    /// File trust store location
    pub fn store_path(&self) -> PathBuf {
        self.home_dir.join("trust.json")
    }

    /// Archive limits derived from the size settings
    pub fn archive_limits(&self) -> ArchiveLimits {
        ArchiveLimits {
            max_archive_bytes: self.max_bundle_bytes,
            max_member_bytes: self.max_member_bytes,
            ..ArchiveLimits::default()
        }
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration, RelayError> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|_| RelayError::InvalidArgument(format!("{} must be a number of seconds, got '{}'", name, value)))?;
    if secs == 0 {
        return Err(RelayError::InvalidArgument(format!("{} must be positive", name)));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse `kid=thumbprint[,kid=thumbprint...]`.
pub fn parse_pins(value: &str) -> Result<Vec<TrustedRelayKey>, RelayError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((kid, tp)) if !kid.trim().is_empty() && !tp.trim().is_empty() => Ok(TrustedRelayKey {
                key_id: kid.trim().to_string(),
                thumbprint: tp.trim().to_string(),
            }),
            _ => Err(RelayError::InvalidArgument(format!(
                "pinned key '{}' must be kid=thumbprint",
                pair
            ))),
        })
        .collect()
}
