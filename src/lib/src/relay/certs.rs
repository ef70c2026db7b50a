//! Disk-backed JWKS cache
//!
//! One file per (relay URL, tenant domain) pair under the cache directory,
//! named by the hex SHA-256 of the pair. Each file records when the JWKS was
//! fetched so entries can be aged against a TTL.
//!
//! Lookup rules:
//!
//! - [`CertsCache::jwks`] serves a fresh entry without touching the network
//! - [`CertsCache::refresh`] always tries the network first
//! - [`CertsCache::force_refresh`] is a network-first lookup whose entry is
//!   marked, so callers can tell it was already refetched in this TTL window
//! - a failed fetch falls back to an entry that is still within its TTL
//! - cancellation is returned as-is, never replaced by cached data
//! - an unreadable or corrupt entry is treated as a miss

use super::transport::{FetchContext, RelayRequest, RelayTransport};
use super::url::{build_certs_url, check_endpoint_inputs, normalize_relay_url};
use crate::crypto::{sha256_hex, Jwks};
use crate::error::RelayError;
use crate::secure_file;
use crate::time::{format_rfc3339, parse_rfc3339, TimeSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// On-disk cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    relay_url: String,
    domain: String,
    fetched_at: String,
    #[serde(default)]
    forced: bool,
    /// Response body exactly as served by the relay.
    jwks: String,
}

/// A JWKS together with the time it was fetched.
#[derive(Debug, Clone)]
pub struct CachedJwks {
    pub jwks: Jwks,
    pub fetched_at: DateTime<Utc>,
    /// Fetched by [`CertsCache::force_refresh`].
    pub forced: bool,
}

impl CachedJwks {
    /// True if the entry is younger than `ttl` at `now`.
    ///
    /// An entry stamped in the future is never fresh.
    pub fn is_fresh(&self, now: &DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        if age < chrono::Duration::zero() {
            return false;
        }
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age < ttl,
            Err(_) => true,
        }
    }
}

/// Where a looked-up JWKS came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwksOrigin {
    /// A fresh cache entry, no request made.
    Cache,
    /// Fetched from the relay just now.
    Network,
    /// The fetch failed and a fresh cache entry stood in.
    Fallback,
}

/// TTL-bound cache of relay signing keys.
pub struct CertsCache {
    transport: Arc<dyn RelayTransport>,
    clock: Arc<dyn TimeSource>,
    cache_dir: PathBuf,
    ttl: Duration,
}

impl CertsCache {
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        clock: Arc<dyn TimeSource>,
        cache_dir: impl Into<PathBuf>,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            clock,
            cache_dir: cache_dir.into(),
            ttl,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Path of the cache file for a (relay, domain) pair.
    pub fn entry_path(&self, relay_url: &str, domain: &str) -> PathBuf {
        let key = format!("{}\n{}", normalize_relay_url(relay_url), domain);
        self.cache_dir.join(format!("{}.json", sha256_hex(key.as_bytes())))
    }

    /// Read the cached entry regardless of age.
    ///
    /// Returns `None` for a missing, unreadable or corrupt file, or for a file
    /// that belongs to a different (relay, domain) pair.
    pub fn cached(&self, relay_url: &str, domain: &str) -> Option<CachedJwks> {
        let path = self.entry_path(relay_url, domain);
        let data = match secure_file::read_secure_if_exists(&path) {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Ignoring unreadable certs cache '{}': {}", path.display(), e);
                return None;
            }
        };
        match Self::decode_entry(&data, relay_url, domain) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Ignoring corrupt certs cache '{}': {}", path.display(), e);
                None
            }
        }
    }

    fn decode_entry(data: &[u8], relay_url: &str, domain: &str) -> Result<CachedJwks, RelayError> {
        let file: CacheFile = serde_json::from_slice(data)?;
        if normalize_relay_url(&file.relay_url) != normalize_relay_url(relay_url)
            || file.domain != domain
        {
            return Err(RelayError::ParseError(format!(
                "entry is for {} / {}",
                file.relay_url, file.domain
            )));
        }
        Ok(CachedJwks {
            jwks: Jwks::from_slice(file.jwks.as_bytes())?,
            fetched_at: parse_rfc3339(&file.fetched_at, "fetched_at")?,
            forced: file.forced,
        })
    }

    /// Cache-first lookup.
    pub fn jwks(&self, relay_url: &str, domain: &str, ctx: &FetchContext) -> Result<Jwks, RelayError> {
        Ok(self.lookup(relay_url, domain, ctx)?.0.jwks)
    }

    /// Cache-first lookup that also reports where the entry came from.
    pub fn lookup(
        &self,
        relay_url: &str,
        domain: &str,
        ctx: &FetchContext,
    ) -> Result<(CachedJwks, JwksOrigin), RelayError> {
        check_endpoint_inputs(relay_url, domain)?;
        let now = self.clock.now();
        let cached = self.cached(relay_url, domain);
        if let Some(entry) = &cached {
            if entry.is_fresh(&now, self.ttl) {
                log::debug!("certs cache hit for {} / {}", relay_url, domain);
                return Ok((entry.clone(), JwksOrigin::Cache));
            }
            log::debug!("certs cache entry for {} / {} is stale", relay_url, domain);
        } else {
            log::debug!("certs cache miss for {} / {}", relay_url, domain);
        }
        self.fetch_or_fallback(relay_url, domain, cached, false, ctx)
    }

    /// Network-first lookup. Falls back to a fresh cached entry if the fetch
    /// fails for any reason other than cancellation.
    pub fn refresh(&self, relay_url: &str, domain: &str, ctx: &FetchContext) -> Result<Jwks, RelayError> {
        check_endpoint_inputs(relay_url, domain)?;
        log::debug!("refreshing certs for {} / {}", relay_url, domain);
        let cached = self.cached(relay_url, domain);
        Ok(self.fetch_or_fallback(relay_url, domain, cached, false, ctx)?.0.jwks)
    }

    /// Like [`CertsCache::refresh`], but the stored entry is marked as
    /// forced until it ages out.
    pub fn force_refresh(&self, relay_url: &str, domain: &str, ctx: &FetchContext) -> Result<Jwks, RelayError> {
        check_endpoint_inputs(relay_url, domain)?;
        log::debug!("forcing certs refresh for {} / {}", relay_url, domain);
        let cached = self.cached(relay_url, domain);
        Ok(self.fetch_or_fallback(relay_url, domain, cached, true, ctx)?.0.jwks)
    }

    fn fetch_or_fallback(
        &self,
        relay_url: &str,
        domain: &str,
        cached: Option<CachedJwks>,
        forced: bool,
        ctx: &FetchContext,
    ) -> Result<(CachedJwks, JwksOrigin), RelayError> {
        let err = match self.fetch_and_store(relay_url, domain, forced, ctx) {
            Ok(entry) => return Ok((entry, JwksOrigin::Network)),
            Err(e) => e,
        };
        if matches!(err, RelayError::Cancelled) {
            return Err(err);
        }
        let now = self.clock.now();
        match cached {
            Some(entry) if entry.is_fresh(&now, self.ttl) => {
                log::warn!(
                    "Fetching certs for {} / {} failed ({}); using cached keys from {}",
                    relay_url,
                    domain,
                    err,
                    format_rfc3339(&entry.fetched_at)
                );
                Ok((entry, JwksOrigin::Fallback))
            }
            _ => Err(err),
        }
    }

    fn fetch_and_store(
        &self,
        relay_url: &str,
        domain: &str,
        forced: bool,
        ctx: &FetchContext,
    ) -> Result<CachedJwks, RelayError> {
        let url = build_certs_url(relay_url, domain);
        let request = RelayRequest {
            url: &url,
            bearer: None,
        };
        let body = self.transport.get(&request, ctx)?.into_ok_body(&url)?;
        let jwks = Jwks::from_slice(&body)?;
        let raw = String::from_utf8(body)
            .map_err(|_| RelayError::ParseError("JWKS is not valid UTF-8".to_string()))?;

        let fetched_at = self.clock.now();
        let file = CacheFile {
            relay_url: normalize_relay_url(relay_url).to_string(),
            domain: domain.to_string(),
            fetched_at: format_rfc3339(&fetched_at),
            forced,
            jwks: raw,
        };
        let path = self.entry_path(relay_url, domain);
        secure_file::write_atomic(&path, &serde_json::to_vec_pretty(&file)?)?;
        log::debug!(
            "cached {} key(s) for {} / {} at '{}'",
            jwks.keys.len(),
            relay_url,
            domain,
            path.display()
        );
        Ok(CachedJwks {
            jwks,
            fetched_at,
            forced,
        })
    }
}
