//! Time sources and RFC 3339 helpers
//!
//! Every component that compares against "now" takes a [`TimeSource`]
//! instead of reading the wall clock directly, so expiry and cache-TTL
//! decisions can be replayed deterministically in tests.
//!
//! ```rust,ignore
//! use relaytrust::time::{TimeSource, SystemTimeSource, FixedTimeSource};
//!
//! let system = SystemTimeSource;
//! let now = system.now();
//!
//! let fixed = FixedTimeSource::from_rfc3339("2025-01-15T00:00:00Z")?;
//! assert_eq!(fixed.now().to_rfc3339(), "2025-01-15T00:00:00+00:00");
//! ```

use crate::error::RelayError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Mutex;

/// Time source abstraction for pluggable clocks.
pub trait TimeSource: Send + Sync {
    /// Current time according to this source.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as an RFC 3339 string with second precision.
    fn now_rfc3339(&self) -> String {
        format_rfc3339(&self.now())
    }
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed time source for testing and replaying a verification at a known instant.
///
/// The instant can be moved with [`FixedTimeSource::set`], which lets a test
/// age a cache entry past its TTL without sleeping.
#[derive(Debug)]
pub struct FixedTimeSource {
    timestamp: Mutex<DateTime<Utc>>,
}

impl FixedTimeSource {
    /// Create a source pinned at `timestamp`.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Mutex::new(timestamp),
        }
    }

    /// Create a source from an RFC 3339 string.
    pub fn from_rfc3339(s: &str) -> Result<Self, RelayError> {
        Ok(Self::new(parse_rfc3339(s, "fixed time")?))
    }

    /// Move the pinned instant.
    pub fn set(&self, timestamp: DateTime<Utc>) {
        if let Ok(mut guard) = self.timestamp.lock() {
            *guard = timestamp;
        }
    }

    /// Move the pinned instant forward.
    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.timestamp.lock() {
            *guard += by;
        }
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        match self.timestamp.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Parse an RFC 3339 timestamp into UTC.
///
/// `field` names the value in the error message (e.g. `"issued_at"`).
pub fn parse_rfc3339(s: &str, field: &str) -> Result<DateTime<Utc>, RelayError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RelayError::TimeError(format!("invalid {} '{}': {}", field, s, e)))
}

/// Format a UTC instant as RFC 3339 with a `Z` suffix and second precision.
pub fn format_rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
