//! Blocking HTTP transport with deadlines and cancellation
//!
//! Every relay fetch goes through [`RelayTransport`] and carries a
//! [`FetchContext`]. The context bounds how long a call may block and lets
//! another thread cancel it; both conditions surface as dedicated errors
//! ([`RelayError::DeadlineExceeded`], [`RelayError::Cancelled`]) rather than
//! as generic network failures.

use crate::error::RelayError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Observed by every context sharing this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation for one logical operation.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl FetchContext {
    /// No deadline, not cancellable from outside.
    pub fn background() -> Self {
        Self::default()
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Tighten the deadline to at most `timeout` from now.
    pub fn bounded_by(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time left before the deadline, `None` if unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail if cancelled or past the deadline. `what` names the operation.
    pub fn check(&self, what: &str) -> Result<(), RelayError> {
        if self.cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }
        if self.remaining() == Some(Duration::ZERO) {
            return Err(RelayError::DeadlineExceeded(what.to_string()));
        }
        Ok(())
    }
}

/// A GET request to a relay endpoint.
#[derive(Clone, Copy)]
pub struct RelayRequest<'a> {
    pub url: &'a str,
    /// Bearer credential, if the endpoint requires one.
    pub bearer: Option<&'a str>,
}

impl std::fmt::Debug for RelayRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayRequest")
            .field("url", &self.url)
            .field("bearer", &self.bearer.map(|_| "<redacted>"))
            .finish()
    }
}

/// Raw response from a relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RelayResponse {
    /// Return the body if the status is 200, else [`RelayError::HttpStatus`].
    pub fn into_ok_body(self, url: &str) -> Result<Vec<u8>, RelayError> {
        if self.status != 200 {
            return Err(RelayError::HttpStatus {
                url: url.to_string(),
                status: self.status,
            });
        }
        Ok(self.body)
    }
}

/// Blocking HTTP GET used for all relay endpoints.
///
/// Implementations must return `Ok` for any HTTP status (status handling is
/// the caller's job), honor the context's deadline, and map a timeout to
/// [`RelayError::DeadlineExceeded`].
pub trait RelayTransport: Send + Sync {
    fn get(&self, request: &RelayRequest<'_>, ctx: &FetchContext) -> Result<RelayResponse, RelayError>;
}

/// Production transport backed by `ureq`.
pub struct UreqTransport {
    client: ureq::Agent,
    max_body_bytes: u64,
}

impl UreqTransport {
    /// Create a transport with a default per-request timeout and body limit.
    pub fn new(default_timeout: Duration, max_body_bytes: u64) -> Self {
        // Return a Response for every status so callers can report it
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(default_timeout))
            .build()
            .into();
        Self {
            client: agent,
            max_body_bytes,
        }
    }

    fn map_error(url: &str, err: ureq::Error) -> RelayError {
        match err {
            ureq::Error::Timeout(t) => RelayError::DeadlineExceeded(format!("{} ({})", url, t)),
            ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                RelayError::DeadlineExceeded(format!("{} ({})", url, e))
            }
            other => RelayError::NetworkError(format!("GET {} failed: {}", url, other)),
        }
    }
}

impl RelayTransport for UreqTransport {
    fn get(&self, request: &RelayRequest<'_>, ctx: &FetchContext) -> Result<RelayResponse, RelayError> {
        ctx.check(request.url)?;

        let mut builder = self.client.get(request.url);
        if let Some(remaining) = ctx.remaining() {
            builder = builder.config().timeout_global(Some(remaining)).build();
        }
        if let Some(token) = request.bearer {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let response = builder
            .call()
            .map_err(|e| Self::map_error(request.url, e))?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .with_config()
            .limit(self.max_body_bytes)
            .read_to_vec()
            .map_err(|e| Self::map_error(request.url, e))?;

        // Cancellation requested mid-flight still wins over a late response
        ctx.check(request.url)?;

        log::debug!("GET {} -> {} ({} bytes)", request.url, status, body.len());
        Ok(RelayResponse { status, body })
    }
}
