//! Relay endpoint URLs
//!
//! Relay URLs are compared and joined ignoring trailing slashes only: no
//! case folding, no default-port or path normalization.

use crate::error::RelayError;

const TENANTS_PREFIX: &str = "/v1/relay/tenants";

/// Strip trailing slashes from a relay URL.
pub fn normalize_relay_url(relay_url: &str) -> &str {
    relay_url.trim_end_matches('/')
}

/// Trailing-slash-insensitive relay URL equality.
pub fn same_relay_url(a: &str, b: &str) -> bool {
    normalize_relay_url(a) == normalize_relay_url(b)
}

fn tenant_endpoint(relay_url: &str, domain: &str, leaf: &str) -> String {
    format!(
        "{}{}/{}/{}",
        normalize_relay_url(relay_url),
        TENANTS_PREFIX,
        domain,
        leaf
    )
}

/// `{relay_url}/v1/relay/tenants/{domain}/bundle`
pub fn build_bundle_url(relay_url: &str, domain: &str) -> String {
    tenant_endpoint(relay_url, domain, "bundle")
}

/// `{relay_url}/v1/relay/tenants/{domain}/info`
pub fn build_relay_info_url(relay_url: &str, domain: &str) -> String {
    tenant_endpoint(relay_url, domain, "info")
}

/// `{relay_url}/v1/relay/tenants/{domain}/certs`
pub fn build_certs_url(relay_url: &str, domain: &str) -> String {
    tenant_endpoint(relay_url, domain, "certs")
}

/// Dot-separated labels of ASCII letters, digits and `-`.
///
/// Rules out path separators, escapes and the `.` / `..` segments.
fn is_hostname(domain: &str) -> bool {
    !domain.is_empty()
        && domain.len() <= 253
        && domain.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

/// Reject values that cannot be a relay URL or a single tenant path segment.
pub fn check_endpoint_inputs(relay_url: &str, domain: &str) -> Result<(), RelayError> {
    let relay = normalize_relay_url(relay_url);
    if !(relay.starts_with("https://") || relay.starts_with("http://")) {
        return Err(RelayError::InvalidArgument(format!(
            "relay URL '{}' must be an http(s) URL",
            relay_url
        )));
    }
    if relay.contains(['?', '#']) || relay.chars().any(char::is_whitespace) {
        return Err(RelayError::InvalidArgument(format!(
            "relay URL '{}' must not contain a query, fragment or whitespace",
            relay_url
        )));
    }
    if !is_hostname(domain) {
        return Err(RelayError::InvalidArgument(format!(
            "'{}' is not a valid tenant domain",
            domain
        )));
    }
    Ok(())
}
