//! Rotation cutoff evaluation
//!
//! A relay requests re-import by publishing `update_before` in its info
//! document. Any bundle issued strictly before that instant is stale.

use super::bundle::TrustedBundle;
use super::info::RelayInfoPayload;
use crate::error::RelayError;
use crate::time::parse_rfc3339;
use std::fmt;

/// Signal that the locally trusted bundle must be re-imported.
///
/// This is not a verification failure. It carries enough context for the
/// caller to explain why a re-import is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleUpdateRequired {
    pub domain: String,
    pub update_before: String,
    pub issued_at: String,
    /// Set when the caller asked for the update unconditionally.
    pub forced: bool,
}

impl BundleUpdateRequired {
    /// An update requested by the caller, independent of any timestamps.
    pub fn forced() -> Self {
        Self {
            forced: true,
            ..Self::default()
        }
    }
}

impl fmt::Display for BundleUpdateRequired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.forced {
            return write!(f, "Bundle update required (forced)");
        }
        write!(
            f,
            "Bundle update required for '{}': issued at {}, relay requires bundles issued at or after {}",
            self.domain, self.issued_at, self.update_before
        )
    }
}

/// Decide whether `bundle` is still authoritative given the relay's `info`.
///
/// `force` always yields an update. Without both an info payload and a
/// bundle there is nothing to compare and the result is `Ok`.
pub fn check_bundle_update(
    info: Option<&RelayInfoPayload>,
    bundle: Option<&TrustedBundle>,
    force: bool,
) -> Result<(), RelayError> {
    if force {
        return Err(RelayError::BundleUpdateRequired(BundleUpdateRequired::forced()));
    }
    let (info, bundle) = match (info, bundle) {
        (Some(info), Some(bundle)) => (info, bundle),
        _ => return Ok(()),
    };
    let update_before = match info.update_before.as_deref() {
        Some(cutoff) if !cutoff.is_empty() => cutoff,
        _ => return Ok(()),
    };

    let cutoff = parse_rfc3339(update_before, "update_before")?;
    let issued_at = parse_rfc3339(&bundle.issued_at, "issued_at")?;
    if issued_at < cutoff {
        log::debug!(
            "bundle for {} issued at {} predates cutoff {}",
            bundle.allowed_domain,
            bundle.issued_at,
            update_before
        );
        return Err(RelayError::BundleUpdateRequired(BundleUpdateRequired {
            domain: bundle.allowed_domain.clone(),
            update_before: update_before.to_string(),
            issued_at: bundle.issued_at.clone(),
            forced: false,
        }));
    }
    Ok(())
}
