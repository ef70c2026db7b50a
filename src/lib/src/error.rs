use crate::relay::manifest::ManifestError;
use crate::relay::update::BundleUpdateRequired;

/// Broad classification of a [`RelayError`].
///
/// Callers map these to user-facing messages; the important split is between
/// conditions that mean "please re-authenticate" and conditions that mean
/// "this material appears tampered with".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Signature,
    Integrity,
    Network,
    Cancelled,
    Expired,
    UpdateRequired,
    Storage,
    Internal,
}

/// The relaytrust error type.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Internal error: [{0}]")]
    InternalError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error")]
    IOError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid relay bundle manifest: {0}")]
    InvalidManifest(#[from] ManifestError),

    #[error("Invalid key '{kid}': {reason}")]
    InvalidKey { kid: String, reason: String },

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Invalid bundle archive: {0}")]
    ArchiveError(String),

    #[error("No valid signatures: {0}")]
    SignatureError(String),

    #[error("File '{0}' referenced by the manifest is missing from the bundle")]
    MissingFile(String),

    #[error("Hash mismatch for '{name}': expected {expected}, got {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Allowed domain mismatch: expected '{expected}', got '{actual}'")]
    DomainMismatch { expected: String, actual: String },

    #[error("Relay URL mismatch: expected '{expected}', got '{actual}'")]
    RelayUrlMismatch { expected: String, actual: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Relay returned HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{what} expired at {expires_at}")]
    Expired { what: &'static str, expires_at: String },

    #[error("{0}")]
    BundleUpdateRequired(BundleUpdateRequired),

    #[error("No trusted bundle imported for '{0}'")]
    NotImported(String),

    #[error("Trust store error: {0}")]
    StorageError(String),

    #[error("Time error: {0}")]
    TimeError(String),

    #[error("Ed25519 signature function error")]
    CryptoError(#[from] ed25519_compact::Error),
}

impl RelayError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::InvalidArgument(_)
            | RelayError::ParseError(_)
            | RelayError::InvalidManifest(_)
            | RelayError::InvalidKey { .. }
            | RelayError::UnsupportedKeyType(_)
            | RelayError::ArchiveError(_)
            | RelayError::TimeError(_) => ErrorKind::Validation,
            RelayError::SignatureError(_)
            | RelayError::CryptoError(_)
            | RelayError::DomainMismatch { .. }
            | RelayError::RelayUrlMismatch { .. } => ErrorKind::Signature,
            RelayError::MissingFile(_) | RelayError::HashMismatch { .. } => ErrorKind::Integrity,
            RelayError::NetworkError(_)
            | RelayError::HttpStatus { .. }
            | RelayError::DeadlineExceeded(_) => ErrorKind::Network,
            RelayError::Cancelled => ErrorKind::Cancelled,
            RelayError::Expired { .. } | RelayError::NotImported(_) => ErrorKind::Expired,
            RelayError::BundleUpdateRequired(_) => ErrorKind::UpdateRequired,
            RelayError::StorageError(_) | RelayError::IOError(_) => ErrorKind::Storage,
            RelayError::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// True when the user should simply re-authenticate and re-import.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self.kind(), ErrorKind::Expired | ErrorKind::UpdateRequired)
    }

    /// True when the error suggests the bundle or attestation was tampered with.
    pub fn indicates_tampering(&self) -> bool {
        matches!(self.kind(), ErrorKind::Signature | ErrorKind::Integrity)
    }

    /// True for deadline or cancellation errors, which callers usually
    /// report differently from relay failures.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RelayError::Cancelled | RelayError::DeadlineExceeded(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::ParseError(err.to_string())
    }
}

impl From<zip::result::ZipError> for RelayError {
    fn from(err: zip::result::ZipError) -> Self {
        RelayError::ArchiveError(err.to_string())
    }
}
