//! Persistence of trusted bundles
//!
//! Trusted bundles are kept under a single key, [`TRUSTED_BUNDLES_PATH`], in
//! a generic key/value store supplied by the host application. This module
//! defines that store interface, two backends, and [`TrustedBundles`], the
//! accessor the rest of the crate uses.
//!
//! # Backends
//!
//! - [`MemoryTrustStore`]: process-local, for tests and embedding
//! - [`FileTrustStore`]: one owner-only JSON file, replaced atomically on
//!   every write
//!
//! # Example
//!
//! ```rust,ignore
//! use relaytrust::relay::{FileTrustStore, TrustedBundles};
//! use std::sync::Arc;
//!
//! let bundles = TrustedBundles::new(Arc::new(FileTrustStore::new("trust.json")));
//! if let Some(bundle) = bundles.find("space.backlog.jp")? {
//!     println!("relay: {}", bundle.relay_url);
//! }
//! ```

use super::bundle::TrustedBundle;
use crate::error::RelayError;
use crate::secure_file;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Store key holding every trusted bundle.
pub const TRUSTED_BUNDLES_PATH: &str = "relay.trusted_bundles";

/// Key/value persistence for trusted bundles.
///
/// Implement this over the host application's configuration store.
/// `set` must replace the value under `path` as a whole; a reader must never
/// observe a partially written list.
pub trait TrustStore: Send + Sync {
    /// Load the bundles stored under `path`. A missing key yields an empty list.
    fn get(&self, path: &str) -> Result<Vec<TrustedBundle>, RelayError>;

    /// Replace the bundles stored under `path`.
    fn set(&self, path: &str, bundles: &[TrustedBundle]) -> Result<(), RelayError>;

    /// Get storage metadata (for diagnostics)
    fn metadata(&self) -> StorageMetadata {
        StorageMetadata::default()
    }
}

/// Metadata about a storage backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageMetadata {
    /// Human-readable storage type
    pub storage_type: &'static str,

    /// Backing file, if any
    pub location: Option<PathBuf>,
}

// ============================================================================
// Built-in implementations
// ============================================================================

/// In-memory trust store
#[derive(Debug, Default)]
pub struct MemoryTrustStore {
    entries: RwLock<BTreeMap<String, Vec<TrustedBundle>>>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrustStore for MemoryTrustStore {
    fn get(&self, path: &str) -> Result<Vec<TrustedBundle>, RelayError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RelayError::StorageError("memory store lock poisoned".to_string()))?;
        Ok(entries.get(path).cloned().unwrap_or_default())
    }

    fn set(&self, path: &str, bundles: &[TrustedBundle]) -> Result<(), RelayError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| RelayError::StorageError("memory store lock poisoned".to_string()))?;
        entries.insert(path.to_string(), bundles.to_vec());
        Ok(())
    }

    fn metadata(&self) -> StorageMetadata {
        StorageMetadata {
            storage_type: "memory",
            location: None,
        }
    }
}

/// File-backed trust store
///
/// The file is a JSON object mapping store keys to bundle lists. Other keys
/// in the file are preserved on write.
#[derive(Debug, Clone)]
pub struct FileTrustStore {
    path: PathBuf,
}

type StoreFile = BTreeMap<String, Vec<TrustedBundle>>;

impl FileTrustStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreFile, RelayError> {
        let Some(data) = secure_file::read_secure_if_exists(&self.path)? else {
            return Ok(StoreFile::new());
        };
        // A corrupt store is reported, not overwritten
        serde_json::from_slice(&data).map_err(|e| {
            RelayError::StorageError(format!(
                "Failed to parse trust store '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl TrustStore for FileTrustStore {
    fn get(&self, path: &str) -> Result<Vec<TrustedBundle>, RelayError> {
        Ok(self.load()?.remove(path).unwrap_or_default())
    }

    fn set(&self, path: &str, bundles: &[TrustedBundle]) -> Result<(), RelayError> {
        let mut file = self.load()?;
        file.insert(path.to_string(), bundles.to_vec());
        let data = serde_json::to_vec_pretty(&file)?;
        secure_file::write_atomic(&self.path, &data)
    }

    fn metadata(&self) -> StorageMetadata {
        StorageMetadata {
            storage_type: "file",
            location: Some(self.path.clone()),
        }
    }
}

/// Domain-keyed access to the trusted bundle list.
#[derive(Clone)]
pub struct TrustedBundles {
    store: Arc<dyn TrustStore>,
}

impl TrustedBundles {
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn TrustStore {
        self.store.as_ref()
    }

    /// All stored bundles.
    pub fn all(&self) -> Result<Vec<TrustedBundle>, RelayError> {
        self.store.get(TRUSTED_BUNDLES_PATH)
    }

    /// The bundle for `domain`, if one has been imported.
    pub fn find(&self, domain: &str) -> Result<Option<TrustedBundle>, RelayError> {
        Ok(self.all()?.into_iter().find(|b| b.id == domain))
    }

    /// Insert `bundle`, replacing any record with the same id.
    pub fn upsert(&self, bundle: TrustedBundle) -> Result<(), RelayError> {
        let mut bundles = self.all()?;
        match bundles.iter_mut().find(|b| b.id == bundle.id) {
            Some(existing) => *existing = bundle,
            None => bundles.push(bundle),
        }
        self.store.set(TRUSTED_BUNDLES_PATH, &bundles)
    }

    /// Remove the bundle for `domain`. Returns whether one existed.
    pub fn remove(&self, domain: &str) -> Result<bool, RelayError> {
        let mut bundles = self.all()?;
        let before = bundles.len();
        bundles.retain(|b| b.id != domain);
        if bundles.len() == before {
            return Ok(false);
        }
        self.store.set(TRUSTED_BUNDLES_PATH, &bundles)?;
        Ok(true)
    }
}
