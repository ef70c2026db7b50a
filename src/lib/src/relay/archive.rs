//! Bundle archive reader
//!
//! A bundle is a zip archive with two required members, [`MANIFEST_MEMBER`]
//! and [`SIGNATURE_MEMBER`], plus whatever files the manifest references.
//! Only member names and contents are read; directories are ignored and
//! nothing is written to disk.

use super::jws::SignatureDocument;
use crate::error::RelayError;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

/// Raw manifest JSON.
pub const MANIFEST_MEMBER: &str = "manifest.json";

/// Detached signatures over the manifest.
pub const SIGNATURE_MEMBER: &str = "signature.json";

/// Size limits applied while unpacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_archive_bytes: u64,
    pub max_member_bytes: u64,
    pub max_members: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_archive_bytes: 32 * 1024 * 1024,
            max_member_bytes: 8 * 1024 * 1024,
            max_members: 1024,
        }
    }
}

/// Unpacked bundle.
#[derive(Debug, Clone)]
pub struct BundleContents {
    /// Manifest bytes exactly as stored; signatures are computed over these.
    pub manifest: Vec<u8>,
    pub signature: SignatureDocument,
    /// Every other file member, by name.
    pub files: BTreeMap<String, Vec<u8>>,
}

fn read_member(
    name: &str,
    declared_size: u64,
    reader: impl Read,
    limit: u64,
) -> Result<Vec<u8>, RelayError> {
    if declared_size > limit {
        return Err(RelayError::ArchiveError(format!(
            "member '{}' is {} bytes, limit is {}",
            name, declared_size, limit
        )));
    }
    let mut data = Vec::with_capacity(declared_size as usize);
    reader.take(limit + 1).read_to_end(&mut data)?;
    if data.len() as u64 > limit {
        return Err(RelayError::ArchiveError(format!(
            "member '{}' exceeds {} bytes",
            name, limit
        )));
    }
    Ok(data)
}

/// Unpack a bundle archive held in memory.
///
/// # Errors
///
/// - [`RelayError::ArchiveError`] if the data is not a zip archive, a limit
///   is exceeded, a member name repeats, or a required member is missing
/// - [`RelayError::ParseError`] if the signature member is not a valid
///   signature document
pub fn unpack(data: &[u8], limits: &ArchiveLimits) -> Result<BundleContents, RelayError> {
    if data.len() as u64 > limits.max_archive_bytes {
        return Err(RelayError::ArchiveError(format!(
            "archive is {} bytes, limit is {}",
            data.len(),
            limits.max_archive_bytes
        )));
    }
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    if archive.len() > limits.max_members {
        return Err(RelayError::ArchiveError(format!(
            "archive has {} members, limit is {}",
            archive.len(),
            limits.max_members
        )));
    }

    let mut members = BTreeMap::new();
    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let size = file.size();
        let content = read_member(&name, size, file, limits.max_member_bytes)?;
        if members.insert(name.clone(), content).is_some() {
            return Err(RelayError::ArchiveError(format!("duplicate member '{}'", name)));
        }
    }

    let manifest = members
        .remove(MANIFEST_MEMBER)
        .ok_or_else(|| RelayError::ArchiveError(format!("missing '{}'", MANIFEST_MEMBER)))?;
    let signature = members
        .remove(SIGNATURE_MEMBER)
        .ok_or_else(|| RelayError::ArchiveError(format!("missing '{}'", SIGNATURE_MEMBER)))?;
    let signature = SignatureDocument::from_json(&signature)?;

    log::debug!("unpacked bundle with {} referenced member(s)", members.len());
    Ok(BundleContents {
        manifest,
        signature,
        files: members,
    })
}
