//! Owner-only, atomically replaced files
//!
//! Trust records hold bundle tokens and the certs cache holds the key material
//! every verification depends on, so both are written through this module:
//!
//! - files are created with mode 0600 on Unix
//! - replacement goes through a `tempfile` sibling that is persisted over the
//!   target, so a reader never observes a half-written file
//! - reading warns when a file is group- or world-accessible
//!
//! ```no_run
//! use relaytrust::secure_file;
//! use std::path::Path;
//!
//! secure_file::write_atomic(Path::new("/tmp/relaytrust/trust.json"), b"[]")?;
//! let data = secure_file::read_secure(Path::new("/tmp/relaytrust/trust.json"))?;
//! # Ok::<(), relaytrust::RelayError>(())
//! ```

use crate::error::RelayError;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

/// Owner read/write only.
#[cfg(unix)]
pub const SECURE_FILE_MODE: u32 = 0o600;

/// Warn if `path` is accessible by group or others.
#[cfg(unix)]
pub fn check_permissions(path: &Path) -> Result<(), RelayError> {
    use std::os::unix::fs::PermissionsExt;

    let perm_bits = fs::metadata(path)?.permissions().mode() & 0o777;
    if perm_bits & 0o077 != 0 {
        log::warn!(
            "File '{}' has permissive mode {:o}; expected 0600. Consider running: chmod 600 '{}'",
            path.display(),
            perm_bits,
            path.display()
        );
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn check_permissions(path: &Path) -> Result<(), RelayError> {
    log::debug!("Permission check skipped for '{}' on this platform", path.display());
    Ok(())
}

#[cfg(unix)]
fn restrict(file: &File) -> Result<(), RelayError> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(fs::Permissions::from_mode(SECURE_FILE_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict(_file: &File) -> Result<(), RelayError> {
    Ok(())
}

/// Atomically replace `path` with `data`.
///
/// Parent directories are created as needed. The data is written to a
/// temp file in the same directory, flushed to disk, then persisted over
/// `path`. On failure the temp file is dropped and the previous content of
/// `path` is left untouched.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), RelayError> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new().prefix(".relaytrust-").tempfile_in(parent)?;
    restrict(tmp.as_file())?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| RelayError::IOError(e.error))?;
    Ok(())
}

/// Read a file, warning if its permissions are too open.
pub fn read_secure(path: &Path) -> Result<Vec<u8>, RelayError> {
    check_permissions(path)?;
    let mut contents = Vec::new();
    File::open(path)?.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Like [`read_secure`], but a missing file yields `Ok(None)`.
pub fn read_secure_if_exists(path: &Path) -> Result<Option<Vec<u8>>, RelayError> {
    match read_secure(path) {
        Ok(data) => Ok(Some(data)),
        Err(RelayError::IOError(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
