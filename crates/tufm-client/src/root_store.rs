//! # Trust-Root Store
//!
//! Persists the pinned initial root under its content digest:
//!
//! ```text
//! <cache>/<sha256-hex>/root.json
//! <cache>/<sha256-hex>/download/      (target download cache)
//! ```
//!
//! The first run writes the candidate verbatim; later runs read it back and
//! recompute the digest. A cached file whose digest disagrees with the
//! directory it lives in is an [`IntegrityError`], never silently replaced.
//!
//! Writes use create-new semantics, so concurrent first runs for the same
//! digest converge on one file: the first writer wins and the others reuse it.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tufm_core::{sha256_digest, ContentDigest, IntegrityError, MirrorError};

/// Filename of the cached root inside its digest directory.
pub const ROOT_FILE: &str = "root.json";

/// Name of the target download cache inside a digest directory.
pub const DOWNLOAD_DIR: &str = "download";

/// Whether [`RootStore::ensure_root`] wrote the root or found it cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// The root was not cached and has been written.
    Written,
    /// A cached copy with a matching digest was reused.
    Reused,
}

/// A root document as persisted in the cache.
#[derive(Debug, Clone)]
pub struct PersistedRoot {
    /// Digest of `bytes`; names `dir`.
    pub digest: ContentDigest,
    /// `<cache>/<digest>`.
    pub dir: PathBuf,
    /// The persisted bytes.
    pub bytes: Vec<u8>,
    /// Written or reused.
    pub status: CacheStatus,
}

impl PersistedRoot {
    /// Path of the cached `root.json`.
    pub fn root_path(&self) -> PathBuf {
        self.dir.join(ROOT_FILE)
    }

    /// Path of the target download cache.
    pub fn download_dir(&self) -> PathBuf {
        self.dir.join(DOWNLOAD_DIR)
    }
}

/// Digest-keyed root cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct RootStore {
    base_dir: PathBuf,
}

impl RootStore {
    /// A store rooted at `base_dir`. The directory is created on first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The cache root.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory a root with `digest` is filed under.
    pub fn dir_for(&self, digest: &ContentDigest) -> PathBuf {
        self.base_dir.join(digest.to_hex())
    }

    /// Persist `candidate` if absent, otherwise return the verified cached copy.
    pub fn ensure_root(&self, candidate: &[u8]) -> Result<PersistedRoot, MirrorError> {
        let digest = sha256_digest(candidate);
        let dir = self.dir_for(&digest);
        let path = dir.join(ROOT_FILE);

        if path.exists() {
            let bytes = read_verified(&path, &digest)?;
            tracing::debug!(path = %path.display(), digest = %digest, "reusing cached root");
            return Ok(PersistedRoot {
                digest,
                dir,
                bytes,
                status: CacheStatus::Reused,
            });
        }

        fs::create_dir_all(&dir).map_err(|e| MirrorError::io(&dir, e))?;
        let status = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(candidate)
                    .and_then(|()| file.sync_all())
                    .map_err(|e| MirrorError::io(&path, e))?;
                tracing::info!(path = %path.display(), digest = %digest, "cached trust root");
                CacheStatus::Written
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Lost a race with another writer for the same digest.
                read_verified(&path, &digest)?;
                CacheStatus::Reused
            }
            Err(e) => return Err(MirrorError::io(&path, e)),
        };

        Ok(PersistedRoot {
            digest,
            dir,
            bytes: candidate.to_vec(),
            status,
        })
    }
}

fn read_verified(path: &Path, expected: &ContentDigest) -> Result<Vec<u8>, MirrorError> {
    let bytes = fs::read(path).map_err(|e| MirrorError::io(path, e))?;
    let actual = sha256_digest(&bytes);
    if actual != *expected {
        return Err(IntegrityError::CachedRootMismatch {
            path: path.to_path_buf(),
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        }
        .into());
    }
    Ok(bytes)
}
