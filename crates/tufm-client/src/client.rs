//! # TUF Client Adapter
//!
//! [`TufClient`] wires a [`TrustedMetadataSet`] to a metadata source and a
//! targets source. It owns all network I/O; the trusted set owns every trust
//! decision.
//!
//! ## Refresh Order
//!
//! 1. Root chain: `<n>.root.json` for `n = current+1, current+2, ...` until
//!    the source answers 403/404, bounded by the configured rotation limit.
//! 2. `timestamp.json`.
//! 3. Snapshot, named by version under consistent snapshot.
//! 4. Top-level targets, named by version under consistent snapshot.
//!
//! Each document is fetched with the length its parent declares, falling
//! back to the configured maximum.
//!
//! ## Target Resolution
//!
//! [`TufClient::download_target`] searches top-level targets first, then
//! walks the delegation tree depth-first in declared order, loading each
//! delegated role on demand. A terminating role that matches the path stops
//! the walk from considering its siblings.

use std::collections::HashSet;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tufm_core::naming::{consistent_version, role_file_name, RoleFile};
use tufm_core::{
    DigestAlgorithm, FetchError, IntegrityError, MappingError, Metadata, MirrorError, RoleType,
    TargetFile, Targets, TrustError, TrustedMetadataSet, TrustedSnapshot,
};
use url::Url;

use crate::config::ClientConfig;
use crate::fetch::{join_file, join_path, Fetcher};
use crate::root_store::{CacheStatus, PersistedRoot, RootStore};

/// Upper bound on delegated roles visited while resolving one target.
pub const MAX_DELEGATIONS: usize = 32;

/// A target file resolved and present on local disk.
#[derive(Debug, Clone)]
pub struct DownloadedTarget {
    /// Where the verified bytes are cached.
    pub path: PathBuf,
    /// The verified bytes.
    pub bytes: Vec<u8>,
}

/// Trust client bound to one pinned root and one metadata source.
#[derive(Debug)]
pub struct TufClient<S> {
    trusted: S,
    fetcher: Fetcher,
    config: ClientConfig,
    root: PersistedRoot,
}

impl<S: TrustedMetadataSet> TufClient<S> {
    /// Pin `root`, persist it in the cache, and refresh once.
    ///
    /// A root the trust framework cannot load is rejected before the cache
    /// is touched.
    pub async fn open(root: &[u8], config: ClientConfig) -> Result<Self, MirrorError> {
        let trusted = S::from_root(root)?;
        let persisted = RootStore::new(config.cache_dir()).ensure_root(root)?;
        let fetcher = Fetcher::new(config.fetch_timeout)?;

        let mut client = Self {
            trusted,
            fetcher,
            config,
            root: persisted,
        };
        client.refresh().await?;
        Ok(client)
    }

    /// Bring the trusted set up to date with the metadata source.
    pub async fn refresh(&mut self) -> Result<(), MirrorError> {
        self.update_root_chain().await?;
        self.update_timestamp().await?;
        self.update_snapshot().await?;
        self.update_top_level_targets().await?;
        tracing::info!(
            metadata_url = %self.config.metadata_url,
            root_version = self.trusted.root().version(),
            "refreshed trusted metadata"
        );
        Ok(())
    }

    /// The refreshed top-level metadata. No network access.
    pub fn snapshot(&self) -> Result<TrustedSnapshot<'_>, MappingError> {
        TrustedSnapshot::from_set(&self.trusted)
    }

    /// The underlying trusted set.
    pub fn trusted(&self) -> &S {
        &self.trusted
    }

    /// Configured metadata source.
    pub fn metadata_url(&self) -> &Url {
        &self.config.metadata_url
    }

    /// Configured default targets source.
    pub fn targets_url(&self) -> &Url {
        &self.config.targets_url
    }

    /// `<cache>/<root-digest>`.
    pub fn cache_dir(&self) -> &Path {
        &self.root.dir
    }

    /// `<cache>/<root-digest>/download`.
    pub fn download_dir(&self) -> PathBuf {
        self.root.download_dir()
    }

    /// Whether the pinned root was written on this run or reused.
    pub fn root_cache_status(&self) -> CacheStatus {
        self.root.status
    }

    /// Every root version older than the trusted one, fetched from `metadata_url`.
    ///
    /// Any missing version fails the whole call.
    pub async fn prior_roots(&self, metadata_url: &Url) -> Result<Vec<RoleFile>, MirrorError> {
        let current = self.trusted.root().version();
        let mut roots = Vec::new();
        for version in 1..current {
            let name = role_file_name(RoleType::Root.as_str(), Some(version));
            let url = join_file(metadata_url, &name)?;
            let bytes = self
                .fetcher
                .download_file(&url, self.config.limits.root_max_length)
                .await?;
            roots.push(RoleFile::root(version, bytes));
        }
        Ok(roots)
    }

    /// Fetch and verify delegated targets metadata for `role`, delegated by `parent`.
    ///
    /// A role already in the trusted set is returned without a fetch, so the
    /// copy is only as fresh as the last [`TufClient::refresh`].
    pub async fn load_delegated_targets(
        &mut self,
        role: &str,
        parent: &str,
    ) -> Result<Metadata<Targets>, MirrorError> {
        if let Some(loaded) = self.trusted.targets(role) {
            return Ok(loaded.clone());
        }
        let (name, max_len) = self.targets_request(role)?;
        let data = self.fetch_metadata(&name, max_len).await?;
        let loaded = self.trusted.update_delegated_targets(&data, role, parent)?;
        tracing::debug!(role, parent, version = loaded.version(), "loaded delegated targets");
        Ok(loaded.clone())
    }

    /// Resolve `target_path`, returning a verified local copy.
    ///
    /// A cached copy under `dest_dir` whose length and hashes still match is
    /// returned without network access. Otherwise the file is fetched from
    /// `targets_url`, verified, and cached.
    pub async fn download_target(
        &mut self,
        target_path: &str,
        dest_dir: &Path,
        targets_url: &Url,
    ) -> Result<DownloadedTarget, MirrorError> {
        let target = self.find_target(target_path).await?;
        let local = dest_dir.join(local_file_name(target_path));

        if local.exists() {
            let cached = fs::read(&local).map_err(|e| MirrorError::io(&local, e))?;
            match verify_target(target_path, &cached, &target) {
                Ok(()) => {
                    tracing::debug!(target_path, path = %local.display(), "using cached target");
                    return Ok(DownloadedTarget {
                        path: local,
                        bytes: cached,
                    });
                }
                Err(e) => {
                    tracing::warn!(target_path, path = %local.display(), error = %e, "cached target is stale");
                }
            }
        }

        let consistent = self.trusted.root().signed.consistent_snapshot;
        let url = target_url(targets_url, target_path, &target, consistent)?;
        let bytes = self.fetcher.download_file(&url, target.length).await?;
        verify_target(target_path, &bytes, &target)?;

        write_atomically(dest_dir, &local, &bytes)?;
        tracing::debug!(target_path, %url, path = %local.display(), "downloaded target");
        Ok(DownloadedTarget { path: local, bytes })
    }

    // -----------------------------------------------------------------------
    // Refresh steps
    // -----------------------------------------------------------------------

    async fn update_root_chain(&mut self) -> Result<(), MirrorError> {
        let limits = self.config.limits;
        let start = self.trusted.root().version();
        for next in root_versions_after(start, limits.max_root_rotations) {
            let name = role_file_name(RoleType::Root.as_str(), Some(next));
            match self.fetch_metadata(&name, limits.root_max_length).await {
                Ok(data) => self.trusted.update_root(&data)?,
                Err(MirrorError::Fetch(e)) if e.is_not_found() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn update_timestamp(&mut self) -> Result<(), MirrorError> {
        let name = role_file_name(RoleType::Timestamp.as_str(), None);
        let data = self
            .fetch_metadata(&name, self.config.limits.timestamp_max_length)
            .await?;
        self.trusted.update_timestamp(&data)?;
        Ok(())
    }

    async fn update_snapshot(&mut self) -> Result<(), MirrorError> {
        let (name, max_len) = {
            let timestamp = self.trusted.timestamp().ok_or_else(|| TrustError::NotLoaded {
                role: RoleType::Timestamp.to_string(),
            })?;
            let meta = timestamp.signed.snapshot_meta().ok_or_else(|| {
                TrustError::MalformedMetadata {
                    role: RoleType::Timestamp.to_string(),
                    reason: "no snapshot.json entry in meta".into(),
                }
            })?;
            let consistent = self.trusted.root().signed.consistent_snapshot;
            (
                role_file_name(
                    RoleType::Snapshot.as_str(),
                    consistent_version(consistent, meta.version),
                ),
                meta.length
                    .unwrap_or(self.config.limits.snapshot_max_length),
            )
        };
        let data = self.fetch_metadata(&name, max_len).await?;
        self.trusted.update_snapshot(&data)?;
        Ok(())
    }

    async fn update_top_level_targets(&mut self) -> Result<(), MirrorError> {
        let (name, max_len) = self.targets_request(RoleType::Targets.as_str())?;
        let data = self.fetch_metadata(&name, max_len).await?;
        self.trusted.update_targets(&data)?;
        Ok(())
    }

    /// Filename and length cap for a targets-family role, from the snapshot.
    fn targets_request(&self, role: &str) -> Result<(String, u64), TrustError> {
        let snapshot = self.trusted.snapshot().ok_or_else(|| TrustError::NotLoaded {
            role: RoleType::Snapshot.to_string(),
        })?;
        let meta = snapshot
            .signed
            .role_meta(role)
            .ok_or_else(|| TrustError::NotInSnapshot {
                role: role.to_string(),
            })?;
        let consistent = self.trusted.root().signed.consistent_snapshot;
        Ok((
            role_file_name(role, consistent_version(consistent, meta.version)),
            meta.length.unwrap_or(self.config.limits.targets_max_length),
        ))
    }

    async fn fetch_metadata(&self, name: &str, max_len: u64) -> Result<Vec<u8>, MirrorError> {
        let url = join_file(&self.config.metadata_url, name)?;
        Ok(self.fetcher.download_file(&url, max_len).await?)
    }

    // -----------------------------------------------------------------------
    // Target lookup
    // -----------------------------------------------------------------------

    async fn find_target(&mut self, target_path: &str) -> Result<TargetFile, MirrorError> {
        let top = RoleType::Targets.as_str();
        let mut to_visit = vec![(top.to_string(), RoleType::Root.to_string())];
        let mut visited = HashSet::new();

        while let Some((role, parent)) = to_visit.pop() {
            if visited.len() > MAX_DELEGATIONS {
                break;
            }
            if visited.contains(&role) {
                continue;
            }
            if role != top {
                self.load_delegated_targets(&role, &parent).await?;
            }
            let targets = self
                .trusted
                .targets(&role)
                .ok_or_else(|| TrustError::NotLoaded { role: role.clone() })?;
            if let Some(found) = targets.signed.targets.get(target_path) {
                return Ok(found.clone());
            }

            let mut children = Vec::new();
            for child in targets.signed.delegated_roles() {
                if !child.is_delegated_path(target_path) {
                    continue;
                }
                children.push((child.name.clone(), role.clone()));
                if child.terminating {
                    to_visit.clear();
                    break;
                }
            }
            visited.insert(role);
            to_visit.extend(children.into_iter().rev());
        }

        Err(TrustError::UndeclaredTarget {
            path: target_path.to_string(),
        }
        .into())
    }
}

/// Download `1.root.json` from `metadata_url` for callers without a pinned root.
pub async fn fetch_initial_root(
    metadata_url: &Url,
    timeout: Duration,
    max_len: u64,
) -> Result<Vec<u8>, FetchError> {
    let name = role_file_name(RoleType::Root.as_str(), Some(1));
    let url = join_file(metadata_url, &name)?;
    Fetcher::new(timeout)?.download_file(&url, max_len).await
}

/// Cache filename for a target: the path, form-urlencoded into one segment.
pub fn local_file_name(target_path: &str) -> String {
    url::form_urlencoded::byte_serialize(target_path.as_bytes()).collect()
}

/// Source URL for a target. Under consistent snapshot the basename is
/// prefixed with the target's hash: `<dir>/<hash>.<basename>`.
pub fn target_url(
    targets_url: &Url,
    target_path: &str,
    target: &TargetFile,
    consistent_snapshot: bool,
) -> Result<Url, FetchError> {
    if !consistent_snapshot {
        return join_path(targets_url, target_path);
    }
    let hash = target
        .sha256()
        .or_else(|| target.hashes.values().next().map(String::as_str));
    let Some(hash) = hash else {
        return join_path(targets_url, target_path);
    };
    let prefixed = match target_path.rsplit_once('/') {
        Some((dir, base)) => format!("{dir}/{hash}.{base}"),
        None => format!("{hash}.{target_path}"),
    };
    join_path(targets_url, &prefixed)
}

/// Check `data` against a target's trusted length and every supported hash.
pub fn verify_target(subject: &str, data: &[u8], target: &TargetFile) -> Result<(), IntegrityError> {
    let actual = data.len() as u64;
    if actual != target.length {
        return Err(IntegrityError::LengthMismatch {
            subject: subject.to_string(),
            expected: target.length,
            actual,
        });
    }
    let mut checked = 0;
    for algorithm in DigestAlgorithm::ALL {
        let Some(expected) = target.hashes.get(algorithm.name()) else {
            continue;
        };
        let actual = algorithm.hex_digest(data);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(IntegrityError::HashMismatch {
                subject: subject.to_string(),
                algorithm: algorithm.name().to_string(),
                expected: expected.clone(),
                actual,
            });
        }
        checked += 1;
    }
    if checked == 0 {
        return Err(IntegrityError::NoSupportedHash {
            subject: subject.to_string(),
        });
    }
    Ok(())
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), MirrorError> {
    fs::create_dir_all(dir).map_err(|e| MirrorError::io(dir, e))?;
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    fs::write(&partial, bytes).map_err(|e| MirrorError::io(&partial, e))?;
    fs::rename(&partial, path).map_err(|e| MirrorError::io(path, e))
}

/// Root versions to request after `start`, at most `max_rotations` of them.
fn root_versions_after(start: u64, max_rotations: u64) -> RangeInclusive<u64> {
    start.saturating_add(1)..=start.saturating_add(max_rotations)
}
