//! # Trusted Metadata Collaborator
//!
//! [`TrustedMetadataSet`] is the boundary to the trust framework. An
//! implementation owns every trust decision: signature thresholds, root
//! rotation rules, rollback and freshness checks. The mirror's client drives
//! the fetching and hands each downloaded document to the set, which either
//! accepts it into its trusted state or returns a [`TrustError`].
//!
//! The trait is synchronous. Verification is CPU-only; all network I/O stays
//! in the client.

use crate::error::{MappingError, TrustError};
use crate::metadata::{Metadata, RoleType, Root, Snapshot, Targets, Timestamp};

/// The set of metadata the trust framework currently vouches for.
pub trait TrustedMetadataSet: Sized {
    /// Start a trusted set from a pinned root document.
    fn from_root(root: &[u8]) -> Result<Self, TrustError>;

    /// The current trusted root.
    fn root(&self) -> &Metadata<Root>;

    /// The trusted timestamp, once loaded.
    fn timestamp(&self) -> Option<&Metadata<Timestamp>>;

    /// The trusted snapshot, once loaded.
    fn snapshot(&self) -> Option<&Metadata<Snapshot>>;

    /// Trusted targets metadata for `role` (`"targets"` or a delegated role).
    fn targets(&self, role: &str) -> Option<&Metadata<Targets>>;

    /// Verify and accept the next root version.
    fn update_root(&mut self, data: &[u8]) -> Result<(), TrustError>;

    /// Verify and accept a timestamp.
    fn update_timestamp(&mut self, data: &[u8]) -> Result<(), TrustError>;

    /// Verify and accept a snapshot.
    fn update_snapshot(&mut self, data: &[u8]) -> Result<(), TrustError>;

    /// Verify and accept delegated targets metadata for `role`, delegated by `parent`.
    fn update_delegated_targets(
        &mut self,
        data: &[u8],
        role: &str,
        parent: &str,
    ) -> Result<&Metadata<Targets>, TrustError>;

    /// Verify and accept top-level targets metadata.
    fn update_targets(&mut self, data: &[u8]) -> Result<(), TrustError> {
        self.update_delegated_targets(data, RoleType::Targets.as_str(), RoleType::Root.as_str())
            .map(|_| ())
    }
}

/// A read-only view of a fully refreshed trusted set.
#[derive(Debug, Clone, Copy)]
pub struct TrustedSnapshot<'a> {
    pub root: &'a Metadata<Root>,
    pub timestamp: &'a Metadata<Timestamp>,
    pub snapshot: &'a Metadata<Snapshot>,
    pub targets: &'a Metadata<Targets>,
}

impl<'a> TrustedSnapshot<'a> {
    /// Borrow every top-level role from `set`, failing if any is missing.
    pub fn from_set<S: TrustedMetadataSet>(set: &'a S) -> Result<Self, MappingError> {
        let missing = |role: RoleType| MappingError::IncompleteSnapshot {
            role: role.to_string(),
        };
        Ok(Self {
            root: set.root(),
            timestamp: set.timestamp().ok_or_else(|| missing(RoleType::Timestamp))?,
            snapshot: set.snapshot().ok_or_else(|| missing(RoleType::Snapshot))?,
            targets: set
                .targets(RoleType::Targets.as_str())
                .ok_or_else(|| missing(RoleType::Targets))?,
        })
    }

    /// Whether the repository uses consistent-snapshot naming.
    pub fn consistent_snapshot(&self) -> bool {
        self.root.signed.consistent_snapshot
    }
}
