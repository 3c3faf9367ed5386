//! A structural trusted-metadata set.
//!
//! [`StructuralTrustSet`] enforces the parts of the TUF update workflow that
//! do not involve cryptography: document types, version sequencing, expiry,
//! and consistency between timestamp, snapshot and targets. Signatures are
//! never checked, so it must only back tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tufm_core::{
    sha256_hex, Metadata, MetaFile, Role, RoleType, Root, Snapshot, Targets, Timestamp,
    TrustError, TrustedMetadataSet,
};

/// Trusted set that checks structure and sequencing only.
#[derive(Debug, Clone)]
pub struct StructuralTrustSet {
    root: Metadata<Root>,
    timestamp: Option<Metadata<Timestamp>>,
    snapshot: Option<Metadata<Snapshot>>,
    targets: BTreeMap<String, Metadata<Targets>>,
    now: DateTime<Utc>,
}

impl StructuralTrustSet {
    /// Version of the currently trusted root.
    pub fn root_version(&self) -> u64 {
        self.root.version()
    }

    /// Names of every loaded targets role.
    pub fn loaded_roles(&self) -> Vec<&str> {
        self.targets.keys().map(String::as_str).collect()
    }
}

fn rejected(role: &str, reason: impl Into<String>) -> TrustError {
    TrustError::Rejected {
        role: role.to_string(),
        reason: reason.into(),
    }
}

fn check_expiry<T: Role>(role: &str, md: &Metadata<T>, now: DateTime<Utc>) -> Result<(), TrustError> {
    if md.signed.expires() <= now {
        return Err(rejected(role, format!("expired at {}", md.signed.expires())));
    }
    Ok(())
}

fn check_meta(role: &str, data: &[u8], meta: &MetaFile, version: u64) -> Result<(), TrustError> {
    if version != meta.version {
        return Err(rejected(
            role,
            format!("version {version} does not match expected {}", meta.version),
        ));
    }
    if let Some(length) = meta.length {
        if data.len() as u64 != length {
            return Err(rejected(
                role,
                format!("length {} does not match expected {length}", data.len()),
            ));
        }
    }
    if let Some(expected) = meta.hashes.as_ref().and_then(|h| h.get("sha256")) {
        if sha256_hex(data) != *expected {
            return Err(rejected(role, "sha256 does not match meta"));
        }
    }
    Ok(())
}

impl TrustedMetadataSet for StructuralTrustSet {
    fn from_root(root: &[u8]) -> Result<Self, TrustError> {
        Ok(Self {
            root: Metadata::from_bytes(root)?,
            timestamp: None,
            snapshot: None,
            targets: BTreeMap::new(),
            now: Utc::now(),
        })
    }

    fn root(&self) -> &Metadata<Root> {
        &self.root
    }

    fn timestamp(&self) -> Option<&Metadata<Timestamp>> {
        self.timestamp.as_ref()
    }

    fn snapshot(&self) -> Option<&Metadata<Snapshot>> {
        self.snapshot.as_ref()
    }

    fn targets(&self, role: &str) -> Option<&Metadata<Targets>> {
        self.targets.get(role)
    }

    fn update_root(&mut self, data: &[u8]) -> Result<(), TrustError> {
        let next = Metadata::<Root>::from_bytes(data)?;
        let expected = self.root.version() + 1;
        if next.version() != expected {
            return Err(rejected(
                "root",
                format!("expected version {expected}, got {}", next.version()),
            ));
        }
        self.root = next;
        Ok(())
    }

    fn update_timestamp(&mut self, data: &[u8]) -> Result<(), TrustError> {
        check_expiry("root", &self.root, self.now)?;
        let timestamp = Metadata::<Timestamp>::from_bytes(data)?;
        if let Some(current) = &self.timestamp {
            if timestamp.version() < current.version() {
                return Err(rejected("timestamp", "version rollback"));
            }
        }
        if timestamp.signed.snapshot_meta().is_none() {
            return Err(rejected("timestamp", "no snapshot.json meta"));
        }
        check_expiry("timestamp", &timestamp, self.now)?;
        self.timestamp = Some(timestamp);
        Ok(())
    }

    fn update_snapshot(&mut self, data: &[u8]) -> Result<(), TrustError> {
        let meta = self
            .timestamp
            .as_ref()
            .and_then(|t| t.signed.snapshot_meta())
            .ok_or_else(|| TrustError::NotLoaded {
                role: RoleType::Timestamp.to_string(),
            })?;
        let snapshot = Metadata::<Snapshot>::from_bytes(data)?;
        check_meta("snapshot", data, meta, snapshot.version())?;
        check_expiry("snapshot", &snapshot, self.now)?;
        self.snapshot = Some(snapshot);
        Ok(())
    }

    fn update_delegated_targets(
        &mut self,
        data: &[u8],
        role: &str,
        parent: &str,
    ) -> Result<&Metadata<Targets>, TrustError> {
        let snapshot = self.snapshot.as_ref().ok_or_else(|| TrustError::NotLoaded {
            role: RoleType::Snapshot.to_string(),
        })?;
        if role != RoleType::Targets.as_str() {
            let delegator = self
                .targets
                .get(parent)
                .ok_or_else(|| TrustError::NotLoaded {
                    role: parent.to_string(),
                })?;
            if delegator.signed.delegated_role(role).is_none() {
                return Err(rejected(role, format!("not delegated by {parent}")));
            }
        }
        let meta = snapshot
            .signed
            .role_meta(role)
            .ok_or_else(|| TrustError::NotInSnapshot {
                role: role.to_string(),
            })?;
        let targets = Metadata::<Targets>::from_bytes(data)?;
        check_meta(role, data, meta, targets.version())?;
        check_expiry(role, &targets, self.now)?;

        self.targets.insert(role.to_string(), targets);
        self.targets.get(role).ok_or_else(|| TrustError::NotLoaded {
            role: role.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FixtureRole, RepoFixture};

    fn loaded(fixture: &RepoFixture) -> StructuralTrustSet {
        let files = fixture.build();
        let mut set = StructuralTrustSet::from_root(files.initial_root()).unwrap();
        for root in &files.roots[1..] {
            set.update_root(root).unwrap();
        }
        set.update_timestamp(&files.timestamp).unwrap();
        set.update_snapshot(&files.snapshot).unwrap();
        set.update_targets(&files.targets).unwrap();
        set
    }

    #[test]
    fn accepts_a_consistent_fixture() {
        let set = loaded(&RepoFixture::new().root_version(3).target("a.txt", b"a"));
        assert_eq!(set.root_version(), 3);
        assert_eq!(set.loaded_roles(), ["targets"]);
    }

    #[test]
    fn rejects_skipped_root_versions() {
        let files = RepoFixture::new().root_version(3).build();
        let mut set = StructuralTrustSet::from_root(files.initial_root()).unwrap();
        assert!(matches!(
            set.update_root(&files.roots[2]),
            Err(TrustError::Rejected { .. })
        ));
    }

    #[test]
    fn rejects_snapshot_that_disagrees_with_timestamp() {
        let files = RepoFixture::new().build();
        let other = RepoFixture::new().versions(1, 2, 1).build();
        let mut set = StructuralTrustSet::from_root(files.initial_root()).unwrap();
        set.update_timestamp(&files.timestamp).unwrap();
        assert!(set.update_snapshot(&other.snapshot).is_err());
    }

    #[test]
    fn delegated_role_must_be_delegated_by_parent() {
        let fixture = RepoFixture::new().delegation(FixtureRole::new("opkl", &["opkl/*"]));
        let files = fixture.build();
        let mut set = loaded(&fixture);

        let doc = &files.delegated["opkl"];
        assert!(set.update_delegated_targets(doc, "opkl", "missing").is_err());
        let md = set.update_delegated_targets(doc, "opkl", "targets").unwrap();
        assert_eq!(md.version(), 1);
    }

    #[test]
    fn expired_metadata_is_rejected() {
        let expired = chrono::Utc::now() - chrono::Duration::days(1);
        let files = RepoFixture::new().expires(expired).build();
        let mut set = StructuralTrustSet::from_root(files.initial_root()).unwrap();
        assert!(set.update_timestamp(&files.timestamp).is_err());
    }
}
