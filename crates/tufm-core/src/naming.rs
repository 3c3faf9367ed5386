//! # Artifact Naming Rules
//!
//! Every filename, tag, and annotation the mirror emits is derived here.
//! Consumers of mirrored artifacts resolve TUF files by these names, so the
//! rules are bit-exact:
//!
//! | Item | Name |
//! |------|------|
//! | root file | `<version>.root.json` (always versioned) |
//! | snapshot / targets / delegated targets | `<version>.<role>.json` under consistent snapshot, else `<role>.json` |
//! | timestamp | `timestamp.json` |
//! | top-level target tag | `<sha256>.<path>` |
//! | delegated target annotation | `<subdir>/<sha256>.<filename>` |
//! | delegated metadata tag | role name |
//! | delegated index tag | subdirectory |

use crate::error::MappingError;
use crate::metadata::{DelegatedRole, RoleType, TargetFile};

/// Annotation key carrying a layer's or index entry's TUF filename.
pub const TUF_FILE_ANNOTATION: &str = "tuf.io/filename";

/// Media type of layers holding TUF metadata.
pub const TUF_METADATA_MEDIA_TYPE: &str = "application/vnd.tuf.metadata+json";

/// Media type of layers holding TUF target files.
pub const TUF_TARGET_MEDIA_TYPE: &str = "application/vnd.tuf.target";

/// A metadata file as mirrored: role, optional version qualifier, and bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFile {
    /// Role name (`root`, `snapshot`, `targets`, `timestamp`, or a delegated role).
    pub role: String,
    /// Version qualifier; `None` yields the unqualified name.
    pub version: Option<u64>,
    /// Exact metadata bytes.
    pub bytes: Vec<u8>,
}

impl RoleFile {
    /// A root file, always named by its own version.
    pub fn root(version: u64, bytes: Vec<u8>) -> Self {
        Self {
            role: RoleType::Root.to_string(),
            version: Some(version),
            bytes,
        }
    }

    /// The timestamp file, never version-qualified.
    pub fn timestamp(bytes: Vec<u8>) -> Self {
        Self {
            role: RoleType::Timestamp.to_string(),
            version: None,
            bytes,
        }
    }

    /// A snapshot or targets-family file, qualified only under consistent snapshot.
    pub fn versioned(role: &str, version: u64, consistent_snapshot: bool, bytes: Vec<u8>) -> Self {
        Self {
            role: role.to_string(),
            version: consistent_version(consistent_snapshot, version),
            bytes,
        }
    }

    /// The on-disk filename for this file.
    pub fn file_name(&self) -> String {
        role_file_name(&self.role, self.version)
    }
}

/// `"<version>.<role>.json"` when a version is given, else `"<role>.json"`.
pub fn role_file_name(role: &str, version: Option<u64>) -> String {
    match version {
        Some(v) => format!("{v}.{role}.json"),
        None => format!("{role}.json"),
    }
}

/// The version qualifier a versioned role carries.
pub fn consistent_version(consistent_snapshot: bool, version: u64) -> Option<u64> {
    consistent_snapshot.then_some(version)
}

/// Tag and layer annotation for a top-level target: `"<sha256>.<path>"`.
pub fn target_tag(path: &str, target: &TargetFile) -> Result<String, MappingError> {
    let hash = require_sha256(path, target)?;
    Ok(format!("{hash}.{path}"))
}

/// The sha256 hex a target must declare.
pub fn require_sha256<'a>(path: &str, target: &'a TargetFile) -> Result<&'a str, MappingError> {
    target.sha256().ok_or_else(|| MappingError::MissingSha256 {
        path: path.to_string(),
    })
}

/// The single subdirectory a delegated role is trusted for.
///
/// The role must declare exactly one pattern of the form `"<subdir>/*"` with
/// a flat, wildcard-free subdirectory that is a plain path component. The
/// subdirectory names a directory under the destination, so `.` and `..`
/// are refused.
pub fn delegated_subdir(role: &DelegatedRole) -> Result<String, MappingError> {
    let patterns = role.path_patterns();
    let invalid = || MappingError::InvalidPathPattern {
        role: role.name.clone(),
        patterns: patterns.to_vec(),
    };
    let [pattern] = patterns else {
        return Err(invalid());
    };
    let subdir = pattern.strip_suffix("/*").ok_or_else(invalid)?;
    if subdir.is_empty()
        || subdir == "."
        || subdir == ".."
        || subdir.contains(['/', '\\', '*', '?', '[', ']', '\0'])
    {
        return Err(invalid());
    }
    Ok(subdir.to_string())
}

/// Names for one target of a delegated role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedTargetName {
    /// Layer annotation: `"<sha256>.<filename>"`.
    pub layer: String,
    /// Index entry annotation: `"<subdir>/<sha256>.<filename>"`.
    pub entry: String,
}

/// Compute the names for `path` inside delegated role `role` rooted at `subdir`.
pub fn delegated_target_name(
    role: &str,
    subdir: &str,
    path: &str,
    target: &TargetFile,
) -> Result<DelegatedTargetName, MappingError> {
    let hash = require_sha256(path, target)?;
    let filename = path
        .strip_prefix(subdir)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|f| !f.is_empty())
        .ok_or_else(|| MappingError::TargetOutsideSubdirectory {
            role: role.to_string(),
            subdir: subdir.to_string(),
            path: path.to_string(),
        })?;
    let layer = format!("{hash}.{filename}");
    Ok(DelegatedTargetName {
        entry: format!("{subdir}/{layer}"),
        layer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn target(hash: Option<&str>) -> TargetFile {
        let mut hashes = BTreeMap::new();
        if let Some(h) = hash {
            hashes.insert("sha256".to_string(), h.to_string());
        }
        TargetFile {
            length: 1,
            hashes,
            custom: None,
        }
    }

    fn role(paths: &[&str]) -> DelegatedRole {
        DelegatedRole {
            name: "opkl".into(),
            keyids: vec![],
            threshold: 1,
            terminating: false,
            paths: Some(paths.iter().map(|p| p.to_string()).collect()),
            path_hash_prefixes: None,
        }
    }

    #[test]
    fn root_files_are_always_versioned() {
        assert_eq!(RoleFile::root(1, vec![]).file_name(), "1.root.json");
        assert_eq!(RoleFile::root(12, vec![]).file_name(), "12.root.json");
    }

    #[test]
    fn timestamp_is_never_versioned() {
        assert_eq!(RoleFile::timestamp(vec![]).file_name(), "timestamp.json");
    }

    #[test]
    fn versioned_roles_follow_consistent_snapshot() {
        assert_eq!(
            RoleFile::versioned("snapshot", 4, true, vec![]).file_name(),
            "4.snapshot.json"
        );
        assert_eq!(
            RoleFile::versioned("snapshot", 4, false, vec![]).file_name(),
            "snapshot.json"
        );
        assert_eq!(
            RoleFile::versioned("opkl", 2, true, vec![]).file_name(),
            "2.opkl.json"
        );
    }

    #[test]
    fn top_level_target_tag() {
        assert_eq!(
            target_tag("a.txt", &target(Some("abc"))).unwrap(),
            "abc.a.txt"
        );
        assert!(matches!(
            target_tag("a.txt", &target(None)),
            Err(MappingError::MissingSha256 { .. })
        ));
    }

    #[test]
    fn subdir_requires_single_flat_pattern() {
        assert_eq!(delegated_subdir(&role(&["opkl/*"])).unwrap(), "opkl");
        assert!(delegated_subdir(&role(&[])).is_err());
        assert!(delegated_subdir(&role(&["a/*", "b/*"])).is_err());
        assert!(delegated_subdir(&role(&["opkl/*.json"])).is_err());
        assert!(delegated_subdir(&role(&["a/b/*"])).is_err());
        assert!(delegated_subdir(&role(&["/*"])).is_err());
        assert!(delegated_subdir(&role(&["*"])).is_err());
        assert!(delegated_subdir(&role(&["v[12]/*"])).is_err());

        let hashed = DelegatedRole {
            paths: None,
            path_hash_prefixes: Some(vec!["ab".into()]),
            ..role(&[])
        };
        assert!(matches!(
            delegated_subdir(&hashed),
            Err(MappingError::InvalidPathPattern { .. })
        ));
    }

    #[test]
    fn subdir_must_stay_under_the_destination() {
        for pattern in ["../*", "./*", "a\\b/*", "..\\x/*"] {
            assert!(
                matches!(
                    delegated_subdir(&role(&[pattern])),
                    Err(MappingError::InvalidPathPattern { .. })
                ),
                "{pattern} accepted"
            );
        }
        assert_eq!(delegated_subdir(&role(&["..opkl/*"])).unwrap(), "..opkl");
    }

    #[test]
    fn delegated_names_strip_subdir() {
        let names = delegated_target_name("opkl", "opkl", "opkl/policy.json", &target(Some("ff")))
            .unwrap();
        assert_eq!(names.layer, "ff.policy.json");
        assert_eq!(names.entry, "opkl/ff.policy.json");
    }

    #[test]
    fn delegated_names_reject_foreign_paths() {
        for path in ["other/policy.json", "opklx/policy.json", "opkl/", "opkl"] {
            assert!(matches!(
                delegated_target_name("opkl", "opkl", path, &target(Some("ff"))),
                Err(MappingError::TargetOutsideSubdirectory { .. })
            ));
        }
    }

    proptest! {
        #[test]
        fn qualified_name_embeds_version(version in 1u64..1_000_000, consistent: bool) {
            let name = RoleFile::versioned("targets", version, consistent, vec![]).file_name();
            if consistent {
                prop_assert_eq!(name, format!("{version}.targets.json"));
            } else {
                prop_assert_eq!(name, "targets.json");
            }
        }

        #[test]
        fn delegated_entry_is_prefixed(subdir in "[a-z][a-z0-9-]{0,15}", file in "[a-z0-9][a-z0-9._-]{0,30}", hash in "[0-9a-f]{64}") {
            let path = format!("{subdir}/{file}");
            let names = delegated_target_name("role", &subdir, &path, &target(Some(&hash))).unwrap();
            let expected_entry = format!("{}/{}.{}", subdir, hash, file);
            let prefix = format!("{subdir}/");
            prop_assert!(names.entry.starts_with(&prefix));
            prop_assert_eq!(names.entry, expected_entry);
        }
    }
}
