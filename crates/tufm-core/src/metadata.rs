//! # TUF Metadata Model
//!
//! Serde model of the four top-level TUF roles and delegated targets roles,
//! covering the fields the mirror reads. Unknown fields are ignored so that
//! newer repositories still parse.
//!
//! [`Metadata<T>`] pairs a parsed envelope with the exact bytes it was parsed
//! from. The mirror always republishes those bytes, never a re-serialization,
//! so mirrored files stay byte-identical to the source.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::digest::sha256_hex;
use crate::error::TrustError;

/// The `_type` of a TUF metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    Root,
    Snapshot,
    Targets,
    Timestamp,
}

impl RoleType {
    /// The top-level roles in the order their artifacts are laid out.
    pub const TOP_LEVEL: [RoleType; 4] = [
        RoleType::Root,
        RoleType::Snapshot,
        RoleType::Targets,
        RoleType::Timestamp,
    ];

    /// The role name as used in filenames and metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Snapshot => "snapshot",
            Self::Targets => "targets",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common accessors over the `signed` portion of every role.
pub trait Role: DeserializeOwned {
    /// The `_type` documents of this role must carry.
    const TYPE: RoleType;

    /// The declared `_type`.
    fn kind(&self) -> RoleType;

    /// Metadata version number.
    fn version(&self) -> u64;

    /// Expiry instant.
    fn expires(&self) -> DateTime<Utc>;
}

/// A signature entry. The mirror carries signatures but never checks them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    pub sig: String,
}

/// A public key entry as declared by root or a delegating targets role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: serde_json::Value,
}

/// Key ids and threshold for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u64,
}

#[derive(Deserialize)]
struct Envelope<T> {
    signed: T,
    #[serde(default)]
    signatures: Vec<Signature>,
}

/// A parsed metadata document together with its source bytes.
#[derive(Debug, Clone)]
pub struct Metadata<T> {
    /// The parsed `signed` payload.
    pub signed: T,
    /// Signatures over `signed`.
    pub signatures: Vec<Signature>,
    raw: Vec<u8>,
}

impl<T: Role> Metadata<T> {
    /// Parse a metadata document, checking its `_type` against `T`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TrustError> {
        let envelope: Envelope<T> =
            serde_json::from_slice(bytes).map_err(|e| TrustError::MalformedMetadata {
                role: T::TYPE.to_string(),
                reason: e.to_string(),
            })?;
        if envelope.signed.kind() != T::TYPE {
            return Err(TrustError::MalformedMetadata {
                role: T::TYPE.to_string(),
                reason: format!("_type is {}", envelope.signed.kind()),
            });
        }
        Ok(Self {
            signed: envelope.signed,
            signatures: envelope.signatures,
            raw: bytes.to_vec(),
        })
    }

    /// The exact bytes this document was parsed from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Shorthand for `signed.version()`.
    pub fn version(&self) -> u64 {
        self.signed.version()
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// The root role: keys, role thresholds, and repository-wide flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    #[serde(rename = "_type")]
    pub kind: RoleType,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    #[serde(default)]
    pub consistent_snapshot: bool,
    #[serde(default)]
    pub keys: BTreeMap<String, Key>,
    #[serde(default)]
    pub roles: BTreeMap<String, RoleKeys>,
}

impl Role for Root {
    const TYPE: RoleType = RoleType::Root;

    fn kind(&self) -> RoleType {
        self.kind
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

// ---------------------------------------------------------------------------
// Timestamp and snapshot
// ---------------------------------------------------------------------------

/// A `meta` entry describing another metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<BTreeMap<String, String>>,
}

/// The timestamp role: points at the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(rename = "_type")]
    pub kind: RoleType,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub meta: BTreeMap<String, MetaFile>,
}

impl Timestamp {
    /// The `snapshot.json` entry.
    pub fn snapshot_meta(&self) -> Option<&MetaFile> {
        self.meta.get("snapshot.json")
    }
}

impl Role for Timestamp {
    const TYPE: RoleType = RoleType::Timestamp;

    fn kind(&self) -> RoleType {
        self.kind
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

/// The snapshot role: versions of every targets metadata file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "_type")]
    pub kind: RoleType,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub meta: BTreeMap<String, MetaFile>,
}

impl Snapshot {
    /// The meta entry for a targets role (`"<role>.json"`).
    pub fn role_meta(&self, role: &str) -> Option<&MetaFile> {
        self.meta.get(&format!("{role}.json"))
    }
}

impl Role for Snapshot {
    const TYPE: RoleType = RoleType::Snapshot;

    fn kind(&self) -> RoleType {
        self.kind
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// A target file entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFile {
    pub length: u64,
    pub hashes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
}

impl TargetFile {
    /// The declared sha256 hex digest, if any.
    pub fn sha256(&self) -> Option<&str> {
        self.hashes.get("sha256").map(String::as_str)
    }
}

/// A role delegated to by a targets role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: String,
    pub keyids: Vec<String>,
    pub threshold: u64,
    #[serde(default)]
    pub terminating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_hash_prefixes: Option<Vec<String>>,
}

impl DelegatedRole {
    /// Declared path patterns; empty when the role delegates by hash prefix.
    pub fn path_patterns(&self) -> &[String] {
        self.paths.as_deref().unwrap_or_default()
    }

    /// Whether this role is trusted for `target_path`.
    pub fn is_delegated_path(&self, target_path: &str) -> bool {
        if let Some(patterns) = &self.paths {
            return patterns.iter().any(|p| path_matches(p, target_path));
        }
        if let Some(prefixes) = &self.path_hash_prefixes {
            let hash = sha256_hex(target_path.as_bytes());
            return prefixes.iter().any(|p| hash.starts_with(p.as_str()));
        }
        false
    }
}

/// Keys and roles a targets role delegates to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegations {
    #[serde(default)]
    pub keys: BTreeMap<String, Key>,
    pub roles: Vec<DelegatedRole>,
}

/// A targets role, top-level or delegated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    #[serde(rename = "_type")]
    pub kind: RoleType,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,
}

impl Targets {
    /// Delegated roles in declared order.
    pub fn delegated_roles(&self) -> &[DelegatedRole] {
        self.delegations
            .as_ref()
            .map(|d| d.roles.as_slice())
            .unwrap_or_default()
    }

    /// Look up a delegated role by name.
    pub fn delegated_role(&self, name: &str) -> Option<&DelegatedRole> {
        self.delegated_roles().iter().find(|r| r.name == name)
    }
}

impl Role for Targets {
    const TYPE: RoleType = RoleType::Targets;

    fn kind(&self) -> RoleType {
        self.kind
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

/// Shell-style match of a TUF path pattern against a target path.
///
/// Patterns and paths are compared segment by segment, so no wildcard
/// crosses `/`. Within a segment `*`, `?` and `[...]` classes follow
/// [`glob::Pattern`]; a segment that is not a valid pattern matches nothing.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    pattern_segments.len() == path_segments.len()
        && pattern_segments
            .iter()
            .zip(&path_segments)
            .all(|(p, s)| segment_matches(p, s))
}

fn segment_matches(pattern: &str, segment: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(segment))
        .unwrap_or(false)
}
