//! Fixture TUF repositories.
//!
//! [`RepoFixture`] generates a complete, internally consistent repository
//! (root chain, timestamp, snapshot, targets, delegated targets and target
//! files) and serves it from a wiremock server under `/metadata` and
//! `/targets`, laid out the way a static TUF repository is published.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tufm_core::naming::{consistent_version, role_file_name};
use tufm_core::{
    sha256_hex, DelegatedRole, Delegations, DigestAlgorithm, MetaFile, RoleType, Root, Snapshot,
    TargetFile, Targets, Timestamp,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A delegated targets role in a fixture repository.
#[derive(Debug, Clone)]
pub struct FixtureRole {
    name: String,
    paths: Vec<String>,
    version: u64,
    terminating: bool,
    targets: BTreeMap<String, Vec<u8>>,
    hashes: BTreeMap<String, Vec<DigestAlgorithm>>,
}

impl FixtureRole {
    /// A role trusted for `paths`, at version 1.
    pub fn new(name: &str, paths: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            version: 1,
            terminating: false,
            targets: BTreeMap::new(),
            hashes: BTreeMap::new(),
        }
    }

    /// Set the role's metadata version.
    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Mark the delegation as terminating.
    pub fn terminating(mut self, terminating: bool) -> Self {
        self.terminating = terminating;
        self
    }

    /// Add a target the role declares.
    pub fn target(mut self, path: &str, bytes: &[u8]) -> Self {
        self.targets.insert(path.to_string(), bytes.to_vec());
        self
    }

    /// Add a target declared with exactly `algorithms` in its hashes.
    pub fn target_hashed(
        mut self,
        path: &str,
        bytes: &[u8],
        algorithms: &[DigestAlgorithm],
    ) -> Self {
        self.hashes.insert(path.to_string(), algorithms.to_vec());
        self.target(path, bytes)
    }
}

/// Builder for a fixture repository.
#[derive(Debug, Clone)]
pub struct RepoFixture {
    root_version: u64,
    consistent_snapshot: bool,
    timestamp_version: u64,
    snapshot_version: u64,
    targets_version: u64,
    expires: DateTime<Utc>,
    targets: BTreeMap<String, Vec<u8>>,
    hashes: BTreeMap<String, Vec<DigestAlgorithm>>,
    roles: Vec<FixtureRole>,
}

impl Default for RepoFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl RepoFixture {
    /// A repository at root version 1 without consistent snapshot.
    pub fn new() -> Self {
        Self {
            root_version: 1,
            consistent_snapshot: false,
            timestamp_version: 1,
            snapshot_version: 1,
            targets_version: 1,
            expires: Utc
                .with_ymd_and_hms(2099, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            targets: BTreeMap::new(),
            hashes: BTreeMap::new(),
            roles: Vec::new(),
        }
    }

    /// Publish root versions `1..=version`.
    pub fn root_version(mut self, version: u64) -> Self {
        self.root_version = version.max(1);
        self
    }

    /// Toggle consistent-snapshot naming.
    pub fn consistent_snapshot(mut self, consistent: bool) -> Self {
        self.consistent_snapshot = consistent;
        self
    }

    /// Set timestamp, snapshot and targets versions.
    pub fn versions(mut self, timestamp: u64, snapshot: u64, targets: u64) -> Self {
        self.timestamp_version = timestamp;
        self.snapshot_version = snapshot;
        self.targets_version = targets;
        self
    }

    /// Set the expiry of every generated document.
    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = expires;
        self
    }

    /// Add a top-level target.
    pub fn target(mut self, path: &str, bytes: &[u8]) -> Self {
        self.targets.insert(path.to_string(), bytes.to_vec());
        self
    }

    /// Add a top-level target declared with exactly `algorithms` in its
    /// hashes. Plain [`RepoFixture::target`] declares sha256 only.
    pub fn target_hashed(
        mut self,
        path: &str,
        bytes: &[u8],
        algorithms: &[DigestAlgorithm],
    ) -> Self {
        self.hashes.insert(path.to_string(), algorithms.to_vec());
        self.target(path, bytes)
    }

    /// Add a delegated role to top-level targets, in declaration order.
    pub fn delegation(mut self, role: FixtureRole) -> Self {
        self.roles.push(role);
        self
    }

    /// Generate every file of the repository.
    pub fn build(&self) -> RepoFiles {
        let consistent = self.consistent_snapshot;
        let mut files = RepoFiles::default();

        for version in 1..=self.root_version {
            files.roots.push(signed(&Root {
                kind: RoleType::Root,
                spec_version: SPEC_VERSION.into(),
                version,
                expires: self.expires,
                consistent_snapshot: consistent,
                keys: BTreeMap::new(),
                roles: BTreeMap::new(),
            }));
        }

        let mut snapshot_meta = BTreeMap::new();
        for role in &self.roles {
            let doc = signed(&Targets {
                kind: RoleType::Targets,
                spec_version: SPEC_VERSION.into(),
                version: role.version,
                expires: self.expires,
                targets: target_entries(&role.targets, &role.hashes),
                delegations: None,
            });
            snapshot_meta.insert(format!("{}.json", role.name), meta_for(role.version, &doc));
            files.delegated.insert(role.name.clone(), doc);
            for (path, bytes) in &role.targets {
                files.target_files.insert(path.clone(), bytes.clone());
            }
        }

        let delegations = (!self.roles.is_empty()).then(|| Delegations {
            keys: BTreeMap::new(),
            roles: self
                .roles
                .iter()
                .map(|r| DelegatedRole {
                    name: r.name.clone(),
                    keyids: vec![],
                    threshold: 1,
                    terminating: r.terminating,
                    paths: Some(r.paths.clone()),
                    path_hash_prefixes: None,
                })
                .collect(),
        });
        files.targets = signed(&Targets {
            kind: RoleType::Targets,
            spec_version: SPEC_VERSION.into(),
            version: self.targets_version,
            expires: self.expires,
            targets: target_entries(&self.targets, &self.hashes),
            delegations,
        });
        for (path, bytes) in &self.targets {
            files.target_files.insert(path.clone(), bytes.clone());
        }
        snapshot_meta.insert(
            "targets.json".into(),
            meta_for(self.targets_version, &files.targets),
        );

        files.snapshot = signed(&Snapshot {
            kind: RoleType::Snapshot,
            spec_version: SPEC_VERSION.into(),
            version: self.snapshot_version,
            expires: self.expires,
            meta: snapshot_meta,
        });
        files.timestamp = signed(&Timestamp {
            kind: RoleType::Timestamp,
            spec_version: SPEC_VERSION.into(),
            version: self.timestamp_version,
            expires: self.expires,
            meta: BTreeMap::from([(
                "snapshot.json".to_string(),
                meta_for(self.snapshot_version, &files.snapshot),
            )]),
        });

        files.consistent_snapshot = consistent;
        files.snapshot_version = self.snapshot_version;
        files.targets_version = self.targets_version;
        files.role_versions = self
            .roles
            .iter()
            .map(|r| (r.name.clone(), r.version))
            .collect();
        files
    }

    /// Generate the repository and serve it from a fresh mock server.
    pub async fn serve(&self) -> (MockServer, RepoFiles) {
        let server = MockServer::start().await;
        let files = self.build();
        files.mount(&server).await;
        (server, files)
    }
}

const SPEC_VERSION: &str = "1.0.31";

/// Every file of a generated repository.
#[derive(Debug, Clone, Default)]
pub struct RepoFiles {
    /// Root documents, index `i` holding version `i + 1`.
    pub roots: Vec<Vec<u8>>,
    pub timestamp: Vec<u8>,
    pub snapshot: Vec<u8>,
    pub targets: Vec<u8>,
    /// Delegated targets metadata by role name.
    pub delegated: BTreeMap<String, Vec<u8>>,
    /// Target contents by target path, top-level and delegated.
    pub target_files: BTreeMap<String, Vec<u8>>,
    pub consistent_snapshot: bool,
    pub snapshot_version: u64,
    pub targets_version: u64,
    role_versions: BTreeMap<String, u64>,
}

impl RepoFiles {
    /// The first root, as a caller would pin it.
    pub fn initial_root(&self) -> &[u8] {
        self.roots.first().map(Vec::as_slice).unwrap_or_default()
    }

    /// The newest root.
    pub fn current_root(&self) -> &[u8] {
        self.roots.last().map(Vec::as_slice).unwrap_or_default()
    }

    /// Metadata files as served, by filename.
    pub fn metadata_files(&self) -> BTreeMap<String, Vec<u8>> {
        let c = self.consistent_snapshot;
        let mut served = BTreeMap::new();
        for (i, root) in self.roots.iter().enumerate() {
            served.insert(role_file_name("root", Some(i as u64 + 1)), root.clone());
        }
        served.insert("timestamp.json".into(), self.timestamp.clone());
        served.insert(
            role_file_name("snapshot", consistent_version(c, self.snapshot_version)),
            self.snapshot.clone(),
        );
        served.insert(
            role_file_name("targets", consistent_version(c, self.targets_version)),
            self.targets.clone(),
        );
        for (role, doc) in &self.delegated {
            let version = self.role_versions.get(role).copied().unwrap_or(1);
            served.insert(
                role_file_name(role, consistent_version(c, version)),
                doc.clone(),
            );
        }
        served
    }

    /// Target files as served, by path relative to the targets base.
    pub fn served_targets(&self) -> BTreeMap<String, Vec<u8>> {
        self.target_files
            .iter()
            .map(|(path, bytes)| {
                let served = if self.consistent_snapshot {
                    let hash = sha256_hex(bytes);
                    match path.rsplit_once('/') {
                        Some((dir, base)) => format!("{dir}/{hash}.{base}"),
                        None => format!("{hash}.{path}"),
                    }
                } else {
                    path.clone()
                };
                (served, bytes.clone())
            })
            .collect()
    }

    /// Mount every file on `server` under `/metadata/` and `/targets/`.
    pub async fn mount(&self, server: &MockServer) {
        for (name, bytes) in self.metadata_files() {
            mount_file(server, &format!("/metadata/{name}"), bytes).await;
        }
        for (name, bytes) in self.served_targets() {
            mount_file(server, &format!("/targets/{name}"), bytes).await;
        }
    }
}

/// `<server>/metadata`.
pub fn metadata_url(server: &MockServer) -> Url {
    base_url(server, "metadata")
}

/// `<server>/targets`.
pub fn targets_url(server: &MockServer) -> Url {
    base_url(server, "targets")
}

fn base_url(server: &MockServer, dir: &str) -> Url {
    Url::parse(&format!("{}/{dir}", server.uri())).expect("mock server URI is a valid URL")
}

async fn mount_file(server: &MockServer, route: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(server)
        .await;
}

fn signed<T: Serialize>(signed: &T) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "signed": signed,
        "signatures": [{"keyid": "fixture", "sig": "00"}],
    }))
    .expect("fixture metadata serializes")
}

fn meta_for(version: u64, doc: &[u8]) -> MetaFile {
    MetaFile {
        version,
        length: Some(doc.len() as u64),
        hashes: Some(BTreeMap::from([("sha256".to_string(), sha256_hex(doc))])),
    }
}

fn target_entries(
    targets: &BTreeMap<String, Vec<u8>>,
    hashes: &BTreeMap<String, Vec<DigestAlgorithm>>,
) -> BTreeMap<String, TargetFile> {
    targets
        .iter()
        .map(|(path, bytes)| {
            let algorithms = hashes
                .get(path)
                .map(Vec::as_slice)
                .unwrap_or(&[DigestAlgorithm::Sha256]);
            (
                path.clone(),
                TargetFile {
                    length: bytes.len() as u64,
                    hashes: algorithms
                        .iter()
                        .map(|a| (a.name().to_string(), a.hex_digest(bytes)))
                        .collect(),
                    custom: None,
                },
            )
        })
        .collect()
}
