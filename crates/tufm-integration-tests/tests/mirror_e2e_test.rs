//! # End-to-End Mirror: TUF Repository to OCI Layouts and a Registry
//!
//! One fixture repository, served over wiremock, mirrored the way an
//! operator would: pin the first root, open the mirror, publish metadata and
//! targets, then read the results back from disk or from what the registry
//! received.

use std::fs;
use std::time::Duration;

use proptest::prelude::*;
use tufm_client::{CacheStatus, ClientConfig};
use tufm_core::naming::{target_tag, TUF_FILE_ANNOTATION, TUF_METADATA_MEDIA_TYPE};
use tufm_core::{sha256_hex, MirrorError, TargetFile, TrustError};
use tufm_mirror::{Destination, Publisher, TufMirror};
use tufm_oci::{AnonymousKeychain, OciLayout, OCI_INDEX_MEDIA_TYPE};
use tufm_testkit::{
    metadata_url, targets_url, FixtureRole, RepoFiles, RepoFixture, StructuralTrustSet,
};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Mirror = TufMirror<StructuralTrustSet>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(tuf_path: &std::path::Path, server: &MockServer) -> ClientConfig {
    ClientConfig::new(tuf_path, metadata_url(server), targets_url(server))
}

fn publisher() -> Publisher {
    Publisher::new(AnonymousKeychain, Duration::from_secs(5)).unwrap()
}

/// Layer annotations of the single image a layout points at.
fn layout_layer_names(layout: &OciLayout) -> Vec<String> {
    let index = layout.index().unwrap();
    assert_eq!(index.manifests.len(), 1);
    layout
        .layers(&index.manifests[0].digest)
        .unwrap()
        .into_iter()
        .map(|(d, _)| d.annotation(TUF_FILE_ANNOTATION).unwrap().to_string())
        .collect()
}

async fn mirror_to_layouts(
    files: &RepoFiles,
    server: &MockServer,
    out: &std::path::Path,
    full: bool,
) -> Mirror {
    let cache = tempfile::tempdir().unwrap();
    let mut mirror = Mirror::open(files.initial_root(), config(cache.path(), server))
        .await
        .unwrap();
    mirror
        .mirror_all(
            &publisher(),
            &Destination::Layout(out.join("metadata")),
            &Destination::Layout(out.join("targets")),
            &targets_url(server),
            full,
        )
        .await
        .unwrap();
    mirror
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn minimal_repository_mirrors_to_layouts() {
    let (server, files) = RepoFixture::new().target("a.txt", b"hello").serve().await;
    let out = tempfile::tempdir().unwrap();
    mirror_to_layouts(&files, &server, out.path(), false).await;

    // Act 1: the metadata layout holds exactly the four top-level files.
    let metadata = OciLayout::open(out.path().join("metadata")).unwrap();
    assert_eq!(
        layout_layer_names(&metadata),
        ["1.root.json", "snapshot.json", "targets.json", "timestamp.json"]
    );
    let index = metadata.index().unwrap();
    let layers = metadata.layers(&index.manifests[0].digest).unwrap();
    assert!(layers
        .iter()
        .all(|(d, _)| d.media_type == TUF_METADATA_MEDIA_TYPE));
    assert_eq!(layers[0].1, files.roots[0]);

    // Act 2: one target layout tagged "<sha256>.a.txt".
    let tag = format!("{}.a.txt", sha256_hex(b"hello"));
    let entries: Vec<_> = fs::read_dir(out.path().join("targets"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries, [tag.clone()]);
    let target = OciLayout::open(out.path().join("targets").join(&tag)).unwrap();
    assert_eq!(layout_layer_names(&target), [tag.clone()]);

    // Act 3: index.json follows the OCI index format.
    let raw: serde_json::Value =
        serde_json::from_slice(&fs::read(out.path().join("metadata").join("index.json")).unwrap())
            .unwrap();
    assert_eq!(raw["schemaVersion"], 2);
    assert_eq!(raw["mediaType"], OCI_INDEX_MEDIA_TYPE);
}

#[tokio::test]
async fn rotated_consistent_repository_with_delegations() {
    let (server, files) = RepoFixture::new()
        .root_version(3)
        .consistent_snapshot(true)
        .versions(9, 6, 4)
        .target("bin/tool", b"tool")
        .delegation(
            FixtureRole::new("sub", &["sub/*"])
                .version(2)
                .target("sub/x.json", b"x"),
        )
        .serve()
        .await;
    let out = tempfile::tempdir().unwrap();
    mirror_to_layouts(&files, &server, out.path(), true).await;

    let metadata = OciLayout::open(out.path().join("metadata")).unwrap();
    assert_eq!(
        layout_layer_names(&metadata),
        [
            "1.root.json",
            "2.root.json",
            "3.root.json",
            "6.snapshot.json",
            "4.targets.json",
            "timestamp.json"
        ]
    );
    let index = metadata.index().unwrap();
    let layers = metadata.layers(&index.manifests[0].digest).unwrap();
    for (i, root) in files.roots.iter().enumerate() {
        assert_eq!(&layers[i].1, root);
    }

    let delegated = OciLayout::open(out.path().join("metadata").join("sub")).unwrap();
    assert_eq!(layout_layer_names(&delegated), ["2.sub.json"]);

    // Target paths with directories land in nested layout directories.
    let tag = format!("{}.bin/tool", sha256_hex(b"tool"));
    assert!(OciLayout::open(out.path().join("targets").join(&tag)).is_ok());

    let sub = OciLayout::open(out.path().join("targets").join("sub")).unwrap();
    let entries: Vec<_> = sub
        .index()
        .unwrap()
        .manifests
        .iter()
        .map(|d| d.annotation(TUF_FILE_ANNOTATION).unwrap().to_string())
        .collect();
    assert_eq!(entries, [format!("sub/{}.x.json", sha256_hex(b"x"))]);
}

#[tokio::test]
async fn repeated_runs_reuse_the_root_and_produce_identical_artifacts() {
    let (server, files) = RepoFixture::new().target("a.txt", b"a").serve().await;
    let cache = tempfile::tempdir().unwrap();

    let mut digests = Vec::new();
    for expected in [CacheStatus::Written, CacheStatus::Reused] {
        let mut mirror = Mirror::open(files.initial_root(), config(cache.path(), &server))
            .await
            .unwrap();
        assert_eq!(mirror.client().root_cache_status(), expected);
        let image = mirror.metadata_artifact(&metadata_url(&server)).await.unwrap();
        let targets = mirror
            .top_level_target_artifacts(&targets_url(&server))
            .await
            .unwrap();
        digests.push((image.digest(), targets[0].tag.clone(), targets[0].artifact.digest()));
    }
    assert_eq!(digests[0], digests[1]);
}

#[tokio::test]
async fn corrupt_root_never_opens() {
    let (server, _files) = RepoFixture::new().serve().await;
    let cache = tempfile::tempdir().unwrap();
    for _ in 0..2 {
        let err = Mirror::open(b"not a root", config(cache.path(), &server))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Trust(TrustError::MalformedMetadata { .. })));
    }
}

#[tokio::test]
async fn targets_push_to_registry_by_tag() {
    let (server, files) = RepoFixture::new()
        .target("a.txt", b"a")
        .delegation(FixtureRole::new("sub", &["sub/*"]).target("sub/x.json", b"x"))
        .serve()
        .await;
    let cache = tempfile::tempdir().unwrap();
    let mut mirror = Mirror::open(files.initial_root(), config(cache.path(), &server))
        .await
        .unwrap();

    let registry = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v2/$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&registry)
        .await;
    Mock::given(method("HEAD"))
        .and(path_regex(r"^/v2/tuf/targets/blobs/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&registry)
        .await;
    // a.txt by tag, the sub index by tag, its one child by digest
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v2/tuf/targets/manifests/"))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&registry)
        .await;

    let dest: Destination = format!("docker://{}/tuf/targets", registry.address())
        .parse()
        .unwrap();
    let published = mirror
        .mirror_targets(&publisher(), &dest, &targets_url(&server), true)
        .await
        .unwrap();

    let tags: Vec<_> = published
        .iter()
        .map(|p| match &p.destination {
            Destination::Registry(r) => r.tag().to_string(),
            Destination::Layout(_) => unreachable!("registry destination"),
        })
        .collect();
    assert_eq!(tags, [format!("{}.a.txt", sha256_hex(b"a")), "sub".to_string()]);
}

// ---------------------------------------------------------------------------
// Naming properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn target_tags_are_content_hash_then_path(
        bytes in proptest::collection::vec(any::<u8>(), 0..256),
        path in "[a-z][a-z0-9._-]{0,20}",
    ) {
        let target = TargetFile {
            length: bytes.len() as u64,
            hashes: [("sha256".to_string(), sha256_hex(&bytes))].into_iter().collect(),
            custom: None,
        };
        let tag = target_tag(&path, &target).unwrap();
        prop_assert_eq!(tag.clone(), format!("{}.{}", sha256_hex(&bytes), path));
        prop_assert_eq!(target_tag(&path, &target).unwrap(), tag);
    }
}
