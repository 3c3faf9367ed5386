//! OCI layout write and read-back.

use std::collections::BTreeMap;
use std::fs;

use tufm_core::{ArtifactError, MirrorError};
use tufm_oci::{Artifact, Image, Index, OciLayout, OCI_MANIFEST_MEDIA_TYPE};

const KEY: &str = "tuf.io/filename";
const LAYER: &str = "application/vnd.tuf.metadata+json";

fn metadata_image() -> Image {
    ["1.root.json", "snapshot.json", "targets.json", "timestamp.json"]
        .iter()
        .fold(Image::builder(), |b, name| {
            b.annotated_layer(format!("{{\"{name}\":1}}").into_bytes(), LAYER, KEY, name)
        })
        .build()
        .unwrap()
}

#[test]
fn single_image_round_trips_through_layout() {
    let tmp = tempfile::tempdir().unwrap();
    let image = metadata_image();
    OciLayout::write(tmp.path().join("metadata"), &image.clone().into()).unwrap();

    let layout = OciLayout::open(tmp.path().join("metadata")).unwrap();
    let index = layout.index().unwrap();
    assert_eq!(index.manifests.len(), 1);
    let entry = &index.manifests[0];
    assert_eq!(entry.media_type, OCI_MANIFEST_MEDIA_TYPE);
    assert_eq!(entry.digest, image.digest());

    let names: Vec<_> = layout
        .layers(&entry.digest)
        .unwrap()
        .into_iter()
        .map(|(d, bytes)| {
            let name = d.annotation(KEY).unwrap().to_string();
            assert_eq!(bytes, format!("{{\"{name}\":1}}").into_bytes());
            name
        })
        .collect();
    assert_eq!(
        names,
        ["1.root.json", "snapshot.json", "targets.json", "timestamp.json"]
    );
}

#[test]
fn index_becomes_the_layout_entry_point() {
    let tmp = tempfile::tempdir().unwrap();
    let child = |name: &str| {
        Image::builder()
            .annotated_layer(name.as_bytes().to_vec(), LAYER, KEY, name)
            .build()
            .unwrap()
    };
    let index = Index::builder()
        .manifest(
            child("1.a.json"),
            BTreeMap::from([(KEY.to_string(), "opkl/1.a.json".to_string())]),
        )
        .manifest(
            child("1.b.json"),
            BTreeMap::from([(KEY.to_string(), "opkl/1.b.json".to_string())]),
        )
        .build()
        .unwrap();
    let artifact = Artifact::from(index.clone());

    let layout = OciLayout::write(tmp.path(), &artifact).unwrap();
    assert_eq!(
        fs::read(tmp.path().join("index.json")).unwrap(),
        index.index_bytes()
    );

    let read = layout.index().unwrap();
    let entries: Vec<_> = read
        .manifests
        .iter()
        .map(|d| d.annotation(KEY).unwrap())
        .collect();
    assert_eq!(entries, ["opkl/1.a.json", "opkl/1.b.json"]);
    for descriptor in &read.manifests {
        let layers = layout.layers(&descriptor.digest).unwrap();
        assert_eq!(layers.len(), 1);
    }
}

#[test]
fn rewriting_a_layout_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let artifact = Artifact::from(metadata_image());
    OciLayout::write(tmp.path(), &artifact).unwrap();
    let first = fs::read(tmp.path().join("index.json")).unwrap();
    OciLayout::write(tmp.path(), &artifact).unwrap();
    assert_eq!(fs::read(tmp.path().join("index.json")).unwrap(), first);
}

#[test]
fn tampered_blob_fails_verification() {
    let tmp = tempfile::tempdir().unwrap();
    let image = metadata_image();
    let layout = OciLayout::write(tmp.path(), &image.clone().into()).unwrap();

    let victim = &image.layers()[0];
    fs::write(layout.blob_path(&victim.digest), b"tampered").unwrap();

    let err = layout.layers(&image.digest()).unwrap_err();
    assert!(matches!(
        err,
        MirrorError::Artifact(ArtifactError::Layout { .. })
    ));
}
