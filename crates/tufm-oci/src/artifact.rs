//! # OCI Artifact Model
//!
//! Images and indexes as the mirror builds them: every blob held in memory,
//! every manifest serialized once at build time so its digest is fixed.
//!
//! ## Determinism
//!
//! Manifests carry no timestamps and annotations are kept in sorted maps, so
//! the same layers always produce the same manifest bytes and digest. Tags
//! derived from content stay stable across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tufm_core::{sha256_digest, ArtifactError, ContentDigest};

/// `application/vnd.oci.image.manifest.v1+json`
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// `application/vnd.oci.image.index.v1+json`
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// `application/vnd.oci.image.config.v1+json`
pub const OCI_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";

/// Content descriptor: what a manifest or index says about a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: ContentDigest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    /// The value of annotation `key`, if present.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// An OCI image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// An OCI image index. Also the format of a layout's `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ImageIndex {
    /// An index listing `manifests`.
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(OCI_INDEX_MEDIA_TYPE.to_string()),
            manifests,
            annotations: BTreeMap::new(),
        }
    }
}

#[derive(Serialize)]
struct ImageConfig<'a> {
    architecture: &'a str,
    os: &'a str,
    config: BTreeMap<String, String>,
    rootfs: RootFs,
}

#[derive(Serialize)]
struct RootFs {
    #[serde(rename = "type")]
    kind: &'static str,
    diff_ids: Vec<ContentDigest>,
}

/// Raw bytes plus their digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub digest: ContentDigest,
    pub bytes: Vec<u8>,
}

impl Blob {
    /// Wrap `bytes`, computing the digest.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            digest: sha256_digest(&bytes),
            bytes,
        }
    }

    /// A descriptor for this blob.
    pub fn descriptor(&self, media_type: &str, annotations: BTreeMap<String, String>) -> Descriptor {
        Descriptor {
            media_type: media_type.to_string(),
            digest: self.digest,
            size: self.bytes.len() as u64,
            annotations,
        }
    }
}

/// A built image: manifest, config and layers.
#[derive(Debug, Clone)]
pub struct Image {
    manifest: ImageManifest,
    manifest_blob: Blob,
    config: Blob,
    layers: Vec<Blob>,
}

impl Image {
    /// Start an image with no layers.
    pub fn builder() -> ImageBuilder {
        ImageBuilder::default()
    }

    /// The parsed manifest.
    pub fn manifest(&self) -> &ImageManifest {
        &self.manifest
    }

    /// The serialized manifest.
    pub fn manifest_bytes(&self) -> &[u8] {
        &self.manifest_blob.bytes
    }

    /// Digest of the serialized manifest.
    pub fn digest(&self) -> ContentDigest {
        self.manifest_blob.digest
    }

    /// Descriptor of the manifest, as an index or `index.json` lists it.
    pub fn descriptor(&self, annotations: BTreeMap<String, String>) -> Descriptor {
        self.manifest_blob
            .descriptor(OCI_MANIFEST_MEDIA_TYPE, annotations)
    }

    /// The config blob.
    pub fn config(&self) -> &Blob {
        &self.config
    }

    /// Layer blobs in manifest order.
    pub fn layers(&self) -> &[Blob] {
        &self.layers
    }

    /// Config then layers: every blob the manifest references.
    pub fn blobs(&self) -> impl Iterator<Item = &Blob> {
        std::iter::once(&self.config).chain(&self.layers)
    }
}

/// Builder for [`Image`].
#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    layers: Vec<(Blob, Descriptor)>,
}

impl ImageBuilder {
    /// Append an uncompressed layer.
    pub fn layer(
        mut self,
        bytes: Vec<u8>,
        media_type: &str,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        let blob = Blob::new(bytes);
        let descriptor = blob.descriptor(media_type, annotations);
        self.layers.push((blob, descriptor));
        self
    }

    /// Append a layer carrying one annotation.
    pub fn annotated_layer(self, bytes: Vec<u8>, media_type: &str, key: &str, value: &str) -> Self {
        let annotations = BTreeMap::from([(key.to_string(), value.to_string())]);
        self.layer(bytes, media_type, annotations)
    }

    /// Serialize config and manifest.
    pub fn build(self) -> Result<Image, ArtifactError> {
        let (layers, descriptors): (Vec<_>, Vec<_>) = self.layers.into_iter().unzip();
        let config = Blob::new(serde_json::to_vec(&ImageConfig {
            architecture: "",
            os: "",
            config: BTreeMap::new(),
            rootfs: RootFs {
                kind: "layers",
                diff_ids: descriptors.iter().map(|d| d.digest).collect(),
            },
        })?);
        let manifest = ImageManifest {
            schema_version: 2,
            media_type: Some(OCI_MANIFEST_MEDIA_TYPE.to_string()),
            config: config.descriptor(OCI_CONFIG_MEDIA_TYPE, BTreeMap::new()),
            layers: descriptors,
            annotations: BTreeMap::new(),
        };
        let manifest_blob = Blob::new(serde_json::to_vec(&manifest)?);
        Ok(Image {
            manifest,
            manifest_blob,
            config,
            layers,
        })
    }
}

/// A built index and the images it lists.
#[derive(Debug, Clone)]
pub struct Index {
    index: ImageIndex,
    index_blob: Blob,
    images: Vec<Image>,
}

impl Index {
    /// Start an empty index.
    pub fn builder() -> IndexBuilder {
        IndexBuilder::default()
    }

    /// The parsed index.
    pub fn index(&self) -> &ImageIndex {
        &self.index
    }

    /// The serialized index.
    pub fn index_bytes(&self) -> &[u8] {
        &self.index_blob.bytes
    }

    /// Digest of the serialized index.
    pub fn digest(&self) -> ContentDigest {
        self.index_blob.digest
    }

    /// Child images in index order.
    pub fn images(&self) -> &[Image] {
        &self.images
    }
}

/// Builder for [`Index`].
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    entries: Vec<(Image, BTreeMap<String, String>)>,
}

impl IndexBuilder {
    /// Append `image`, annotating its descriptor in the index.
    pub fn manifest(mut self, image: Image, annotations: BTreeMap<String, String>) -> Self {
        self.entries.push((image, annotations));
        self
    }

    /// Serialize the index.
    pub fn build(self) -> Result<Index, ArtifactError> {
        let mut manifests = Vec::with_capacity(self.entries.len());
        let mut images = Vec::with_capacity(self.entries.len());
        for (image, annotations) in self.entries {
            manifests.push(image.descriptor(annotations));
            images.push(image);
        }
        let index = ImageIndex::new(manifests);
        let index_blob = Blob::new(serde_json::to_vec(&index)?);
        Ok(Index {
            index,
            index_blob,
            images,
        })
    }
}

/// Either shape of artifact the mirror produces.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// A single image.
    Single(Image),
    /// An index of images.
    Indexed(Index),
}

impl Artifact {
    /// Digest of the top-level manifest or index.
    pub fn digest(&self) -> ContentDigest {
        match self {
            Self::Single(image) => image.digest(),
            Self::Indexed(index) => index.digest(),
        }
    }

    /// Media type of the top-level document.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Single(_) => OCI_MANIFEST_MEDIA_TYPE,
            Self::Indexed(_) => OCI_INDEX_MEDIA_TYPE,
        }
    }

    /// Serialized top-level document.
    pub fn manifest_bytes(&self) -> &[u8] {
        match self {
            Self::Single(image) => image.manifest_bytes(),
            Self::Indexed(index) => index.index_bytes(),
        }
    }

    /// The single image, if this is one.
    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Self::Single(image) => Some(image),
            Self::Indexed(_) => None,
        }
    }

    /// The index, if this is one.
    pub fn as_index(&self) -> Option<&Index> {
        match self {
            Self::Single(_) => None,
            Self::Indexed(index) => Some(index),
        }
    }
}

impl From<Image> for Artifact {
    fn from(image: Image) -> Self {
        Self::Single(image)
    }
}

impl From<Index> for Artifact {
    fn from(index: Index) -> Self {
        Self::Indexed(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "tuf.io/filename";
    const MEDIA: &str = "application/vnd.tuf.metadata+json";

    fn image(files: &[(&str, &[u8])]) -> Image {
        files
            .iter()
            .fold(Image::builder(), |b, (name, bytes)| {
                b.annotated_layer(bytes.to_vec(), MEDIA, KEY, name)
            })
            .build()
            .unwrap()
    }

    #[test]
    fn layers_keep_order_and_annotations() {
        let img = image(&[("1.root.json", b"r"), ("timestamp.json", b"t")]);
        let names: Vec<_> = img
            .manifest()
            .layers
            .iter()
            .map(|l| l.annotation(KEY).unwrap())
            .collect();
        assert_eq!(names, ["1.root.json", "timestamp.json"]);
        assert_eq!(img.manifest().layers[0].media_type, MEDIA);
        assert_eq!(img.manifest().layers[0].digest, sha256_digest(b"r"));
        assert_eq!(img.blobs().count(), 3);
    }

    #[test]
    fn manifest_is_deterministic() {
        let a = image(&[("a", b"1")]);
        let b = image(&[("a", b"1")]);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.manifest_bytes(), b.manifest_bytes());
        assert_ne!(a.digest(), image(&[("a", b"2")]).digest());
    }

    #[test]
    fn manifest_serializes_oci_field_names() {
        let img = image(&[("a", b"1")]);
        let json: serde_json::Value = serde_json::from_slice(img.manifest_bytes()).unwrap();
        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["mediaType"], OCI_MANIFEST_MEDIA_TYPE);
        assert_eq!(json["config"]["mediaType"], OCI_CONFIG_MEDIA_TYPE);
        assert_eq!(json["layers"][0]["annotations"][KEY], "a");
        assert!(json.get("annotations").is_none());
    }

    #[test]
    fn index_annotates_child_descriptors() {
        let child = image(&[("ff.policy.json", b"{}")]);
        let digest = child.digest();
        let index = Index::builder()
            .manifest(
                child,
                BTreeMap::from([(KEY.to_string(), "opkl/ff.policy.json".to_string())]),
            )
            .build()
            .unwrap();
        let entry = &index.index().manifests[0];
        assert_eq!(entry.digest, digest);
        assert_eq!(entry.media_type, OCI_MANIFEST_MEDIA_TYPE);
        assert_eq!(entry.annotation(KEY), Some("opkl/ff.policy.json"));

        let artifact = Artifact::from(index);
        assert_eq!(artifact.media_type(), OCI_INDEX_MEDIA_TYPE);
        assert!(artifact.as_index().is_some());
        assert!(artifact.as_image().is_none());
    }
}
