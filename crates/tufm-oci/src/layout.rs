//! # OCI Image Layout
//!
//! Persists artifacts as OCI image layout directories and reads them back.
//!
//! ```text
//! <dir>/oci-layout                 {"imageLayoutVersion":"1.0.0"}
//! <dir>/index.json                 entry point
//! <dir>/blobs/sha256/<hex>         content-addressed blobs
//! ```
//!
//! A single image is written with an `index.json` listing its manifest. An
//! index is written as the layout's `index.json` itself, with its child
//! images stored as blobs.
//!
//! ## Integrity
//!
//! Blobs are named by digest and written with create-new semantics, so an
//! existing blob is never rewritten. On read, every blob's digest is
//! recomputed and checked against its name.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tufm_core::{sha256_digest, ArtifactError, ContentDigest, MirrorError};

use crate::artifact::{Artifact, Blob, Descriptor, Image, ImageIndex, ImageManifest};

/// Name of the layout marker file.
pub const OCI_LAYOUT_FILE: &str = "oci-layout";

/// Name of the layout entry point.
pub const INDEX_FILE: &str = "index.json";

/// The image layout version this writer produces.
pub const IMAGE_LAYOUT_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutFile {
    image_layout_version: String,
}

/// An OCI image layout directory.
#[derive(Debug, Clone)]
pub struct OciLayout {
    root: PathBuf,
}

impl OciLayout {
    /// Write `artifact` as a layout at `root`, creating directories as needed.
    ///
    /// An existing `index.json` is replaced; existing blobs are kept.
    pub fn write(root: impl Into<PathBuf>, artifact: &Artifact) -> Result<Self, MirrorError> {
        let layout = Self { root: root.into() };
        fs::create_dir_all(layout.blob_dir()).map_err(|e| MirrorError::io(layout.blob_dir(), e))?;

        let marker = serde_json::to_vec(&LayoutFile {
            image_layout_version: IMAGE_LAYOUT_VERSION.to_string(),
        })
        .map_err(ArtifactError::from)?;
        layout.write_file(OCI_LAYOUT_FILE, &marker)?;

        let index_bytes = match artifact {
            Artifact::Single(image) => {
                layout.write_image(image)?;
                let index = ImageIndex::new(vec![image.descriptor(BTreeMap::new())]);
                serde_json::to_vec(&index).map_err(ArtifactError::from)?
            }
            Artifact::Indexed(index) => {
                for image in index.images() {
                    layout.write_image(image)?;
                }
                index.index_bytes().to_vec()
            }
        };
        layout.write_file(INDEX_FILE, &index_bytes)?;

        tracing::info!(
            path = %layout.root.display(),
            digest = %artifact.digest(),
            "wrote oci layout"
        );
        Ok(layout)
    }

    /// Open an existing layout, checking its marker file.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MirrorError> {
        let layout = Self { root: root.into() };
        let marker_path = layout.root.join(OCI_LAYOUT_FILE);
        let marker = fs::read(&marker_path).map_err(|e| MirrorError::io(&marker_path, e))?;
        let parsed: LayoutFile =
            serde_json::from_slice(&marker).map_err(|e| ArtifactError::Layout {
                path: marker_path.clone(),
                reason: e.to_string(),
            })?;
        if parsed.image_layout_version != IMAGE_LAYOUT_VERSION {
            return Err(ArtifactError::Layout {
                path: marker_path,
                reason: format!(
                    "unsupported imageLayoutVersion {}",
                    parsed.image_layout_version
                ),
            }
            .into());
        }
        Ok(layout)
    }

    /// The layout directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/blobs/sha256`.
    pub fn blob_dir(&self) -> PathBuf {
        self.root.join("blobs").join("sha256")
    }

    /// Path of the blob with `digest`.
    pub fn blob_path(&self, digest: &ContentDigest) -> PathBuf {
        self.blob_dir().join(digest.to_hex())
    }

    /// Parse `index.json`.
    pub fn index(&self) -> Result<ImageIndex, MirrorError> {
        let path = self.root.join(INDEX_FILE);
        let bytes = fs::read(&path).map_err(|e| MirrorError::io(&path, e))?;
        parse(&path, &bytes)
    }

    /// Read a blob, verifying its digest.
    pub fn blob(&self, digest: &ContentDigest) -> Result<Vec<u8>, MirrorError> {
        let path = self.blob_path(digest);
        let bytes = fs::read(&path).map_err(|e| MirrorError::io(&path, e))?;
        let actual = sha256_digest(&bytes);
        if actual != *digest {
            return Err(ArtifactError::Layout {
                path,
                reason: format!("blob digest is {actual}, expected {digest}"),
            }
            .into());
        }
        Ok(bytes)
    }

    /// Read and parse the image manifest with `digest`.
    pub fn manifest(&self, digest: &ContentDigest) -> Result<ImageManifest, MirrorError> {
        let bytes = self.blob(digest)?;
        parse(&self.blob_path(digest), &bytes)
    }

    /// Every layer of the manifest with `digest`, paired with its descriptor.
    pub fn layers(&self, digest: &ContentDigest) -> Result<Vec<(Descriptor, Vec<u8>)>, MirrorError> {
        let manifest = self.manifest(digest)?;
        manifest
            .layers
            .into_iter()
            .map(|layer| {
                let bytes = self.blob(&layer.digest)?;
                Ok((layer, bytes))
            })
            .collect()
    }

    fn write_image(&self, image: &Image) -> Result<(), MirrorError> {
        for blob in image.blobs() {
            self.write_blob(blob)?;
        }
        self.write_blob(&Blob {
            digest: image.digest(),
            bytes: image.manifest_bytes().to_vec(),
        })
    }

    fn write_blob(&self, blob: &Blob) -> Result<(), MirrorError> {
        let path = self.blob_path(&blob.digest);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => file
                .write_all(&blob.bytes)
                .map_err(|e| MirrorError::io(&path, e)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(MirrorError::io(&path, e)),
        }
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), MirrorError> {
        let path = self.root.join(name);
        fs::write(&path, bytes).map_err(|e| MirrorError::io(&path, e))
    }
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, MirrorError> {
    serde_json::from_slice(bytes).map_err(|e| {
        ArtifactError::Layout {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}
