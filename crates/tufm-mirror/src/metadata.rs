//! # Metadata Mirroring
//!
//! Packages trusted metadata as OCI images.
//!
//! ## Layer Order
//!
//! | Position | File |
//! |----------|------|
//! | 1..N | `1.root.json` .. `N.root.json` |
//! | N+1 | `snapshot.json` or `<v>.snapshot.json` |
//! | N+2 | `targets.json` or `<v>.targets.json` |
//! | N+3 | `timestamp.json` |
//!
//! Every layer carries its filename under `tuf.io/filename`. Delegated
//! targets metadata is packaged one image per role, tagged with the role
//! name.

use tufm_core::naming::{RoleFile, TUF_FILE_ANNOTATION, TUF_METADATA_MEDIA_TYPE};
use tufm_core::{MirrorError, RoleType, TrustedMetadataSet};
use tufm_oci::Image;
use url::Url;

use crate::mirror::{MirrorArtifact, TufMirror};

impl<S: TrustedMetadataSet> TufMirror<S> {
    /// The top-level metadata files in layer order.
    ///
    /// Roots older than the trusted one are fetched from `metadata_url`.
    pub async fn metadata_files(&self, metadata_url: &Url) -> Result<Vec<RoleFile>, MirrorError> {
        let trusted = self.client.snapshot()?;
        let consistent = trusted.consistent_snapshot();
        let root_version = trusted.root.version();

        let mut files = if root_version > 1 {
            self.client.prior_roots(metadata_url).await?
        } else {
            Vec::new()
        };
        files.push(RoleFile::root(root_version, trusted.root.raw().to_vec()));
        files.push(RoleFile::versioned(
            RoleType::Snapshot.as_str(),
            trusted.snapshot.version(),
            consistent,
            trusted.snapshot.raw().to_vec(),
        ));
        files.push(RoleFile::versioned(
            RoleType::Targets.as_str(),
            trusted.targets.version(),
            consistent,
            trusted.targets.raw().to_vec(),
        ));
        files.push(RoleFile::timestamp(trusted.timestamp.raw().to_vec()));
        Ok(files)
    }

    /// One image holding every top-level metadata file.
    pub async fn metadata_artifact(&self, metadata_url: &Url) -> Result<Image, MirrorError> {
        let files = self.metadata_files(metadata_url).await?;
        let layers = files.len();
        let image = metadata_image(files)?;
        tracing::info!(layers, digest = %image.digest(), "built metadata artifact");
        Ok(image)
    }

    /// One image per role delegated by top-level targets, in declared order.
    pub async fn delegated_metadata_artifacts(
        &mut self,
    ) -> Result<Vec<MirrorArtifact>, MirrorError> {
        let trusted = self.client.snapshot()?;
        let consistent = trusted.consistent_snapshot();
        let roles: Vec<String> = trusted
            .targets
            .signed
            .delegated_roles()
            .iter()
            .map(|r| r.name.clone())
            .collect();

        let mut artifacts = Vec::with_capacity(roles.len());
        for role in roles {
            let loaded = self
                .client
                .load_delegated_targets(&role, RoleType::Targets.as_str())
                .await?;
            let version = self
                .client
                .snapshot()?
                .snapshot
                .signed
                .role_meta(&role)
                .map_or(loaded.version(), |meta| meta.version);
            let file = RoleFile::versioned(&role, version, consistent, loaded.raw().to_vec());
            let image = metadata_image(vec![file])?;
            tracing::info!(role = %role, digest = %image.digest(), "built delegated metadata artifact");
            artifacts.push(MirrorArtifact {
                tag: role,
                artifact: image.into(),
            });
        }
        Ok(artifacts)
    }
}

fn metadata_image(files: Vec<RoleFile>) -> Result<Image, MirrorError> {
    let builder = files.into_iter().fold(Image::builder(), |builder, file| {
        let name = file.file_name();
        builder.annotated_layer(file.bytes, TUF_METADATA_MEDIA_TYPE, TUF_FILE_ANNOTATION, &name)
    });
    Ok(builder.build()?)
}
