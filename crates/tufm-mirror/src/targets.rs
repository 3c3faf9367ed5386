//! # Target Mirroring
//!
//! Packages trusted target files as OCI artifacts.
//!
//! - Top-level targets: one single-layer image per target, tagged
//!   `<sha256>.<path>`.
//! - Delegated targets: one index per delegated role, tagged with the role's
//!   subdirectory. Each child image holds one target; its index entry is
//!   annotated `<subdir>/<sha256>.<filename>` and its layer
//!   `<sha256>.<filename>`.
//!
//! Targets are downloaded through the trust client, so every layer holds
//! bytes verified against trusted metadata. The first failure aborts the
//! batch.

use std::collections::BTreeMap;

use tufm_core::naming::{
    delegated_subdir, delegated_target_name, target_tag, TUF_FILE_ANNOTATION,
    TUF_TARGET_MEDIA_TYPE,
};
use tufm_core::{MappingError, MirrorError, RoleType, TrustedMetadataSet};
use tufm_oci::{Image, Index};
use url::Url;

use crate::mirror::{MirrorArtifact, TufMirror};

impl<S: TrustedMetadataSet> TufMirror<S> {
    /// One image per top-level target, sorted by path.
    ///
    /// Every tag is computed before the first download, so a target without
    /// a sha256 fails the batch without fetching anything.
    pub async fn top_level_target_artifacts(
        &mut self,
        targets_url: &Url,
    ) -> Result<Vec<MirrorArtifact>, MirrorError> {
        let tagged = self
            .client
            .snapshot()?
            .targets
            .signed
            .targets
            .iter()
            .map(|(path, target)| Ok((path.clone(), target_tag(path, target)?)))
            .collect::<Result<Vec<(String, String)>, MappingError>>()?;
        let dest_dir = self.client.download_dir();

        let mut artifacts = Vec::with_capacity(tagged.len());
        for (path, tag) in tagged {
            let downloaded = self
                .client
                .download_target(&path, &dest_dir, targets_url)
                .await?;
            let image = target_image(downloaded.bytes, &tag)?;
            tracing::info!(target_path = %path, tag = %tag, "built target artifact");
            artifacts.push(MirrorArtifact {
                tag,
                artifact: image.into(),
            });
        }
        Ok(artifacts)
    }

    /// One index per role delegated by top-level targets.
    ///
    /// Every role must be rooted at its own subdirectory; roles sharing a
    /// subdirectory are rejected before anything is downloaded. All roles are
    /// loaded and every entry named before the first target download.
    pub async fn delegated_target_artifacts(
        &mut self,
        targets_url: &Url,
    ) -> Result<Vec<MirrorArtifact>, MirrorError> {
        let roles = self.delegated_subdirs()?;

        let mut planned = Vec::with_capacity(roles.len());
        for (role, subdir) in roles {
            let loaded = self
                .client
                .load_delegated_targets(&role, RoleType::Targets.as_str())
                .await?;
            let entries = loaded
                .signed
                .targets
                .iter()
                .map(|(path, target)| {
                    Ok((path.clone(), delegated_target_name(&role, &subdir, path, target)?))
                })
                .collect::<Result<Vec<_>, MappingError>>()?;
            planned.push((role, subdir, entries));
        }

        let dest_dir = self.client.download_dir();
        let mut artifacts = Vec::with_capacity(planned.len());
        for (role, subdir, entries) in planned {
            let mut index = Index::builder();
            for (path, name) in entries {
                let downloaded = self
                    .client
                    .download_target(&path, &dest_dir, targets_url)
                    .await?;
                let image = target_image(downloaded.bytes, &name.layer)?;
                index = index.manifest(
                    image,
                    BTreeMap::from([(TUF_FILE_ANNOTATION.to_string(), name.entry)]),
                );
            }
            let index = index.build()?;
            tracing::info!(
                role = %role,
                subdir = %subdir,
                entries = index.images().len(),
                "built delegated target artifact"
            );
            artifacts.push(MirrorArtifact {
                tag: subdir,
                artifact: index.into(),
            });
        }
        Ok(artifacts)
    }

    /// `(role, subdir)` for each delegated role, in declared order.
    fn delegated_subdirs(&self) -> Result<Vec<(String, String)>, MirrorError> {
        let trusted = self.client.snapshot()?;
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let mut roles = Vec::new();
        for role in trusted.targets.signed.delegated_roles() {
            let subdir = delegated_subdir(role)?;
            if let Some(first) = owners.insert(subdir.clone(), role.name.clone()) {
                return Err(MappingError::SubdirectoryCollision {
                    subdir,
                    first,
                    second: role.name.clone(),
                }
                .into());
            }
            roles.push((role.name.clone(), subdir));
        }
        Ok(roles)
    }
}

fn target_image(bytes: Vec<u8>, name: &str) -> Result<Image, MirrorError> {
    Ok(Image::builder()
        .annotated_layer(bytes, TUF_TARGET_MEDIA_TYPE, TUF_FILE_ANNOTATION, name)
        .build()?)
}
