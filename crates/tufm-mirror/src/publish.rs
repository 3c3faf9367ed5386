//! # Publishing
//!
//! Where mirrored artifacts go, and the runs that build and deliver them.
//!
//! ## Destinations
//!
//! | Form | Store | Tagged artifact `t` goes to |
//! |------|-------|-----------------------------|
//! | `oci://<path>` | OCI image layout | `<path>/<t>` |
//! | `docker://<reference>` | registry | `<repository>:<t>` |
//!
//! The metadata image goes to the destination itself.
//!
//! ## Runs
//!
//! A run builds every artifact of its batch before publishing any of them,
//! so a failure while building leaves the destination untouched.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tufm_core::{ArtifactError, ContentDigest, MirrorError, TrustedMetadataSet};
use tufm_oci::{Artifact, Keychain, OciLayout, Reference, RegistryClient};
use url::Url;

use crate::mirror::{MirrorArtifact, TufMirror};

const LAYOUT_SCHEME: &str = "oci://";
const REGISTRY_SCHEME: &str = "docker://";

/// An artifact store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// An OCI image layout directory.
    Layout(PathBuf),
    /// A repository in a registry.
    Registry(Reference),
}

impl Destination {
    /// The location for an artifact tagged `tag` under this destination.
    ///
    /// A layout child must stay below the layout directory: every component
    /// of `tag` has to be a plain name.
    pub fn child(&self, tag: &str) -> Result<Self, ArtifactError> {
        match self {
            Self::Layout(path) => {
                let relative = Path::new(tag);
                let plain = relative
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
                if tag.is_empty() || !plain {
                    return Err(ArtifactError::InvalidReference {
                        reference: tag.to_string(),
                        reason: "tag escapes the layout directory".into(),
                    });
                }
                Ok(Self::Layout(path.join(relative)))
            }
            Self::Registry(reference) => Ok(Self::Registry(reference.with_tag(tag)?)),
        }
    }
}

impl FromStr for Destination {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix(LAYOUT_SCHEME) {
            if path.is_empty() {
                return Err(ArtifactError::InvalidReference {
                    reference: s.to_string(),
                    reason: "layout path is empty".into(),
                });
            }
            return Ok(Self::Layout(PathBuf::from(path)));
        }
        if let Some(reference) = s.strip_prefix(REGISTRY_SCHEME) {
            return Ok(Self::Registry(Reference::parse(reference)?));
        }
        Err(ArtifactError::UnsupportedDestination(s.to_string()))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layout(path) => write!(f, "{LAYOUT_SCHEME}{}", path.display()),
            Self::Registry(reference) => write!(f, "{REGISTRY_SCHEME}{reference}"),
        }
    }
}

/// One artifact delivered to one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub destination: Destination,
    pub digest: ContentDigest,
}

/// Delivers artifacts to layouts and registries.
#[derive(Debug, Clone)]
pub struct Publisher {
    registry: RegistryClient,
}

impl Publisher {
    /// A publisher pushing to registries with credentials from `keychain`.
    pub fn new(keychain: impl Keychain + 'static, timeout: Duration) -> Result<Self, ArtifactError> {
        Ok(Self {
            registry: RegistryClient::new(keychain, timeout)?,
        })
    }

    /// Write or push `artifact` to `destination`.
    pub async fn publish(
        &self,
        artifact: &Artifact,
        destination: &Destination,
    ) -> Result<Published, MirrorError> {
        let digest = match destination {
            Destination::Layout(path) => {
                OciLayout::write(path, artifact)?;
                artifact.digest()
            }
            Destination::Registry(reference) => self.registry.push(artifact, reference).await?,
        };
        Ok(Published {
            destination: destination.clone(),
            digest,
        })
    }

    /// Publish each artifact under its tag below `destination`, in order.
    pub async fn publish_tagged(
        &self,
        artifacts: &[MirrorArtifact],
        destination: &Destination,
    ) -> Result<Vec<Published>, MirrorError> {
        let mut published = Vec::with_capacity(artifacts.len());
        for item in artifacts {
            let target = destination.child(&item.tag)?;
            published.push(self.publish(&item.artifact, &target).await?);
        }
        Ok(published)
    }
}

// ---------------------------------------------------------------------------
// Mirror runs
// ---------------------------------------------------------------------------

impl<S: TrustedMetadataSet> TufMirror<S> {
    /// Mirror top-level metadata to `destination`, and with `full` every
    /// delegated targets role below it.
    pub async fn mirror_metadata(
        &mut self,
        publisher: &Publisher,
        destination: &Destination,
        full: bool,
    ) -> Result<Vec<Published>, MirrorError> {
        let metadata_url = self.metadata_url().clone();
        let image = self.metadata_artifact(&metadata_url).await?;
        let delegated = if full {
            self.delegated_metadata_artifacts().await?
        } else {
            Vec::new()
        };

        let mut published = vec![publisher.publish(&Artifact::from(image), destination).await?];
        published.extend(publisher.publish_tagged(&delegated, destination).await?);
        tracing::info!(%destination, artifacts = published.len(), "mirrored metadata");
        Ok(published)
    }

    /// Mirror top-level targets from `targets_url` to `destination`, and with
    /// `full` the targets of every delegated role.
    pub async fn mirror_targets(
        &mut self,
        publisher: &Publisher,
        destination: &Destination,
        targets_url: &Url,
        full: bool,
    ) -> Result<Vec<Published>, MirrorError> {
        let mut artifacts = self.top_level_target_artifacts(targets_url).await?;
        if full {
            artifacts.extend(self.delegated_target_artifacts(targets_url).await?);
        }

        let published = publisher.publish_tagged(&artifacts, destination).await?;
        tracing::info!(%destination, %targets_url, artifacts = published.len(), "mirrored targets");
        Ok(published)
    }

    /// Mirror metadata, then targets.
    pub async fn mirror_all(
        &mut self,
        publisher: &Publisher,
        metadata_destination: &Destination,
        targets_destination: &Destination,
        targets_url: &Url,
        full: bool,
    ) -> Result<Vec<Published>, MirrorError> {
        let mut published = self
            .mirror_metadata(publisher, metadata_destination, full)
            .await?;
        published.extend(
            self.mirror_targets(publisher, targets_destination, targets_url, full)
                .await?,
        );
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_layout_destination() {
        let dest: Destination = "oci:///tmp/mirror/metadata".parse().unwrap();
        assert_eq!(dest, Destination::Layout(PathBuf::from("/tmp/mirror/metadata")));
        assert_eq!(
            dest.child("opkl").unwrap(),
            Destination::Layout(PathBuf::from("/tmp/mirror/metadata/opkl"))
        );
        assert_eq!(dest.to_string(), "oci:///tmp/mirror/metadata");
    }

    #[test]
    fn layout_children_stay_below_the_layout() {
        let dest = Destination::Layout(PathBuf::from("/tmp/mirror/targets"));
        assert_eq!(
            dest.child("abc.bin/tool").unwrap(),
            Destination::Layout(PathBuf::from("/tmp/mirror/targets/abc.bin/tool"))
        );
        for tag in ["..", "../x", "abc.../../x", "/etc/x", "./x", ""] {
            assert!(
                matches!(dest.child(tag), Err(ArtifactError::InvalidReference { .. })),
                "{tag:?} accepted"
            );
        }
    }

    #[test]
    fn parses_registry_destination() {
        let dest: Destination = "docker://localhost:5000/tuf/metadata:latest".parse().unwrap();
        let Destination::Registry(reference) = &dest else {
            panic!("expected a registry destination");
        };
        assert_eq!(reference.repository(), "tuf/metadata");

        let Destination::Registry(child) = dest.child("opkl").unwrap() else {
            panic!("expected a registry destination");
        };
        assert_eq!(child.to_string(), "localhost:5000/tuf/metadata:opkl");
    }

    #[test]
    fn rejects_digest_references_and_other_schemes() {
        assert!(matches!(
            "docker://localhost:5000/tuf@sha256:abcd".parse::<Destination>(),
            Err(ArtifactError::InvalidReference { .. })
        ));
        assert!(matches!(
            "s3://bucket/tuf".parse::<Destination>(),
            Err(ArtifactError::UnsupportedDestination(_))
        ));
        assert!("oci://".parse::<Destination>().is_err());
    }
}
