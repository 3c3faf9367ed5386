//! The mirror handle: one trust client plus the artifacts built from it.

use tufm_client::{ClientConfig, TufClient};
use tufm_core::{MirrorError, TrustedMetadataSet};
use tufm_oci::Artifact;
use url::Url;

/// An artifact and the tag it is published under.
#[derive(Debug, Clone)]
pub struct MirrorArtifact {
    pub tag: String,
    pub artifact: Artifact,
}

/// Mirrors one TUF repository into OCI artifacts.
///
/// Engines that load delegated metadata or download targets take
/// `&mut self`; one mirror runs one batch at a time.
#[derive(Debug)]
pub struct TufMirror<S> {
    pub(crate) client: TufClient<S>,
}

impl<S: TrustedMetadataSet> TufMirror<S> {
    /// Pin `root`, open the trust client, and refresh it.
    pub async fn open(root: &[u8], config: ClientConfig) -> Result<Self, MirrorError> {
        let client = TufClient::open(root, config).await?;
        Ok(Self::from_client(client))
    }

    /// Mirror through an already opened client.
    pub fn from_client(client: TufClient<S>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &TufClient<S> {
        &self.client
    }

    /// Configured metadata source.
    pub fn metadata_url(&self) -> &Url {
        self.client.metadata_url()
    }

    /// Configured default targets source.
    pub fn targets_url(&self) -> &Url {
        self.client.targets_url()
    }
}
