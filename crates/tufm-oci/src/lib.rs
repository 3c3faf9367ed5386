//! # tufm-oci -- OCI artifacts for the TUF mirror
//!
//! Builds the images and indexes the mirror emits and delivers them to an
//! artifact store.
//!
//! - [`artifact`]: [`Image`], [`Index`], and the [`Artifact`] sum type.
//! - [`layout`]: OCI image layout directories, written and read back.
//! - [`reference`]: `[registry/]repository[:tag]` parsing.
//! - [`auth`]: credentials and keychains.
//! - [`registry`]: push over the OCI distribution API.

pub mod artifact;
pub mod auth;
pub mod layout;
pub mod reference;
pub mod registry;

pub use artifact::{
    Artifact, Blob, Descriptor, Image, ImageBuilder, ImageIndex, ImageManifest, Index,
    IndexBuilder, OCI_CONFIG_MEDIA_TYPE, OCI_INDEX_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE,
};
pub use auth::{AnonymousKeychain, Credential, EnvKeychain, Keychain, StaticKeychain};
pub use layout::OciLayout;
pub use reference::Reference;
pub use registry::{RegistryClient, DEFAULT_REGISTRY_TIMEOUT};
