//! # tufm-mirror -- TUF Repositories as OCI Artifacts
//!
//! Turns the trusted state of a TUF repository into OCI artifacts and
//! delivers them to an OCI image layout or a registry.
//!
//! ## Engines
//!
//! | Operation | Produces |
//! |-----------|----------|
//! | [`TufMirror::metadata_artifact`] | one image, one layer per top-level metadata file |
//! | [`TufMirror::delegated_metadata_artifacts`] | one image per delegated role, tagged by role |
//! | [`TufMirror::top_level_target_artifacts`] | one image per target, tagged `<sha256>.<path>` |
//! | [`TufMirror::delegated_target_artifacts`] | one index per delegated role, tagged by subdirectory |
//!
//! Runs ([`TufMirror::mirror_metadata`], [`TufMirror::mirror_targets`],
//! [`TufMirror::mirror_all`]) combine the engines with a [`Publisher`].
//!
//! ## Crate Policy
//!
//! - All network calls are awaited in sequence.
//! - Trust decisions belong to the [`tufm_core::TrustedMetadataSet`]
//!   implementation; this crate only maps trusted state onto artifacts.

mod metadata;
pub mod mirror;
pub mod publish;
mod targets;

pub use mirror::{MirrorArtifact, TufMirror};
pub use publish::{Destination, Published, Publisher};
