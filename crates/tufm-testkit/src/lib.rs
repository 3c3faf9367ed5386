//! # tufm-testkit -- test support for the TUF mirror
//!
//! - [`RepoFixture`]: generate a TUF repository and serve it over wiremock.
//! - [`StructuralTrustSet`]: a [`tufm_core::TrustedMetadataSet`] that checks
//!   structure, sequencing and expiry but no signatures.
//!
//! Nothing here is fit for production trust decisions.

pub mod fixture;
pub mod trust;

pub use fixture::{metadata_url, targets_url, FixtureRole, RepoFiles, RepoFixture};
pub use trust::StructuralTrustSet;
