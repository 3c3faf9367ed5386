//! # tufm-core -- Foundational Types for the TUF Mirror
//!
//! This crate is the leaf of the workspace DAG. It defines the types every
//! other `tufm-*` crate shares: the error taxonomy, content digests, the TUF
//! metadata model, the artifact naming rules, and the trait through which the
//! external trust framework is consumed.
//!
//! ## Key Design Principles
//!
//! 1. **Raw bytes travel with parsed metadata.** [`Metadata<T>`] keeps the
//!    exact bytes the source served next to the parsed payload, so mirrored
//!    layers are byte-identical to the trust repository.
//!
//! 2. **Naming lives in one place.** Every filename, tag and annotation the
//!    mirror emits is computed by [`naming`]. Engines never format names
//!    themselves.
//!
//! 3. **Trust verification is a collaborator.** [`TrustedMetadataSet`] is the
//!    seam: implementations own signature and freshness decisions, this
//!    workspace only drives I/O and maps results.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `tufm-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod metadata;
pub mod naming;
pub mod trust;

pub use digest::{sha256_digest, sha256_hex, ContentDigest, DigestAlgorithm};
pub use error::{
    ArtifactError, FetchError, IntegrityError, MappingError, MirrorError, TrustError,
};
pub use metadata::{
    DelegatedRole, Delegations, Metadata, MetaFile, Role, RoleType, Root, Snapshot, TargetFile,
    Targets, Timestamp,
};
pub use naming::RoleFile;
pub use trust::{TrustedMetadataSet, TrustedSnapshot};
