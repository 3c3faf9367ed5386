//! # Error Types -- Structured Error Hierarchy
//!
//! Defines the error types used throughout the TUF mirror. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Every error carries the role name, target path, or URL it concerns.
//! - Nothing is retried or swallowed: a failure anywhere in a batch aborts
//!   the batch and surfaces here.
//! - Trust errors come from the external trust framework; mapping errors
//!   indicate a malformed upstream repository or a bug in the mirror.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the TUF mirror.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Local cache or output directory failure.
    #[error("io error at {}: {source}", path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// The trust framework rejected metadata or a target lookup.
    #[error("trust error: {0}")]
    Trust(#[from] TrustError),

    /// A network fetch failed.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Downloaded or cached content does not match its expected digest.
    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// Trusted metadata could not be mapped onto artifacts.
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Artifact construction, persistence or push failed.
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

impl MirrorError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the trust framework or while resolving trusted state.
#[derive(Error, Debug)]
pub enum TrustError {
    /// A metadata document could not be parsed as the expected role.
    #[error("malformed {role} metadata: {reason}")]
    MalformedMetadata {
        /// The role the document was expected to be.
        role: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The trust framework refused a metadata document.
    #[error("{role} metadata rejected: {reason}")]
    Rejected {
        /// The role being updated.
        role: String,
        /// Why the document was refused.
        reason: String,
    },

    /// A role is required but has not been loaded into the trusted set.
    #[error("{role} metadata is not loaded in the trusted set")]
    NotLoaded {
        /// The missing role.
        role: String,
    },

    /// The snapshot does not list metadata for a role.
    #[error("role {role} is not listed in trusted snapshot metadata")]
    NotInSnapshot {
        /// The role without a snapshot entry.
        role: String,
    },

    /// No trusted targets role declares the requested path.
    #[error("target {path} is not declared by any trusted targets role")]
    UndeclaredTarget {
        /// The requested target path.
        path: String,
    },
}

/// Errors raised while fetching remote content.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The URL could not be built or used.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl {
        /// The offending URL or base.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Transport-level failure (DNS, connect, TLS, timeout).
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// The requested URL.
        url: String,
        /// Client diagnostic.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// The requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response exceeded the permitted size.
    #[error("{url} exceeded the maximum length of {limit} bytes")]
    TooLarge {
        /// The requested URL.
        url: String,
        /// The byte cap that was exceeded.
        limit: u64,
    },
}

impl FetchError {
    /// Whether the source reported the file as absent (404 or 403).
    ///
    /// Static TUF repositories answer 403 for missing objects when backed by
    /// some object stores, so both mean "not there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 403 | 404, .. })
    }
}

/// Content integrity violations.
#[derive(Error, Debug)]
pub enum IntegrityError {
    /// Content length differs from the trusted length.
    #[error("{subject}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// What was being checked (target path or file).
        subject: String,
        /// Trusted length.
        expected: u64,
        /// Observed length.
        actual: u64,
    },

    /// Content hash differs from the trusted hash.
    #[error("{subject}: {algorithm} digest mismatch, expected {expected}, got {actual}")]
    HashMismatch {
        /// What was being checked (target path or file).
        subject: String,
        /// Hash algorithm name as it appears in TUF metadata.
        algorithm: String,
        /// Trusted hex digest.
        expected: String,
        /// Observed hex digest.
        actual: String,
    },

    /// None of the declared hashes use an algorithm the mirror can compute.
    #[error("{subject}: no supported hash algorithm declared")]
    NoSupportedHash {
        /// The target path.
        subject: String,
    },

    /// The cached root document does not hash to the digest it is filed under.
    #[error("cached root at {} has digest {actual} but is filed under {expected}", path.display())]
    CachedRootMismatch {
        /// Location of the cached root.
        path: PathBuf,
        /// Digest used for the lookup.
        expected: String,
        /// Digest of the cached bytes.
        actual: String,
    },
}

/// Errors mapping trusted metadata onto artifacts.
#[derive(Error, Debug)]
pub enum MappingError {
    /// A target declares no sha256 hash; content addressing has no fallback.
    #[error("missing sha256 hash for target {path}")]
    MissingSha256 {
        /// The target path.
        path: String,
    },

    /// A delegated role does not declare exactly one `"<subdir>/*"` pattern.
    #[error("delegated role {role} must declare exactly one \"<subdir>/*\" path pattern, found {patterns:?}")]
    InvalidPathPattern {
        /// The delegated role.
        role: String,
        /// The patterns it declared.
        patterns: Vec<String>,
    },

    /// A delegated target lies outside its role's subdirectory.
    #[error("target {path} of role {role} is not under subdirectory {subdir}")]
    TargetOutsideSubdirectory {
        /// The delegated role.
        role: String,
        /// The role's subdirectory.
        subdir: String,
        /// The offending target path.
        path: String,
    },

    /// Two delegated roles map onto the same subdirectory tag.
    #[error("delegated roles {first} and {second} both map to subdirectory {subdir}")]
    SubdirectoryCollision {
        /// The shared subdirectory.
        subdir: String,
        /// The role seen first.
        first: String,
        /// The role seen second.
        second: String,
    },

    /// The trusted snapshot lacks a role the mirror needs.
    #[error("trusted snapshot is incomplete: missing {role}")]
    IncompleteSnapshot {
        /// The missing role or meta entry.
        role: String,
    },
}

/// Errors at the artifact-store boundary.
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// A manifest or index could not be serialized or parsed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A destination or registry reference is malformed.
    #[error("invalid reference {reference}: {reason}")]
    InvalidReference {
        /// The reference as given.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The destination scheme is not one the mirror writes to.
    #[error("destination not supported: {0}")]
    UnsupportedDestination(String),

    /// A layout on disk is malformed or a blob failed verification.
    #[error("invalid layout at {}: {reason}", path.display())]
    Layout {
        /// The layout file or blob.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// Transport-level failure talking to a registry.
    #[error("registry request to {url} failed: {reason}")]
    Transport {
        /// The requested URL.
        url: String,
        /// Client diagnostic.
        reason: String,
    },

    /// The registry answered with an unexpected status.
    #[error("registry {url} returned HTTP {status}: {body}")]
    Registry {
        /// The requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The registry's authentication challenge could not be satisfied.
    #[error("registry authentication failed: {0}")]
    Auth(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_covers_403_and_404() {
        let missing = FetchError::Status {
            url: "http://x/2.root.json".into(),
            status: 404,
        };
        let forbidden = FetchError::Status {
            url: "http://x/2.root.json".into(),
            status: 403,
        };
        let broken = FetchError::Status {
            url: "http://x/2.root.json".into(),
            status: 500,
        };
        assert!(missing.is_not_found());
        assert!(forbidden.is_not_found());
        assert!(!broken.is_not_found());
    }

    #[test]
    fn mirror_error_keeps_context() {
        let err: MirrorError = MappingError::MissingSha256 {
            path: "a.txt".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "mapping error: missing sha256 hash for target a.txt"
        );

        let io = MirrorError::io(
            "/tmp/cache/root.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(io.to_string().contains("/tmp/cache/root.json"));
    }
}
