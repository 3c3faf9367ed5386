//! Configuration for the TUF mirror client.
//!
//! Defaults follow the trust framework's own limits: metadata length caps,
//! the number of root rotations walked per refresh, and the per-request
//! timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

/// Default metadata source: the Docker TUF staging repository.
pub const DEFAULT_METADATA_URL: &str = "https://docker.github.io/tuf-staging/metadata";

/// Default targets source: the Docker TUF staging repository.
pub const DEFAULT_TARGETS_URL: &str = "https://docker.github.io/tuf-staging/targets";

/// Per-request timeout applied to every fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bounds on metadata downloads when the trusted metadata is silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataLimits {
    /// Maximum bytes for a root document.
    pub root_max_length: u64,
    /// Maximum bytes for `timestamp.json`.
    pub timestamp_max_length: u64,
    /// Maximum bytes for a snapshot when timestamp omits its length.
    pub snapshot_max_length: u64,
    /// Maximum bytes for targets metadata when snapshot omits its length.
    pub targets_max_length: u64,
    /// Maximum number of root versions walked in one refresh.
    pub max_root_rotations: u64,
}

impl Default for MetadataLimits {
    fn default() -> Self {
        Self {
            root_max_length: 512_000,
            timestamp_max_length: 16_384,
            snapshot_max_length: 2_000_000,
            targets_max_length: 5_000_000,
            max_root_rotations: 256,
        }
    }
}

/// Where the client reads from and caches to.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base directory; the trust cache lives under `<tuf_path>/.docker/tuf`.
    pub tuf_path: PathBuf,
    /// Metadata source.
    pub metadata_url: Url,
    /// Default targets source.
    pub targets_url: Url,
    /// Timeout applied to each request.
    pub fetch_timeout: Duration,
    /// Length caps.
    pub limits: MetadataLimits,
}

impl ClientConfig {
    /// Configuration with default timeout and limits.
    pub fn new(tuf_path: impl Into<PathBuf>, metadata_url: Url, targets_url: Url) -> Self {
        Self {
            tuf_path: tuf_path.into(),
            metadata_url,
            targets_url,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            limits: MetadataLimits::default(),
        }
    }

    /// Parse and validate source URLs, then build a configuration.
    pub fn from_sources(
        tuf_path: impl Into<PathBuf>,
        metadata_url: &str,
        targets_url: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            tuf_path,
            parse_source_url("metadata source", metadata_url)?,
            parse_source_url("targets source", targets_url)?,
        ))
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `TUF_MIRROR_PATH` (default: `$HOME`)
    /// - `TUF_MIRROR_METADATA_URL` (default: [`DEFAULT_METADATA_URL`])
    /// - `TUF_MIRROR_TARGETS_URL` (default: [`DEFAULT_TARGETS_URL`])
    /// - `TUF_MIRROR_TIMEOUT_SECS` (default: 15)
    pub fn from_env() -> Result<Self, ConfigError> {
        let tuf_path = match std::env::var("TUF_MIRROR_PATH") {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p.trim()),
            _ => std::env::var("HOME")
                .map(PathBuf::from)
                .map_err(|_| ConfigError::MissingHome)?,
        };
        let mut config = Self::new(
            tuf_path,
            env_url("TUF_MIRROR_METADATA_URL", DEFAULT_METADATA_URL)?,
            env_url("TUF_MIRROR_TARGETS_URL", DEFAULT_TARGETS_URL)?,
        );
        if let Some(secs) = std::env::var("TUF_MIRROR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Root of the trust cache: `<tuf_path>/.docker/tuf`.
    pub fn cache_dir(&self) -> PathBuf {
        cache_dir(&self.tuf_path)
    }
}

/// The trust cache directory for a base path.
pub fn cache_dir(tuf_path: &Path) -> PathBuf {
    tuf_path.join(".docker").join("tuf")
}

/// Parse a source URL, requiring `http`/`https` and a host.
pub fn parse_source_url(what: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidUrl(what.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedSource(raw.to_string()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidUrl(
            what.to_string(),
            "missing host".to_string(),
        ));
    }
    Ok(url)
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    parse_source_url(var, &raw)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TUF_MIRROR_PATH is unset and HOME is not available")]
    MissingHome,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("source not implemented: {0}")]
    UnsupportedSource(String),
}
