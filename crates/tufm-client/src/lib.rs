//! # tufm-client -- TUF trust client adapter
//!
//! Bootstraps a pinned trust root, refreshes trusted metadata from a remote
//! TUF repository, and downloads verified target files.
//!
//! ## Architecture
//!
//! - [`config`]: sources, cache location, timeouts, and length caps.
//! - [`root_store`]: digest-keyed cache of the pinned root.
//! - [`fetch`]: bounded HTTP downloads.
//! - [`client`]: [`TufClient`], which drives refresh and target lookup
//!   through a [`tufm_core::TrustedMetadataSet`].
//!
//! ## Cache Layout
//!
//! ```text
//! <tuf_path>/.docker/tuf/<root-sha256>/root.json
//! <tuf_path>/.docker/tuf/<root-sha256>/download/<urlencoded target path>
//! ```

pub mod client;
pub mod config;
pub mod fetch;
pub mod root_store;

pub use client::{fetch_initial_root, DownloadedTarget, TufClient};
pub use config::{ClientConfig, ConfigError, MetadataLimits};
pub use fetch::Fetcher;
pub use root_store::{CacheStatus, PersistedRoot, RootStore};
