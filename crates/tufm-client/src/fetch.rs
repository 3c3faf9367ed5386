//! Bounded HTTP fetches.
//!
//! Every download is capped: the body is streamed and abandoned as soon as it
//! grows past the limit taken from trusted metadata (or the configured
//! fallback). Non-success statuses surface as [`FetchError::Status`] so the
//! root walk can tell "no such version" (403/404) from real failures.

use std::time::Duration;

use reqwest::Client;
use tufm_core::FetchError;
use url::Url;

/// A thin reqwest wrapper that enforces length caps and timeouts.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: Client,
    timeout: Duration,
}

impl Fetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: "client_init".into(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, timeout })
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url`, failing once more than `max_len` bytes arrive.
    pub async fn download_file(&self, url: &Url, max_len: u64) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(%url, max_len, "fetching");
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let mut response = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: max_len,
        };
        if response.content_length().is_some_and(|len| len > max_len) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            if body.len() as u64 + chunk.len() as u64 > max_len {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// Append a single file name to a base URL, treating the base as a directory.
pub fn join_file(base: &Url, name: &str) -> Result<Url, FetchError> {
    join_segments(base, std::iter::once(name))
}

/// Append a `/`-separated relative path to a base URL.
///
/// Each segment is percent-encoded on its own, so target paths containing
/// reserved characters still address the intended object.
pub fn join_path(base: &Url, path: &str) -> Result<Url, FetchError> {
    join_segments(base, path.split('/'))
}

fn join_segments<'a>(
    base: &Url,
    segments: impl Iterator<Item = &'a str>,
) -> Result<Url, FetchError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| FetchError::InvalidUrl {
            url: base.to_string(),
            reason: "URL cannot be used as a base".into(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_file_handles_trailing_slash() {
        let with = Url::parse("https://example.com/tuf/metadata/").unwrap();
        let without = Url::parse("https://example.com/tuf/metadata").unwrap();
        assert_eq!(
            join_file(&with, "1.root.json").unwrap().as_str(),
            "https://example.com/tuf/metadata/1.root.json"
        );
        assert_eq!(
            join_file(&without, "1.root.json").unwrap().as_str(),
            "https://example.com/tuf/metadata/1.root.json"
        );
    }

    #[test]
    fn join_path_keeps_subdirectories() {
        let base = Url::parse("https://example.com/targets").unwrap();
        assert_eq!(
            join_path(&base, "opkl/abc.policy.json").unwrap().as_str(),
            "https://example.com/targets/opkl/abc.policy.json"
        );
    }

    #[test]
    fn join_rejects_opaque_urls() {
        let base = Url::parse("mailto:someone@example.com").unwrap();
        assert!(matches!(
            join_file(&base, "x"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }
}
