//! # Registry Push
//!
//! Pushes artifacts over the OCI distribution API.
//!
//! ## Protocol
//!
//! | Step | Request | Success |
//! |------|---------|---------|
//! | ping | `GET /v2/` | 200, or 401 with a challenge |
//! | blob exists? | `HEAD /v2/<repo>/blobs/<digest>` | 200 skips the upload |
//! | start upload | `POST /v2/<repo>/blobs/uploads/` | 202 + `Location` |
//! | finish upload | `PUT <location>?digest=<digest>` | 201 |
//! | manifest | `PUT /v2/<repo>/manifests/<ref>` | 201 |
//!
//! An index is pushed child-first: every child image by digest, then the
//! index by tag.
//!
//! ## Authentication
//!
//! The ping decides the scheme. A `Basic` challenge is answered with the
//! keychain's basic credentials. A `Bearer` challenge is answered by
//! fetching a token from the challenge's realm for
//! `repository:<repo>:pull,push`, authenticating to the realm with basic
//! credentials when the keychain has them. A pre-issued bearer credential is
//! sent as is.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tufm_core::{ArtifactError, ContentDigest};
use url::Url;
use zeroize::Zeroizing;

use crate::artifact::{Artifact, Blob, Image, OCI_INDEX_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE};
use crate::auth::{Credential, Keychain};
use crate::reference::Reference;

/// Default timeout for registry requests.
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(60);

/// Authorization applied to every request of one push.
#[derive(Clone)]
enum Authorization {
    None,
    Basic {
        username: String,
        password: Zeroizing<String>,
    },
    Bearer(Zeroizing<String>),
}

impl Authorization {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::None => request,
            Self::Basic { username, password } => {
                request.basic_auth(username, Some(password.as_str()))
            }
            Self::Bearer(token) => request.bearer_auth(token.as_str()),
        }
    }
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Lowercased scheme (`basic`, `bearer`).
    pub scheme: String,
    /// Auth params with quotes removed.
    pub params: BTreeMap<String, String>,
}

impl Challenge {
    /// Parse `Scheme key="value", key=value, ...`.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));
        if scheme.is_empty() {
            return None;
        }
        let mut params = BTreeMap::new();
        let mut chars = rest.chars().peekable();
        loop {
            while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
                chars.next();
            }
            let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
            if key.is_empty() {
                break;
            }
            let mut value = String::new();
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => value.extend(chars.next()),
                        c => value.push(c),
                    }
                }
            } else {
                while let Some(c) = chars.peek().copied() {
                    if c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
            }
            params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        Some(Self {
            scheme: scheme.to_ascii_lowercase(),
            params,
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Client for pushing artifacts to OCI registries.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
    keychain: Arc<dyn Keychain>,
}

impl RegistryClient {
    /// A client resolving credentials from `keychain`.
    pub fn new(keychain: impl Keychain + 'static, timeout: Duration) -> Result<Self, ArtifactError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArtifactError::Transport {
                url: "client_init".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            keychain: Arc::new(keychain),
        })
    }

    /// Push `artifact` and tag it as `reference`. Returns the pushed digest.
    pub async fn push(
        &self,
        artifact: &Artifact,
        reference: &Reference,
    ) -> Result<ContentDigest, ArtifactError> {
        let session = self.session(reference).await?;
        match artifact {
            Artifact::Single(image) => session.push_image(image, reference.tag()).await?,
            Artifact::Indexed(index) => {
                for image in index.images() {
                    session
                        .push_image(image, &image.digest().to_string())
                        .await?;
                }
                session
                    .put_manifest(reference.tag(), OCI_INDEX_MEDIA_TYPE, index.index_bytes())
                    .await?;
            }
        }
        tracing::info!(%reference, digest = %artifact.digest(), "pushed artifact");
        Ok(artifact.digest())
    }

    async fn session(&self, reference: &Reference) -> Result<PushSession<'_>, ArtifactError> {
        let base = reference.registry_url()?;
        let credential = self.keychain.resolve(reference.registry());
        let auth = match credential {
            Credential::Bearer(token) => Authorization::Bearer(token),
            credential => self.negotiate(&base, reference, credential).await?,
        };
        Ok(PushSession {
            http: &self.http,
            base,
            repository: reference.repository().to_string(),
            auth,
        })
    }

    async fn negotiate(
        &self,
        base: &Url,
        reference: &Reference,
        credential: Credential,
    ) -> Result<Authorization, ArtifactError> {
        let ping = join(base, "v2/")?;
        let response = self.http.get(ping.clone()).send().await.map_err(transport(&ping))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return match response.status() {
                s if s.is_success() => Ok(Authorization::None),
                _ => Err(registry_error(&ping, response).await),
            };
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(Challenge::parse)
            .ok_or_else(|| ArtifactError::Auth(format!("{ping} sent 401 without a challenge")))?;

        match (challenge.scheme.as_str(), credential) {
            ("basic", Credential::Basic { username, password }) => {
                Ok(Authorization::Basic { username, password })
            }
            ("basic", _) => Err(ArtifactError::Auth(format!(
                "{} requires basic credentials",
                reference.registry()
            ))),
            ("bearer", credential) => {
                let token = self.fetch_token(&challenge, reference, &credential).await?;
                Ok(Authorization::Bearer(token))
            }
            (scheme, _) => Err(ArtifactError::Auth(format!(
                "unsupported challenge scheme {scheme}"
            ))),
        }
    }

    async fn fetch_token(
        &self,
        challenge: &Challenge,
        reference: &Reference,
        credential: &Credential,
    ) -> Result<Zeroizing<String>, ArtifactError> {
        let realm = challenge
            .params
            .get("realm")
            .ok_or_else(|| ArtifactError::Auth("bearer challenge without realm".into()))?;
        let mut url = Url::parse(realm)
            .map_err(|e| ArtifactError::Auth(format!("invalid realm {realm}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = challenge.params.get("service") {
                query.append_pair("service", service);
            }
            query.append_pair(
                "scope",
                &format!("repository:{}:pull,push", reference.repository()),
            );
        }

        let mut request = self.http.get(url.clone());
        if let Credential::Basic { username, password } = credential {
            request = request.basic_auth(username, Some(password.as_str()));
        }
        let response = request.send().await.map_err(transport(&url))?;
        if !response.status().is_success() {
            return Err(ArtifactError::Auth(format!(
                "token endpoint {url} returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ArtifactError::Auth(format!("invalid token response: {e}")))?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .map(Zeroizing::new)
            .ok_or_else(|| ArtifactError::Auth("token response carried no token".into()))
    }
}

/// One authenticated conversation with one repository.
struct PushSession<'a> {
    http: &'a Client,
    base: Url,
    repository: String,
    auth: Authorization,
}

impl PushSession<'_> {
    async fn push_image(&self, image: &Image, reference: &str) -> Result<(), ArtifactError> {
        for blob in image.blobs() {
            self.push_blob(blob).await?;
        }
        self.put_manifest(reference, OCI_MANIFEST_MEDIA_TYPE, image.manifest_bytes())
            .await
    }

    async fn push_blob(&self, blob: &Blob) -> Result<(), ArtifactError> {
        let digest = blob.digest.to_string();
        let url = self.repo_url(&["blobs", &digest])?;
        let head = self
            .auth
            .apply(self.http.head(url.clone()))
            .send()
            .await
            .map_err(transport(&url))?;
        if head.status().is_success() {
            tracing::debug!(%digest, repository = %self.repository, "blob already present");
            return Ok(());
        }

        let start = self.repo_url(&["blobs", "uploads", ""])?;
        let response = self
            .auth
            .apply(self.http.post(start.clone()))
            .send()
            .await
            .map_err(transport(&start))?;
        if response.status() != StatusCode::ACCEPTED {
            return Err(registry_error(&start, response).await);
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ArtifactError::Registry {
                url: start.to_string(),
                status: StatusCode::ACCEPTED.as_u16(),
                body: "upload started without a Location header".into(),
            })?;
        let mut upload = start.join(location).map_err(|e| ArtifactError::Transport {
            url: location.to_string(),
            reason: e.to_string(),
        })?;
        upload.query_pairs_mut().append_pair("digest", &digest);

        let response = self
            .auth
            .apply(self.http.put(upload.clone()))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(blob.bytes.clone())
            .send()
            .await
            .map_err(transport(&upload))?;
        if !response.status().is_success() {
            return Err(registry_error(&upload, response).await);
        }
        tracing::debug!(%digest, repository = %self.repository, "uploaded blob");
        Ok(())
    }

    async fn put_manifest(
        &self,
        reference: &str,
        media_type: &str,
        bytes: &[u8],
    ) -> Result<(), ArtifactError> {
        let url = self.repo_url(&["manifests", reference])?;
        let response = self
            .auth
            .apply(self.http.put(url.clone()))
            .header(CONTENT_TYPE, media_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(transport(&url))?;
        if !response.status().is_success() {
            return Err(registry_error(&url, response).await);
        }
        Ok(())
    }

    /// `<base>/v2/<repository>/<segments...>`
    fn repo_url(&self, segments: &[&str]) -> Result<Url, ArtifactError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ArtifactError::Transport {
                url: self.base.to_string(),
                reason: "registry URL cannot be a base".into(),
            })?
            .clear()
            .push("v2")
            .extend(self.repository.split('/'))
            .extend(segments);
        Ok(url)
    }
}

fn join(base: &Url, path: &str) -> Result<Url, ArtifactError> {
    base.join(path).map_err(|e| ArtifactError::Transport {
        url: base.to_string(),
        reason: e.to_string(),
    })
}

fn transport(url: &Url) -> impl Fn(reqwest::Error) -> ArtifactError + '_ {
    move |e| ArtifactError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

async fn registry_error(url: &Url, response: Response) -> ArtifactError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ArtifactError::Registry {
        url: url.to_string(),
        status,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_challenge() {
        let c = Challenge::parse(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/tuf:pull,push""#,
        )
        .unwrap();
        assert_eq!(c.scheme, "bearer");
        assert_eq!(c.params["realm"], "https://auth.docker.io/token");
        assert_eq!(c.params["service"], "registry.docker.io");
        assert_eq!(c.params["scope"], "repository:library/tuf:pull,push");
    }

    #[test]
    fn parses_basic_challenge() {
        let c = Challenge::parse(r#"Basic realm="Registry""#).unwrap();
        assert_eq!(c.scheme, "basic");
        assert_eq!(c.params["realm"], "Registry");
        assert!(Challenge::parse("").is_none());
    }
}
