//! Registry references: `[registry/]repository[:tag]`.
//!
//! Parsing follows the Docker conventions: a first path component containing
//! `.` or `:` (or equal to `localhost`) names the registry, otherwise the
//! reference lives on Docker Hub and single-component repositories gain the
//! `library/` prefix. Digest references are rejected; the mirror always
//! pushes by tag.

use std::fmt;
use std::str::FromStr;

use tufm_core::ArtifactError;
use url::Url;

/// Registry host for references without an explicit registry.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// Tag used when a reference names none.
pub const DEFAULT_TAG: &str = "latest";

const MAX_TAG_LEN: usize = 128;

/// A tagged repository in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    registry: String,
    repository: String,
    tag: String,
}

impl Reference {
    /// Parse `[registry/]repository[:tag]`.
    pub fn parse(s: &str) -> Result<Self, ArtifactError> {
        let invalid = |reason: &str| ArtifactError::InvalidReference {
            reference: s.to_string(),
            reason: reason.to_string(),
        };
        if s.contains('@') {
            return Err(invalid("digest references are not supported"));
        }

        let (registry, rest) = match s.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest)
            }
            _ => (DEFAULT_REGISTRY.to_string(), s),
        };
        let registry = if registry == "docker.io" {
            DEFAULT_REGISTRY.to_string()
        } else {
            registry
        };

        let last_slash = rest.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => (&rest[..last_slash + i], &rest[last_slash + i + 1..]),
            None => (rest, DEFAULT_TAG),
        };

        validate_repository(repository).map_err(|r| invalid(&r))?;
        validate_tag(tag).map_err(|r| invalid(&r))?;

        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository.to_string()
        };

        Ok(Self {
            registry,
            repository,
            tag: tag.to_string(),
        })
    }

    /// The same repository under a different tag.
    pub fn with_tag(&self, tag: &str) -> Result<Self, ArtifactError> {
        validate_tag(tag).map_err(|reason| ArtifactError::InvalidReference {
            reference: format!("{}/{}:{tag}", self.registry, self.repository),
            reason,
        })?;
        Ok(Self {
            tag: tag.to_string(),
            ..self.clone()
        })
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Base URL of the registry API. Loopback registries are spoken to over
    /// plain HTTP, everything else over HTTPS.
    pub fn registry_url(&self) -> Result<Url, ArtifactError> {
        let host = self
            .registry
            .rsplit_once(':')
            .map_or(self.registry.as_str(), |(h, _)| h);
        let scheme = if matches!(host, "localhost" | "127.0.0.1" | "[::1]") {
            "http"
        } else {
            "https"
        };
        Url::parse(&format!("{scheme}://{}/", self.registry)).map_err(|e| {
            ArtifactError::InvalidReference {
                reference: self.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl FromStr for Reference {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn validate_repository(repository: &str) -> Result<(), String> {
    if repository.is_empty() {
        return Err("repository is empty".into());
    }
    for component in repository.split('/') {
        let valid = !component.is_empty()
            && component
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"._-".contains(&b))
            && component.bytes().next().is_some_and(|b| b.is_ascii_alphanumeric());
        if !valid {
            return Err(format!("invalid repository component {component:?}"));
        }
    }
    Ok(())
}

/// Check `tag` against the OCI tag grammar `[A-Za-z0-9_][A-Za-z0-9._-]{0,127}`.
pub fn validate_tag(tag: &str) -> Result<(), String> {
    let mut bytes = tag.bytes();
    let first_ok = bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_');
    if !first_ok || tag.len() > MAX_TAG_LEN {
        return Err(format!("invalid tag {tag:?}"));
    }
    if !bytes.all(|b| b.is_ascii_alphanumeric() || b"._-".contains(&b)) {
        return Err(format!("invalid tag {tag:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_registry_and_tag() {
        let r = Reference::parse("localhost:5000/tuf/metadata:latest").unwrap();
        assert_eq!(r.registry(), "localhost:5000");
        assert_eq!(r.repository(), "tuf/metadata");
        assert_eq!(r.tag(), "latest");
        assert_eq!(r.registry_url().unwrap().as_str(), "http://localhost:5000/");
    }

    #[test]
    fn docker_hub_defaults() {
        let r = Reference::parse("tuf-metadata").unwrap();
        assert_eq!(r.registry(), DEFAULT_REGISTRY);
        assert_eq!(r.repository(), "library/tuf-metadata");
        assert_eq!(r.tag(), DEFAULT_TAG);
        assert_eq!(r.registry_url().unwrap().scheme(), "https");

        let r = Reference::parse("docker.io/docker/tuf:v1").unwrap();
        assert_eq!(r.registry(), DEFAULT_REGISTRY);
        assert_eq!(r.repository(), "docker/tuf");
        assert_eq!(r.to_string(), "index.docker.io/docker/tuf:v1");
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let r = Reference::parse("127.0.0.1:5000/targets").unwrap();
        assert_eq!(r.registry(), "127.0.0.1:5000");
        assert_eq!(r.repository(), "targets");
        assert_eq!(r.tag(), "latest");
    }

    #[test]
    fn digest_references_are_rejected() {
        let err = Reference::parse("registry.example.com/tuf@sha256:abcd").unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidReference { .. }));
    }

    #[test]
    fn invalid_components_are_rejected() {
        assert!(Reference::parse("registry.example.com/Upper:tag").is_err());
        assert!(Reference::parse("registry.example.com/repo:bad/tag").is_err());
        assert!(Reference::parse("registry.example.com/repo:").is_err());
        assert!(Reference::parse("").is_err());
    }

    #[test]
    fn with_tag_validates() {
        let r = Reference::parse("localhost:5000/tuf/targets:latest").unwrap();
        let hash = "a".repeat(64);
        let tagged = r.with_tag(&format!("{hash}.a.txt")).unwrap();
        assert_eq!(tagged.tag(), format!("{hash}.a.txt"));
        assert_eq!(tagged.repository(), "tuf/targets");
        assert!(r.with_tag("sub/file").is_err());
        assert!(r.with_tag(&"x".repeat(129)).is_err());
    }
}
