//! Registry credentials.
//!
//! A [`Keychain`] resolves the [`Credential`] to present to a registry host.
//! Secrets live in [`Zeroizing`] buffers and are redacted from `Debug`.

use std::collections::BTreeMap;
use std::fmt;

use zeroize::Zeroizing;

/// What to present to a registry.
#[derive(Clone, Default)]
pub enum Credential {
    /// No credentials; token challenges are answered anonymously.
    #[default]
    Anonymous,
    /// Username and password, sent as HTTP Basic or exchanged for a token.
    Basic {
        username: String,
        password: Zeroizing<String>,
    },
    /// A pre-issued registry token, sent as a Bearer header.
    Bearer(Zeroizing<String>),
}

impl Credential {
    /// Basic credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// A bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(Zeroizing::new(token.into()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
        }
    }
}

/// Resolves credentials per registry host.
pub trait Keychain: Send + Sync + fmt::Debug {
    /// Credentials for `registry` (e.g. `"index.docker.io"`, `"localhost:5000"`).
    fn resolve(&self, registry: &str) -> Credential;
}

/// Always anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousKeychain;

impl Keychain for AnonymousKeychain {
    fn resolve(&self, _registry: &str) -> Credential {
        Credential::Anonymous
    }
}

/// Fixed credentials per registry host.
#[derive(Debug, Clone, Default)]
pub struct StaticKeychain {
    entries: BTreeMap<String, Credential>,
}

impl StaticKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `credential` for `registry`.
    pub fn with(mut self, registry: impl Into<String>, credential: Credential) -> Self {
        self.entries.insert(registry.into(), credential);
        self
    }
}

impl Keychain for StaticKeychain {
    fn resolve(&self, registry: &str) -> Credential {
        self.entries.get(registry).cloned().unwrap_or_default()
    }
}

/// Credentials read from the environment, used for every registry.
///
/// Variables:
/// - `TUF_MIRROR_REGISTRY_TOKEN`: bearer token (takes precedence)
/// - `TUF_MIRROR_REGISTRY_USERNAME` and `TUF_MIRROR_REGISTRY_PASSWORD`: basic credentials
#[derive(Debug, Clone, Default)]
pub struct EnvKeychain {
    credential: Credential,
}

impl EnvKeychain {
    /// Read credentials once from the environment.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let credential = match (
            var("TUF_MIRROR_REGISTRY_TOKEN"),
            var("TUF_MIRROR_REGISTRY_USERNAME"),
            var("TUF_MIRROR_REGISTRY_PASSWORD"),
        ) {
            (Some(token), _, _) => Credential::bearer(token),
            (None, Some(username), Some(password)) => Credential::basic(username, password),
            _ => Credential::Anonymous,
        };
        Self { credential }
    }
}

impl Keychain for EnvKeychain {
    fn resolve(&self, _registry: &str) -> Credential {
        self.credential.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let basic = format!("{:?}", Credential::basic("ci", "hunter2"));
        assert!(basic.contains("ci"));
        assert!(!basic.contains("hunter2"));
        let bearer = format!("{:?}", Credential::bearer("tok-123"));
        assert!(!bearer.contains("tok-123"));
    }

    #[test]
    fn static_keychain_falls_back_to_anonymous() {
        let keychain = StaticKeychain::new().with("localhost:5000", Credential::basic("u", "p"));
        assert!(matches!(
            keychain.resolve("localhost:5000"),
            Credential::Basic { .. }
        ));
        assert!(matches!(
            keychain.resolve("index.docker.io"),
            Credential::Anonymous
        ));
    }
}
