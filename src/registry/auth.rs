//! Registry Authentication
//!
//! Push authentication flow:
//! 1. Probe the registry for a `WWW-Authenticate` challenge
//! 2. Bearer: exchange credentials for a token scoped
//!    `repository:<repo>:push,pull` at the advertised realm
//! 3. Basic: pass credentials through directly
//! 4. No challenge: the registry is anonymous, requests carry no
//!    Authorization header
//!
//! Credentials come from a provider; fixed maps and Docker's config.json
//! are supported.

use crate::registry::{RegistryError, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Registry credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Resolves credentials for a registry host
pub trait CredentialProvider: Send + Sync {
    fn lookup(&self, registry: &str) -> Option<Credentials>;
}

/// Fixed credentials for a set of registries
#[derive(Default)]
pub struct StaticCredentials {
    entries: HashMap<String, Credentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        registry: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            registry.into(),
            Credentials {
                username: username.into(),
                password: password.into(),
            },
        );
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn lookup(&self, registry: &str) -> Option<Credentials> {
        self.entries.get(registry).cloned()
    }
}

/// Credentials loaded from Docker's config.json
pub struct DockerConfigCredentials {
    auths: HashMap<String, DockerAuthEntry>,
}

impl DockerConfigCredentials {
    /// Load from the default location. A missing file yields an empty
    /// provider.
    pub fn load() -> std::io::Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            return Ok(Self {
                auths: HashMap::new(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let config: DockerConfig = serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        Ok(Self {
            auths: config.auths,
        })
    }

    fn config_path() -> std::io::Result<PathBuf> {
        // DOCKER_CONFIG overrides the default ~/.docker
        if let Ok(path) = std::env::var("DOCKER_CONFIG") {
            return Ok(PathBuf::from(path).join("config.json"));
        }

        let home = dirs::home_dir().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            )
        })?;

        Ok(home.join(".docker").join("config.json"))
    }
}

impl CredentialProvider for DockerConfigCredentials {
    fn lookup(&self, registry: &str) -> Option<Credentials> {
        let normalized = normalize_registry(registry);
        self.auths
            .iter()
            .find(|(key, _)| normalize_registry(key) == normalized)
            .and_then(|(_, entry)| decode_docker_auth(entry))
    }
}

/// Docker config.json structure (the subset credentials live in)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

/// Docker auth entry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct DockerAuthEntry {
    /// Base64-encoded "username:password"
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,

    #[serde(rename = "identitytoken", skip_serializing_if = "Option::is_none")]
    identity_token: Option<String>,
}

/// Decode a Docker auth entry to credentials
fn decode_docker_auth(entry: &DockerAuthEntry) -> Option<Credentials> {
    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        return Some(Credentials {
            username: username.clone(),
            password: password.clone(),
        });
    }

    if let Some(auth) = &entry.auth {
        if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(auth) {
            if let Ok(s) = String::from_utf8(decoded) {
                if let Some((username, password)) = s.split_once(':') {
                    return Some(Credentials {
                        username: username.to_string(),
                        password: password.to_string(),
                    });
                }
            }
        }
    }

    if let Some(token) = &entry.identity_token {
        return Some(Credentials {
            username: "<token>".to_string(),
            password: token.clone(),
        });
    }

    None
}

/// Normalize registry names so Docker Hub aliases compare equal
fn normalize_registry(registry: &str) -> String {
    match registry {
        "docker.io" | "index.docker.io" | "registry-1.docker.io" => {
            "https://index.docker.io/v1/".to_string()
        }
        r if r.starts_with("http://") || r.starts_with("https://") => r.to_string(),
        r => format!("https://{}", r),
    }
}

/// Scheme of an authorization accepted by registries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    Basic,
}

/// An authorization usable on registry requests, scoped to one repository
/// for the lifetime of a push. Never persisted.
#[derive(Debug, Clone)]
pub struct Authorization {
    scheme: AuthScheme,
    token: String,
}

impl Authorization {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            scheme: AuthScheme::Bearer,
            token: token.into(),
        }
    }

    pub fn basic(credentials: &Credentials) -> Self {
        let raw = format!("{}:{}", credentials.username, credentials.password);
        Self {
            scheme: AuthScheme::Basic,
            token: base64::engine::general_purpose::STANDARD.encode(raw),
        }
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// Value for the Authorization request header
    pub fn header_value(&self) -> String {
        match self.scheme {
            AuthScheme::Bearer => format!("Bearer {}", self.token),
            AuthScheme::Basic => format!("Basic {}", self.token),
        }
    }
}

/// Challenge advertised in a registry's WWW-Authenticate header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    /// Token exchange against `realm`, naming `service`
    Bearer {
        realm: String,
        service: Option<String>,
    },
    /// HTTP Basic
    Basic,
}

impl AuthChallenge {
    /// Parse a WWW-Authenticate header value
    pub fn parse(header: &str) -> Result<Self> {
        let trimmed = header.trim();

        if trimmed.len() >= 5 && trimmed.as_bytes()[..5].eq_ignore_ascii_case(b"basic") {
            return Ok(AuthChallenge::Basic);
        }

        let params = parse_challenge_params(trimmed);
        match params.get("realm") {
            Some(realm) => Ok(AuthChallenge::Bearer {
                realm: realm.clone(),
                service: params.get("service").cloned(),
            }),
            None => Err(RegistryError::RegistryRefused {
                status: 401,
                body: format!("unusable WWW-Authenticate challenge: {}", trimmed),
            }),
        }
    }
}

/// Parse `key="value"` pairs from a challenge header
fn parse_challenge_params(header: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    // Format: Bearer realm="...",service="...",scope="..."
    let header = header.strip_prefix("Bearer ").unwrap_or(header);

    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim_matches('"');
            params.insert(key.to_string(), value.to_string());
        }
    }

    params
}

/// Scope granting push and pull on a repository
pub fn push_scope(repository: &str) -> String {
    format!("repository:{}:push,pull", repository)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer_challenge() {
        let header = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull""#;

        let challenge = AuthChallenge::parse(header).unwrap();
        assert_eq!(
            challenge,
            AuthChallenge::Bearer {
                realm: "https://auth.docker.io/token".to_string(),
                service: Some("registry.docker.io".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_basic_challenge() {
        let challenge = AuthChallenge::parse(r#"Basic realm="registry""#).unwrap();
        assert_eq!(challenge, AuthChallenge::Basic);
    }

    #[test]
    fn test_parse_bearer_without_realm_is_refused() {
        let err = AuthChallenge::parse(r#"Bearer service="x""#).unwrap_err();
        assert!(matches!(err, RegistryError::RegistryRefused { .. }));
    }

    #[test]
    fn test_push_scope() {
        assert_eq!(push_scope("my/app"), "repository:my/app:push,pull");
    }

    #[test]
    fn test_basic_authorization_header() {
        let auth = Authorization::basic(&Credentials {
            username: "testuser".to_string(),
            password: "testpass".to_string(),
        });
        assert_eq!(auth.scheme(), AuthScheme::Basic);
        assert_eq!(auth.header_value(), "Basic dGVzdHVzZXI6dGVzdHBhc3M=");
    }

    #[test]
    fn test_bearer_authorization_header() {
        let auth = Authorization::bearer("tok123");
        assert_eq!(auth.header_value(), "Bearer tok123");
    }

    #[test]
    fn test_decode_docker_auth() {
        let entry = DockerAuthEntry {
            auth: Some(base64::engine::general_purpose::STANDARD.encode("testuser:testpass")),
            ..Default::default()
        };

        let creds = decode_docker_auth(&entry).unwrap();
        assert_eq!(creds.username, "testuser");
        assert_eq!(creds.password, "testpass");
    }

    #[test]
    fn test_normalize_registry() {
        assert_eq!(
            normalize_registry("docker.io"),
            "https://index.docker.io/v1/"
        );
        assert_eq!(normalize_registry("ghcr.io"), "https://ghcr.io");
    }

    #[test]
    fn test_static_credentials_lookup() {
        let provider = StaticCredentials::new().with("ghcr.io", "user", "secret");
        assert!(provider.lookup("ghcr.io").is_some());
        assert!(provider.lookup("docker.io").is_none());
    }
}
