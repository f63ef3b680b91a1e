//! Registry Client
//!
//! [`RegistryOps`] is the distribution-protocol surface the push pipeline
//! consumes; [`HttpRegistryClient`] implements it over reqwest:
//! - `HEAD /v2/<repo>/blobs/<digest>` - existence probe
//! - `POST /v2/<repo>/blobs/uploads/?mount=<digest>&from=<src>` - mount
//! - `POST /v2/<repo>/blobs/uploads/` - begin upload
//! - `PATCH <location>` - upload bytes
//! - `PUT <location>?digest=<digest>` - finalize blob
//! - `PUT /v2/<repo>/manifests/<tag>` - upload manifest
//!
//! Error classification happens here, at the point of origin: connection
//! failures and 5xx/429/408 are transient, 401/403 on an authorized
//! operation is insufficient authorization, 415 on a manifest upload is an
//! unsupported format, any other 4xx is a refusal.

use crate::image::{Digest, ImageReference};
use crate::registry::auth::{push_scope, AuthChallenge, Authorization, Credentials};
use crate::registry::{RegistryError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION, USER_AGENT, WWW_AUTHENTICATE};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

/// Longest response body snippet carried in an error
const BODY_SNIPPET_LIMIT: usize = 200;

/// Outcome of a cross-repository mount attempt
#[derive(Debug, Clone)]
pub enum MountOutcome {
    /// 201: the blob is now present in the target repository
    Mounted,
    /// 202: the registry declined to mount and opened a regular upload
    /// at the returned location
    Fallback(String),
}

/// The registry operations the push pipeline requires
#[async_trait]
pub trait RegistryOps: Send + Sync {
    /// Probe for an authentication challenge. `None` means the registry
    /// accepts anonymous requests.
    async fn auth_challenge(&self, target: &ImageReference) -> Result<Option<AuthChallenge>>;

    /// Exchange credentials for an authorization satisfying `challenge`,
    /// requesting `scope`.
    async fn fetch_token(
        &self,
        target: &ImageReference,
        challenge: &AuthChallenge,
        scope: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Authorization>;

    /// Is the blob already present in the target repository?
    async fn blob_exists(
        &self,
        target: &ImageReference,
        digest: &Digest,
        auth: Option<&Authorization>,
    ) -> Result<bool>;

    /// Attempt a cross-repository mount of `digest` from `from_repository`.
    async fn mount_blob(
        &self,
        target: &ImageReference,
        digest: &Digest,
        from_repository: &str,
        auth: Option<&Authorization>,
    ) -> Result<MountOutcome>;

    /// Open a monolithic upload; returns the upload location.
    async fn begin_upload(
        &self,
        target: &ImageReference,
        auth: Option<&Authorization>,
    ) -> Result<String>;

    /// Send the blob bytes in one request; returns the location for the
    /// finalizing PUT.
    async fn upload_blob(
        &self,
        target: &ImageReference,
        location: &str,
        data: Bytes,
        auth: Option<&Authorization>,
    ) -> Result<String>;

    /// Finalize the upload under `digest`; returns the registry's
    /// Docker-Content-Digest when it reports one.
    async fn finalize_upload(
        &self,
        target: &ImageReference,
        location: &str,
        digest: &Digest,
        auth: Option<&Authorization>,
    ) -> Result<Option<Digest>>;

    /// Upload manifest bytes under a tag; returns the registry's
    /// Docker-Content-Digest when it reports one.
    async fn put_manifest(
        &self,
        target: &ImageReference,
        tag: &str,
        media_type: &str,
        data: Bytes,
        auth: Option<&Authorization>,
    ) -> Result<Option<Digest>>;
}

/// reqwest-backed registry client
pub struct HttpRegistryClient {
    http: reqwest::Client,
    user_agent: String,
}

impl HttpRegistryClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .connect_timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| RegistryError::NetworkTransient(e.to_string()))?;

        Ok(Self {
            http,
            user_agent: format!("hoist/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    fn blob_url(&self, target: &ImageReference, digest: &Digest) -> String {
        format!(
            "{}/v2/{}/blobs/{}",
            target.api_endpoint(),
            target.repository,
            digest
        )
    }

    fn upload_url(&self, target: &ImageReference) -> String {
        format!(
            "{}/v2/{}/blobs/uploads/",
            target.api_endpoint(),
            target.repository
        )
    }

    fn manifest_url(&self, target: &ImageReference, tag: &str) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            target.api_endpoint(),
            target.repository,
            tag
        )
    }

    /// Registries may return the upload location as an absolute URL or a
    /// bare path; resolve the latter against the registry endpoint.
    fn resolve_location(&self, target: &ImageReference, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}{}", target.api_endpoint(), location)
        }
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        auth: Option<&Authorization>,
    ) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .request(method, url)
            .header(USER_AGENT, &self.user_agent);
        if let Some(auth) = auth {
            request = request.header(AUTHORIZATION, auth.header_value());
        }
        request
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request.send().await.map_err(transport_error)
    }

    /// Pull the Location header off a response, resolved to an absolute
    /// URL.
    fn location_of(&self, target: &ImageReference, response: &Response) -> Result<String> {
        let value = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RegistryError::RegistryRefused {
                status: response.status().as_u16(),
                body: "response is missing a usable Location header".to_string(),
            })?;
        Ok(self.resolve_location(target, value))
    }
}

/// All reqwest transport failures (resets, timeouts, refused connections)
/// are transient.
fn transport_error(e: reqwest::Error) -> RegistryError {
    RegistryError::NetworkTransient(e.to_string())
}

/// Classify an unexpected response status.
async fn refused(target: &ImageReference, response: Response) -> RegistryError {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return RegistryError::AuthInsufficient {
            registry: target.registry.clone(),
            scope: push_scope(&target.repository),
        };
    }

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return RegistryError::NetworkTransient(format!("HTTP {}", status));
    }

    let body = response.text().await.unwrap_or_default();
    RegistryError::RegistryRefused {
        status: status.as_u16(),
        body: snippet(&body),
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_SNIPPET_LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Read and validate a Docker-Content-Digest response header.
fn content_digest_of(response: &Response) -> Result<Option<Digest>> {
    let Some(value) = response.headers().get(DOCKER_CONTENT_DIGEST) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| RegistryError::RegistryRefused {
            status: response.status().as_u16(),
            body: "unreadable Docker-Content-Digest header".to_string(),
        })?;
    let digest = Digest::parse(value).map_err(|e| RegistryError::RegistryRefused {
        status: response.status().as_u16(),
        body: format!("malformed Docker-Content-Digest header: {}", e),
    })?;
    Ok(Some(digest))
}

#[async_trait]
impl RegistryOps for HttpRegistryClient {
    async fn auth_challenge(&self, target: &ImageReference) -> Result<Option<AuthChallenge>> {
        // Registries answer the base endpoint with 401 plus the challenge
        // when authentication is required.
        let url = format!("{}/v2/", target.api_endpoint());
        debug!("probing {} for auth challenge", url);

        let response = self.send(self.request(Method::GET, &url, None)).await?;

        let status = response.status();
        if status != StatusCode::UNAUTHORIZED {
            if status.is_server_error()
                || status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::REQUEST_TIMEOUT
            {
                return Err(RegistryError::NetworkTransient(format!("HTTP {}", status)));
            }
            return Ok(None);
        }

        match response.headers().get(WWW_AUTHENTICATE) {
            Some(header) => {
                let header = header.to_str().map_err(|_| RegistryError::RegistryRefused {
                    status: 401,
                    body: "unreadable WWW-Authenticate header".to_string(),
                })?;
                Ok(Some(AuthChallenge::parse(header)?))
            }
            // 401 with nothing to negotiate against
            None => Err(RegistryError::AuthRequired {
                registry: target.registry.clone(),
                scope: push_scope(&target.repository),
            }),
        }
    }

    async fn fetch_token(
        &self,
        target: &ImageReference,
        challenge: &AuthChallenge,
        scope: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Authorization> {
        let AuthChallenge::Bearer { realm, service } = challenge else {
            return match credentials {
                Some(credentials) => Ok(Authorization::basic(credentials)),
                None => Err(RegistryError::AuthRequired {
                    registry: target.registry.clone(),
                    scope: scope.to_string(),
                }),
            };
        };

        debug!("requesting token from {} for scope {}", realm, scope);

        let mut request = self
            .http
            .get(realm.as_str())
            .header(USER_AGENT, &self.user_agent)
            .query(&[("scope", scope)]);
        if let Some(service) = service {
            request = request.query(&[("service", service)]);
        }
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request.send().await.map_err(transport_error)?;

        if response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::FORBIDDEN
        {
            return Err(match credentials {
                None => RegistryError::AuthRequired {
                    registry: target.registry.clone(),
                    scope: scope.to_string(),
                },
                Some(_) => RegistryError::AuthInsufficient {
                    registry: target.registry.clone(),
                    scope: scope.to_string(),
                },
            });
        }
        if !response.status().is_success() {
            return Err(refused(target, response).await);
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            token: Option<String>,
            access_token: Option<String>,
        }

        let token: TokenResponse = response.json().await.map_err(transport_error)?;

        token
            .token
            .or(token.access_token)
            .map(Authorization::bearer)
            .ok_or_else(|| RegistryError::RegistryRefused {
                status: 200,
                body: "auth service response carried no token".to_string(),
            })
    }

    async fn blob_exists(
        &self,
        target: &ImageReference,
        digest: &Digest,
        auth: Option<&Authorization>,
    ) -> Result<bool> {
        let url = self.blob_url(target, digest);
        let response = self.send(self.request(Method::HEAD, &url, auth)).await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(refused(target, response).await),
        }
    }

    async fn mount_blob(
        &self,
        target: &ImageReference,
        digest: &Digest,
        from_repository: &str,
        auth: Option<&Authorization>,
    ) -> Result<MountOutcome> {
        let url = self.upload_url(target);
        debug!(
            "mounting {} into {} from {}",
            digest, target.repository, from_repository
        );

        let response = self
            .send(
                self.request(Method::POST, &url, auth)
                    .query(&[("mount", digest.as_str()), ("from", from_repository)]),
            )
            .await?;

        match response.status() {
            StatusCode::CREATED => Ok(MountOutcome::Mounted),
            StatusCode::ACCEPTED => Ok(MountOutcome::Fallback(
                self.location_of(target, &response)?,
            )),
            _ => Err(refused(target, response).await),
        }
    }

    async fn begin_upload(
        &self,
        target: &ImageReference,
        auth: Option<&Authorization>,
    ) -> Result<String> {
        let url = self.upload_url(target);
        let response = self.send(self.request(Method::POST, &url, auth)).await?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(refused(target, response).await);
        }
        self.location_of(target, &response)
    }

    async fn upload_blob(
        &self,
        target: &ImageReference,
        location: &str,
        data: Bytes,
        auth: Option<&Authorization>,
    ) -> Result<String> {
        let response = self
            .send(
                self.request(Method::PATCH, location, auth)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(data),
            )
            .await?;

        if !response.status().is_success() {
            return Err(refused(target, response).await);
        }

        // Some registries omit the next Location; the current one stays
        // valid then.
        Ok(self
            .location_of(target, &response)
            .unwrap_or_else(|_| location.to_string()))
    }

    async fn finalize_upload(
        &self,
        target: &ImageReference,
        location: &str,
        digest: &Digest,
        auth: Option<&Authorization>,
    ) -> Result<Option<Digest>> {
        // Upload session locations routinely carry their own query
        // (session state), so append rather than replace.
        let separator = if location.contains('?') { '&' } else { '?' };
        let url = format!("{}{}digest={}", location, separator, digest);

        let response = self.send(self.request(Method::PUT, &url, auth)).await?;

        if !response.status().is_success() {
            return Err(refused(target, response).await);
        }
        content_digest_of(&response)
    }

    async fn put_manifest(
        &self,
        target: &ImageReference,
        tag: &str,
        media_type: &str,
        data: Bytes,
        auth: Option<&Authorization>,
    ) -> Result<Option<Digest>> {
        let url = self.manifest_url(target, tag);
        debug!("PUT manifest {} ({} bytes)", url, data.len());

        let response = self
            .send(
                self.request(Method::PUT, &url, auth)
                    .header(CONTENT_TYPE, media_type)
                    .body(data),
            )
            .await?;

        if response.status() == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            return Err(RegistryError::ManifestUnsupported(media_type.to_string()));
        }
        if !response.status().is_success() {
            return Err(refused(target, response).await);
        }
        content_digest_of(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_location() {
        let client = HttpRegistryClient::new().unwrap();
        let target = ImageReference::parse("localhost:5000/my/app").unwrap();

        assert_eq!(
            client.resolve_location(&target, "/v2/my/app/blobs/uploads/uuid"),
            "http://localhost:5000/v2/my/app/blobs/uploads/uuid"
        );
        assert_eq!(
            client.resolve_location(&target, "https://cdn.example.com/upload/uuid"),
            "https://cdn.example.com/upload/uuid"
        );
    }

    #[test]
    fn test_url_building() {
        let client = HttpRegistryClient::new().unwrap();
        let target = ImageReference::parse("ghcr.io/owner/repo").unwrap();
        let digest = Digest::from_bytes(b"blob");

        assert_eq!(
            client.blob_url(&target, &digest),
            format!("https://ghcr.io/v2/owner/repo/blobs/{}", digest)
        );
        assert_eq!(
            client.upload_url(&target),
            "https://ghcr.io/v2/owner/repo/blobs/uploads/"
        );
        assert_eq!(
            client.manifest_url(&target, "v1"),
            "https://ghcr.io/v2/owner/repo/manifests/v1"
        );
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "x".repeat(500);
        let s = snippet(&long);
        assert!(s.len() < 500);
        assert!(s.ends_with("..."));

        assert_eq!(snippet("  short body  "), "short body");
    }
}
