//! Image Reference Parsing
//!
//! Parses Docker-style references naming a push target or mount source:
//! - myuser/myapp:v1.0
//! - ghcr.io/owner/repo:tag
//! - localhost:5000/app
//! - registry.example.com/app@sha256:abc...

use crate::image::{ImageError, Result};

/// Parsed image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry host (e.g., "docker.io", "ghcr.io")
    pub registry: String,

    /// Repository path (e.g., "library/nginx", "myuser/myapp")
    pub repository: String,

    /// Tag (e.g., "latest", "v1.0")
    pub tag: String,

    /// Digest (e.g., "sha256:abc123...") - takes precedence over tag
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string
    ///
    /// Handles the usual shorthand:
    /// - `nginx` -> docker.io/library/nginx:latest
    /// - `myuser/myapp` -> docker.io/myuser/myapp:latest
    /// - `ghcr.io/owner/repo:tag`
    /// - `localhost:5000/app@sha256:abc...`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() {
            return Err(ImageError::InvalidReference(
                "Empty image reference".to_string(),
            ));
        }

        // Split off digest if present
        let (ref_part, digest) = match s.split_once('@') {
            Some((r, d)) => (r, Some(d.to_string())),
            None => (s, None),
        };

        // The first component is a registry host when it looks like one
        // (has a dot, a port, or is localhost); otherwise everything is a
        // Docker Hub repository.
        let (registry, rest) = match ref_part.split_once('/') {
            None => ("docker.io", ref_part),
            Some((first, remainder)) => {
                let is_registry =
                    first.contains('.') || first.contains(':') || first == "localhost";
                if is_registry {
                    (first, remainder)
                } else {
                    ("docker.io", ref_part)
                }
            }
        };

        let (repository, tag) = match rest.split_once(':') {
            Some((r, t)) => (r.to_string(), t.to_string()),
            None => (rest.to_string(), "latest".to_string()),
        };

        if repository.is_empty() {
            return Err(ImageError::InvalidReference(format!(
                "Missing repository in '{}'",
                s
            )));
        }

        // Docker Hub official images live under library/
        let repository = if registry == "docker.io" && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        let registry = match registry {
            "index.docker.io" | "registry-1.docker.io" | "registry.hub.docker.com" => {
                "docker.io".to_string()
            }
            r => r.to_string(),
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Full reference string
    pub fn full_name(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}/{}@{}", self.registry, self.repository, digest),
            None => format!("{}/{}:{}", self.registry, self.repository, self.tag),
        }
    }

    /// Base URL of the registry's V2 API
    pub fn api_endpoint(&self) -> String {
        if self.registry == "docker.io" {
            "https://registry-1.docker.io".to_string()
        } else if self.registry.contains(':') || self.registry == "localhost" {
            // Local registry - plain HTTP
            format!("http://{}", self.registry)
        } else {
            format!("https://{}", self.registry)
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_image() {
        let r = ImageReference::parse("nginx").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/nginx");
        assert_eq!(r.tag, "latest");
        assert!(r.digest.is_none());
    }

    #[test]
    fn test_user_image_with_tag() {
        let r = ImageReference::parse("myuser/myapp:v1.0").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "myuser/myapp");
        assert_eq!(r.tag, "v1.0");
    }

    #[test]
    fn test_ghcr_image() {
        let r = ImageReference::parse("ghcr.io/owner/repo:latest").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "owner/repo");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn test_local_registry() {
        let r = ImageReference::parse("localhost:5000/myapp:v1").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "myapp");
        assert_eq!(r.tag, "v1");
    }

    #[test]
    fn test_digest_reference() {
        let r = ImageReference::parse("nginx@sha256:abc123").unwrap();
        assert_eq!(r.repository, "library/nginx");
        assert_eq!(r.digest, Some("sha256:abc123".to_string()));
    }

    #[test]
    fn test_empty_reference_rejected() {
        assert!(ImageReference::parse("  ").is_err());
    }

    #[test]
    fn test_api_endpoint() {
        let r1 = ImageReference::parse("nginx").unwrap();
        assert_eq!(r1.api_endpoint(), "https://registry-1.docker.io");

        let r2 = ImageReference::parse("ghcr.io/owner/repo").unwrap();
        assert_eq!(r2.api_endpoint(), "https://ghcr.io");

        let r3 = ImageReference::parse("localhost:5000/app").unwrap();
        assert_eq!(r3.api_endpoint(), "http://localhost:5000");
    }
}
