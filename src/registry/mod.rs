//! Registry Wire Protocol
//!
//! The OCI distribution subset a push needs, behind a narrow operations
//! trait:
//! - HEAD blob existence probes
//! - Cross-repository mounts
//! - Monolithic blob uploads (POST + PATCH + finalizing PUT)
//! - Manifest uploads per tag
//! - Bearer token exchange and Basic authentication

mod auth;
mod client;
mod retry;

pub use auth::{
    push_scope, AuthChallenge, AuthScheme, Authorization, CredentialProvider, Credentials,
    DockerConfigCredentials, StaticCredentials,
};
pub use client::{HttpRegistryClient, MountOutcome, RegistryOps};
pub use retry::retry_transient;

use thiserror::Error;

/// Errors from registry operations. Transient variants may be retried by
/// [`retry_transient`]; everything else is fatal for the push.
///
/// Variants carry owned strings rather than source errors so a failure
/// can be shared unchanged with every step depending on the failed one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry {registry} requires authentication for scope {scope}")]
    AuthRequired { registry: String, scope: String },

    #[error("Authorization for {registry} does not cover scope {scope}")]
    AuthInsufficient { registry: String, scope: String },

    #[error("Transient network failure: {0}")]
    NetworkTransient(String),

    #[error("Network retries exhausted after {attempts} attempts: {last}")]
    NetworkExhausted { attempts: u32, last: String },

    #[error("Registry refused request: HTTP {status}: {body}")]
    RegistryRefused { status: u16, body: String },

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Registry does not support manifest media type {0}; try the alternate format")]
    ManifestUnsupported(String),
}

impl RegistryError {
    /// Whether the retry policy may re-attempt the operation
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::NetworkTransient(_))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
