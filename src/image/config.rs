//! Container Configuration
//!
//! Builds the image configuration JSON blob:
//! - Runtime settings (user, env, entrypoint, cmd, ports, volumes)
//! - Filesystem layer diff IDs
//! - Image metadata and history
//!
//! The serialized form is content-addressed, so construction must be
//! deterministic: maps are ordered and the creation timestamp is supplied
//! by the caller, never read from a clock.
//!
//! See: https://github.com/opencontainers/image-spec/blob/main/config.md

use crate::image::{Digest, ImageError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Image configuration blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// CPU architecture (e.g., "amd64", "arm64")
    pub architecture: String,

    /// Operating system (e.g., "linux")
    pub os: String,

    /// Runtime configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<RuntimeConfig>,

    /// Layer diff IDs (uncompressed layer digests)
    pub rootfs: RootFs,

    /// History entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<History>>,

    /// Image creation timestamp (RFC 3339), recorded verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    /// Author of the image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl ContainerConfig {
    pub fn new(architecture: impl Into<String>, os: impl Into<String>) -> Self {
        Self {
            architecture: architecture.into(),
            os: os.into(),
            config: None,
            rootfs: RootFs::default(),
            history: None,
            created: None,
            author: None,
        }
    }

    /// The single canonical serialization of this configuration. Its
    /// sha256 is the config digest referenced by the manifest.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ImageError::Serialization(e.to_string()))
    }
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// User to run as ("user", "user:group", "uid", or "uid:gid")
    #[serde(rename = "User", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Exposed ports (e.g., {"8080/tcp": {}})
    #[serde(rename = "ExposedPorts", skip_serializing_if = "Option::is_none")]
    pub exposed_ports: Option<BTreeMap<String, EmptyObject>>,

    /// Environment variables (["KEY=VALUE", ...])
    #[serde(rename = "Env", skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,

    /// Entrypoint command
    #[serde(rename = "Entrypoint", skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,

    /// Default command (appended to entrypoint)
    #[serde(rename = "Cmd", skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,

    /// Volumes (mount points)
    #[serde(rename = "Volumes", skip_serializing_if = "Option::is_none")]
    pub volumes: Option<BTreeMap<String, EmptyObject>>,

    /// Working directory
    #[serde(rename = "WorkingDir", skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Labels (key-value metadata)
    #[serde(rename = "Labels", skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Empty JSON object {} - used for ports and volumes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyObject {}

/// Rootfs layer information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootFs {
    /// Type (always "layers")
    #[serde(rename = "type")]
    pub fs_type: String,

    /// Layer diff IDs (uncompressed content digests)
    pub diff_ids: Vec<Digest>,
}

impl Default for RootFs {
    fn default() -> Self {
        Self {
            fs_type: "layers".to_string(),
            diff_ids: Vec::new(),
        }
    }
}

/// Image history entry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct History {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Command that created this layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Whether this is an empty (metadata-only) layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_layer: Option<bool>,
}
