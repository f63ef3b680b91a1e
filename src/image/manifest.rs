//! Image Manifest Construction
//!
//! Builds the manifest uploaded to the registry: a JSON document listing
//! the config blob and the ordered layer blobs. Two output formats are
//! supported, Docker Image Manifest V2 Schema 2 (the default) and OCI.
//!
//! The serialized bytes are canonical: one serialization feeds both the
//! sha256 hasher (producing the image digest) and every manifest upload.
//!
//! See: https://github.com/opencontainers/image-spec/blob/main/manifest.md

use crate::image::{BlobDescriptor, Digest, Image, ImageError, Result};
use serde::{Deserialize, Serialize};

/// Media types the push core emits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    /// OCI Image Manifest
    OciManifest,
    /// OCI Image Config
    OciImageConfig,
    /// OCI Layer (gzip compressed)
    OciLayerGzip,
    /// Docker Manifest v2 Schema 2
    DockerManifestV2,
    /// Docker Image Config
    DockerImageConfig,
    /// Docker Layer
    DockerLayerGzip,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::OciManifest => write!(f, "application/vnd.oci.image.manifest.v1+json"),
            MediaType::OciImageConfig => write!(f, "application/vnd.oci.image.config.v1+json"),
            MediaType::OciLayerGzip => write!(f, "application/vnd.oci.image.layer.v1.tar+gzip"),
            MediaType::DockerManifestV2 => {
                write!(f, "application/vnd.docker.distribution.manifest.v2+json")
            }
            MediaType::DockerImageConfig => {
                write!(f, "application/vnd.docker.container.image.v1+json")
            }
            MediaType::DockerLayerGzip => {
                write!(f, "application/vnd.docker.image.rootfs.diff.tar.gzip")
            }
        }
    }
}

/// Output manifest format, selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestFormat {
    /// Docker Image Manifest V2 Schema 2
    #[default]
    DockerV2S2,
    /// OCI Image Manifest
    Oci,
}

impl ManifestFormat {
    pub fn manifest_media_type(&self) -> MediaType {
        match self {
            ManifestFormat::DockerV2S2 => MediaType::DockerManifestV2,
            ManifestFormat::Oci => MediaType::OciManifest,
        }
    }

    pub fn config_media_type(&self) -> MediaType {
        match self {
            ManifestFormat::DockerV2S2 => MediaType::DockerImageConfig,
            ManifestFormat::Oci => MediaType::OciImageConfig,
        }
    }

    pub fn layer_media_type(&self) -> MediaType {
        match self {
            ManifestFormat::DockerV2S2 => MediaType::DockerLayerGzip,
            ManifestFormat::Oci => MediaType::OciLayerGzip,
        }
    }
}

/// Content descriptor within a manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    /// MIME type of the referenced content
    #[serde(rename = "mediaType")]
    pub media_type: String,

    /// Content hash (e.g., "sha256:abc123...")
    pub digest: Digest,

    /// Size in bytes
    pub size: u64,
}

/// Buildable image manifest (Docker V2.2 or OCI; identical shape, the
/// media types differ)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageManifest {
    /// Schema version (always 2)
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    /// Media type of the manifest itself
    #[serde(rename = "mediaType")]
    pub media_type: String,

    /// Reference to the image configuration blob
    pub config: Descriptor,

    /// Ordered layer descriptors
    pub layers: Vec<Descriptor>,
}

impl ImageManifest {
    /// Translate an image and its pushed config descriptor into a
    /// manifest. Pure: identical inputs produce identical manifests.
    pub fn build(format: ManifestFormat, image: &Image, config: &BlobDescriptor) -> Self {
        Self {
            schema_version: 2,
            media_type: format.manifest_media_type().to_string(),
            config: Descriptor {
                media_type: format.config_media_type().to_string(),
                digest: config.digest.clone(),
                size: config.size,
            },
            layers: image
                .layers
                .iter()
                .map(|layer| Descriptor {
                    media_type: layer
                        .descriptor
                        .media_type
                        .clone()
                        .unwrap_or_else(|| format.layer_media_type().to_string()),
                    digest: layer.descriptor.digest.clone(),
                    size: layer.descriptor.size,
                })
                .collect(),
        }
    }

    /// The single canonical serialization; its sha256 is the image digest.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ImageError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ContainerConfig, Layer};

    fn two_layer_image() -> Image {
        Image {
            layers: vec![
                Layer::from_bytes(&b"base layer"[..]),
                Layer::from_bytes(&b"app layer"[..]),
            ],
            config: ContainerConfig::new("amd64", "linux"),
        }
    }

    #[test]
    fn test_build_preserves_layer_order() {
        let image = two_layer_image();
        let config = BlobDescriptor::from_bytes(b"config");
        let manifest = ImageManifest::build(ManifestFormat::DockerV2S2, &image, &config);

        assert_eq!(manifest.schema_version, 2);
        assert_eq!(manifest.config.digest, config.digest);
        assert_eq!(manifest.layers.len(), 2);
        assert_eq!(manifest.layers[0].digest, image.layers[0].descriptor.digest);
        assert_eq!(manifest.layers[1].digest, image.layers[1].descriptor.digest);
    }

    #[test]
    fn test_format_selects_media_types() {
        let image = two_layer_image();
        let config = BlobDescriptor::from_bytes(b"config");

        let docker = ImageManifest::build(ManifestFormat::DockerV2S2, &image, &config);
        assert_eq!(
            docker.media_type,
            "application/vnd.docker.distribution.manifest.v2+json"
        );
        assert_eq!(
            docker.config.media_type,
            "application/vnd.docker.container.image.v1+json"
        );

        let oci = ImageManifest::build(ManifestFormat::Oci, &image, &config);
        assert_eq!(oci.media_type, "application/vnd.oci.image.manifest.v1+json");
        assert_eq!(
            oci.layers[0].media_type,
            "application/vnd.oci.image.layer.v1.tar+gzip"
        );
    }

    #[test]
    fn test_canonical_bytes_are_stable() {
        let image = two_layer_image();
        let config = BlobDescriptor::from_bytes(b"config");
        let manifest = ImageManifest::build(ManifestFormat::DockerV2S2, &image, &config);

        let first = manifest.to_canonical_bytes().unwrap();
        let second = manifest.to_canonical_bytes().unwrap();
        assert_eq!(first, second);
        assert_eq!(Digest::from_bytes(&first), Digest::from_bytes(&second));
    }

    #[test]
    fn test_layer_media_type_override() {
        let mut image = two_layer_image();
        image.layers[0].descriptor.media_type =
            Some("application/vnd.oci.image.layer.v1.tar+zstd".to_string());
        let config = BlobDescriptor::from_bytes(b"config");
        let manifest = ImageManifest::build(ManifestFormat::Oci, &image, &config);

        assert_eq!(
            manifest.layers[0].media_type,
            "application/vnd.oci.image.layer.v1.tar+zstd"
        );
        assert_eq!(
            manifest.layers[1].media_type,
            "application/vnd.oci.image.layer.v1.tar+gzip"
        );
    }
}
