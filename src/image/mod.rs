//! Image Data Model
//!
//! The value types a push operates on:
//! - Content digests and blob descriptors
//! - Layers with repeatable content sources
//! - Image references (registry/repository/tag)
//! - Container configuration and buildable manifests
//!
//! Everything here is immutable once constructed, and every entity
//! carrying a digest matches the bytes that digest was computed from.

mod config;
mod digest;
mod layer;
mod manifest;
mod reference;

pub use config::{ContainerConfig, EmptyObject, History, RootFs, RuntimeConfig};
pub use digest::Digest;
pub use layer::{BlobSource, InMemoryBlob, Layer};
pub use manifest::{Descriptor, ImageManifest, ManifestFormat, MediaType};
pub use reference::ImageReference;

use thiserror::Error;

/// Errors from constructing or serializing image values
#[derive(Error, Debug, Clone)]
pub enum ImageError {
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, ImageError>;

/// Descriptor of a blob addressed in a registry: its digest, its exact
/// size in bytes, and optionally the media type it is served as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDescriptor {
    pub digest: Digest,
    pub size: u64,
    pub media_type: Option<String>,
}

impl BlobDescriptor {
    pub fn new(digest: Digest, size: u64) -> Self {
        Self {
            digest,
            size,
            media_type: None,
        }
    }

    /// Descriptor of the given content
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::new(Digest::from_bytes(data), data.len() as u64)
    }
}

impl std::fmt::Display for BlobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bytes)", self.digest, self.size)
    }
}

/// A fully assembled image: ordered layers plus container configuration.
/// Layer order is significant and equals the runtime stacking order.
#[derive(Debug, Clone)]
pub struct Image {
    pub layers: Vec<Layer>,
    pub config: ContainerConfig,
}

impl Image {
    /// Descriptors of all layers, in stacking order
    pub fn layer_descriptors(&self) -> Vec<BlobDescriptor> {
        self.layers.iter().map(|l| l.descriptor.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_bytes() {
        let d = BlobDescriptor::from_bytes(b"hello");
        assert_eq!(d.size, 5);
        assert_eq!(d.digest, Digest::from_bytes(b"hello"));
        assert!(d.media_type.is_none());
    }

    #[test]
    fn test_layer_descriptors_preserve_order() {
        let a = Layer::from_bytes(&b"first"[..]);
        let b = Layer::from_bytes(&b"second"[..]);
        let image = Image {
            layers: vec![a.clone(), b.clone()],
            config: ContainerConfig::new("amd64", "linux"),
        };

        let descriptors = image.layer_descriptors();
        assert_eq!(descriptors[0], a.descriptor);
        assert_eq!(descriptors[1], b.descriptor);
    }
}
