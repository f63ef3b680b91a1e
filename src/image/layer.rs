//! Layer Model
//!
//! A layer pairs the descriptor of its compressed blob with a content
//! source that can produce those bytes any number of times. Base layers
//! are inherited from the source image and are candidates for a
//! cross-repository mount; application layers are produced locally and
//! always uploaded.

use crate::image::{BlobDescriptor, Digest};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::sync::Arc;

/// Repeatable source of a blob's bytes. Every call to `open` must yield
/// the same content.
#[async_trait]
pub trait BlobSource: Send + Sync {
    async fn open(&self) -> io::Result<Bytes>;
}

/// Blob content held in memory
pub struct InMemoryBlob(Bytes);

impl InMemoryBlob {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }
}

#[async_trait]
impl BlobSource for InMemoryBlob {
    async fn open(&self) -> io::Result<Bytes> {
        Ok(self.0.clone())
    }
}

/// A single image layer
#[derive(Clone)]
pub struct Layer {
    /// Descriptor of the compressed blob
    pub descriptor: BlobDescriptor,

    /// Uncompressed content digest, when known; feeds the configuration
    /// blob's rootfs diff_ids
    pub diff_id: Option<Digest>,

    /// Source of the compressed bytes
    pub content: Arc<dyn BlobSource>,
}

impl Layer {
    pub fn new(descriptor: BlobDescriptor, content: Arc<dyn BlobSource>) -> Self {
        Self {
            descriptor,
            diff_id: None,
            content,
        }
    }

    /// Layer over in-memory content, descriptor computed from the bytes
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let descriptor = BlobDescriptor::from_bytes(&data);
        Self::new(descriptor, Arc::new(InMemoryBlob::new(data)))
    }

    pub fn with_diff_id(mut self, diff_id: Digest) -> Self {
        self.diff_id = Some(diff_id);
        self
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("descriptor", &self.descriptor)
            .field("diff_id", &self.diff_id)
            .finish_non_exhaustive()
    }
}
