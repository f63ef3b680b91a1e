//! Hoist - Container Image Push Core
//!
//! A dependency-ordered, concurrent pipeline that publishes a built
//! container image to an OCI/Docker V2 registry:
//! - Authenticates once per push with `push,pull` scope
//! - Uploads layer and configuration blobs, deduplicated per digest,
//!   with cross-repository mounts for inherited layers
//! - Composes a Docker V2.2 or OCI manifest and uploads it under every
//!   target tag, returning the manifest digest as the image digest
//!
//! The core consumes its collaborators - registry operations, credential
//! lookup, event sink - through traits and keeps no global state. One
//! [`steps::PushContext`] carries everything a push needs; one call to
//! [`steps::push_image`] runs the whole DAG.

pub mod events;
pub mod image;
pub mod registry;
pub mod steps;

pub use events::{EventSink, LogLevel, NullSink, PushEvent};
pub use image::{
    BlobDescriptor, BlobSource, ContainerConfig, Digest, Image, ImageReference, InMemoryBlob,
    Layer, ManifestFormat,
};
pub use registry::{
    Authorization, CredentialProvider, Credentials, HttpRegistryClient, MountOutcome,
    RegistryError, RegistryOps, StaticCredentials,
};
pub use steps::{push_image, ImageSettings, PushContext, PushError, PushRequest};
