//! Push-Config Step
//!
//! Waits for the built image, serializes its container configuration to
//! the canonical JSON form, computes the digest, and hands the bytes to a
//! deduplicated push-blob step. The descriptor it returns is the one the
//! manifest references.

use crate::events::Timer;
use crate::image::{BlobDescriptor, Digest, Image, ImageReference, InMemoryBlob, ManifestFormat};
use crate::registry::Authorization;
use crate::steps::{push_blob, PushContext, Step};
use bytes::Bytes;
use std::sync::Arc;

pub(crate) fn spawn(
    ctx: &Arc<PushContext>,
    auth: &Step<Option<Authorization>>,
    build: &Step<Image>,
    target: ImageReference,
    format: ManifestFormat,
) -> Step<BlobDescriptor> {
    let cancel = ctx.cancel.clone();
    let ctx = Arc::clone(ctx);
    let auth = auth.clone();
    let build = build.clone();

    Step::spawn(&cancel, async move {
        let image = build.join().await?;

        let _timer = Timer::start(ctx.events.clone(), "pushing container configuration");

        let data = Bytes::from(image.config.to_canonical_json()?);
        let descriptor = BlobDescriptor {
            digest: Digest::from_bytes(&data),
            size: data.len() as u64,
            media_type: Some(format.config_media_type().to_string()),
        };

        let blob = push_blob::spawn(
            &ctx,
            &auth,
            target,
            descriptor.clone(),
            Arc::new(InMemoryBlob::new(data)),
            None,
        );
        blob.join().await?;

        Ok(descriptor)
    })
}
