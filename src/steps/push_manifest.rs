//! Push-Manifest Step
//!
//! The terminal step. Joins every blob push, translates the image into
//! the configured manifest format, serializes it exactly once, and
//! uploads the same bytes under every target tag in parallel. The sha256
//! of those bytes is the image digest handed back to the caller; a
//! registry reporting a different digest fails the push. The ImageCreated
//! event fires only after every tag is live.

use crate::events::{LogLevel, PushEvent, Timer};
use crate::image::{
    BlobDescriptor, Digest, Image, ImageManifest, ImageReference, ManifestFormat,
};
use crate::registry::{retry_transient, Authorization, RegistryError};
use crate::steps::{join_all, PushContext, Step};
use bytes::Bytes;
use std::sync::Arc;

#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn(
    ctx: &Arc<PushContext>,
    auth: &Step<Option<Authorization>>,
    base: &Step<Vec<BlobDescriptor>>,
    app: &Step<Vec<BlobDescriptor>>,
    config: &Step<BlobDescriptor>,
    build: &Step<Image>,
    target: ImageReference,
    tags: Vec<String>,
    format: ManifestFormat,
) -> Step<Digest> {
    let cancel = ctx.cancel.clone();
    let ctx = Arc::clone(ctx);
    let auth = auth.clone();
    let base = base.clone();
    let app = app.clone();
    let config = config.clone();
    let build = build.clone();

    Step::spawn(&cancel, async move {
        // Every referenced blob must be live before any manifest names it.
        let authorization = auth.join().await?;
        base.join().await?;
        app.join().await?;
        let config_descriptor = config.join().await?;
        let image = build.join().await?;

        let _timer = Timer::start(ctx.events.clone(), "pushing image manifest");

        let manifest = ImageManifest::build(format, &image, &config_descriptor);
        // One serialization: these bytes feed the hasher and every PUT.
        let data = Bytes::from(manifest.to_canonical_bytes()?);
        let image_digest = Digest::from_bytes(&data);
        let media_type = format.manifest_media_type().to_string();

        let tag_steps: Vec<Step<()>> = tags
            .iter()
            .map(|tag| {
                let cancel = ctx.cancel.clone();
                let ctx = Arc::clone(&ctx);
                let target = target.clone();
                let tag = tag.clone();
                let authorization = authorization.clone();
                let data = data.clone();
                let media_type = media_type.clone();
                let image_digest = image_digest.clone();

                Step::spawn(&cancel, async move {
                    let _permit = ctx.acquire_upload_slot().await?;
                    ctx.log(LogLevel::Info, format!("Tagging with {}...", tag));

                    let returned = retry_transient(
                        || {
                            ctx.registry.put_manifest(
                                &target,
                                &tag,
                                &media_type,
                                data.clone(),
                                authorization.as_ref(),
                            )
                        },
                        "manifest upload",
                    )
                    .await?;

                    if let Some(returned) = returned {
                        if returned != image_digest {
                            return Err(RegistryError::DigestMismatch {
                                expected: image_digest.to_string(),
                                actual: returned.to_string(),
                            }
                            .into());
                        }
                    }

                    Ok(())
                })
            })
            .collect();

        join_all(&tag_steps).await?;

        ctx.log(
            LogLevel::Info,
            format!(
                "pushed {}/{} as {}",
                target.registry, target.repository, image_digest
            ),
        );
        ctx.events.dispatch(PushEvent::ImageCreated {
            image,
            image_digest: image_digest.clone(),
            config_digest: config_descriptor.digest.clone(),
        });

        Ok(image_digest)
    })
}
