//! Push-Layers Step
//!
//! Fans one push-blob step per layer and joins them. Children run
//! concurrently under the shared upload bound; the output preserves the
//! input layer order. Base layers carry the repository they may be
//! mounted from; application layers never mount.

use crate::events::PushEvent;
use crate::image::{BlobDescriptor, ImageReference, Layer};
use crate::registry::Authorization;
use crate::steps::{push_blob, PushContext, Step};
use std::sync::Arc;

pub(crate) fn spawn(
    ctx: &Arc<PushContext>,
    auth: &Step<Option<Authorization>>,
    target: ImageReference,
    layers: Vec<Layer>,
    source_repository: Option<String>,
    unit: &'static str,
) -> Step<Vec<BlobDescriptor>> {
    let cancel = ctx.cancel.clone();
    let ctx = Arc::clone(ctx);
    let auth = auth.clone();

    Step::spawn(&cancel, async move {
        let children: Vec<Step<BlobDescriptor>> = layers
            .iter()
            .map(|layer| {
                push_blob::spawn(
                    &ctx,
                    &auth,
                    target.clone(),
                    layer.descriptor.clone(),
                    layer.content.clone(),
                    source_repository.clone(),
                )
            })
            .collect();

        let total = children.len() as u64;
        let mut descriptors = Vec::with_capacity(children.len());
        for (index, child) in children.iter().enumerate() {
            descriptors.push(child.join().await?);
            ctx.events.dispatch(PushEvent::Progress {
                unit: unit.to_string(),
                total,
                done: index as u64 + 1,
            });
        }

        Ok(descriptors)
    })
}
