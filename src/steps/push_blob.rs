//! Push-Blob Step
//!
//! Moves one blob into the target repository, cheapest path first:
//! 1. HEAD probe - the registry may already hold the digest
//! 2. Cross-repository mount - for blobs present in a source repository
//! 3. Monolithic upload - begin (POST), bytes (PATCH), finalizing PUT
//!
//! The bytes are sized and hashed before the finalizing PUT; any
//! disagreement with the declared descriptor aborts the push instead of
//! finalizing a corrupt blob. Transient failures restart the upload
//! sequence under the shared backoff policy. Pushes are deduplicated per
//! (registry, repository, digest): only the first reference uploads,
//! later references attach to its step.

use crate::events::{LogLevel, Timer};
use crate::image::{BlobDescriptor, BlobSource, Digest, ImageReference};
use crate::registry::{
    retry_transient, Authorization, MountOutcome, RegistryError, RegistryOps,
};
use crate::steps::{PushContext, PushError, Result, Step};
use bytes::Bytes;
use std::sync::Arc;

pub(crate) fn spawn(
    ctx: &Arc<PushContext>,
    auth: &Step<Option<Authorization>>,
    target: ImageReference,
    descriptor: BlobDescriptor,
    content: Arc<dyn BlobSource>,
    source_repository: Option<String>,
) -> Step<BlobDescriptor> {
    let key = (
        target.registry.clone(),
        target.repository.clone(),
        descriptor.digest.clone(),
    );

    ctx.tasks.attach_or_insert(key, || {
        let cancel = ctx.cancel.clone();
        let ctx = Arc::clone(ctx);
        let auth = auth.clone();
        Step::spawn(&cancel, async move {
            push_one(ctx, auth, target, descriptor, content, source_repository).await
        })
    })
}

async fn push_one(
    ctx: Arc<PushContext>,
    auth: Step<Option<Authorization>>,
    target: ImageReference,
    descriptor: BlobDescriptor,
    content: Arc<dyn BlobSource>,
    source_repository: Option<String>,
) -> Result<BlobDescriptor> {
    let authorization = auth.join().await?;
    let auth_ref = authorization.as_ref();

    let _permit = ctx.acquire_upload_slot().await?;
    let _timer = Timer::start(
        ctx.events.clone(),
        format!("pushing blob {}", descriptor.digest),
    );

    let registry = &ctx.registry;
    let digest = &descriptor.digest;

    // Phase 1: the registry may already hold it.
    let exists = retry_transient(
        || registry.blob_exists(&target, digest, auth_ref),
        "blob existence probe",
    )
    .await?;
    if exists {
        ctx.log(
            LogLevel::Debug,
            format!("blob {} already exists, skipping upload", digest),
        );
        return Ok(descriptor);
    }

    // Phase 2: cross-repository mount, when a distinct source is known.
    let mut opened_location = None;
    if let Some(source) = source_repository.filter(|s| s != &target.repository) {
        let outcome = retry_transient(
            || registry.mount_blob(&target, digest, &source, auth_ref),
            "cross-repository mount",
        )
        .await?;

        match outcome {
            MountOutcome::Mounted => {
                ctx.log(
                    LogLevel::Debug,
                    format!("blob {} mounted from {}", digest, source),
                );
                return Ok(descriptor);
            }
            MountOutcome::Fallback(location) => opened_location = Some(location),
        }
    }

    // Phase 3: monolithic upload. The content is verified against the
    // descriptor before anything is finalized.
    let data = content
        .open()
        .await
        .map_err(|e| PushError::Internal(format!("blob source read failed: {}", e)))?;
    verify(&descriptor, &data)?;

    // A transient failure restarts the whole sequence; the mount's
    // fallback location is only good for the first attempt.
    retry_transient(
        || {
            upload_once(
                registry.as_ref(),
                &target,
                digest,
                data.clone(),
                opened_location.take(),
                auth_ref,
            )
        },
        "blob upload",
    )
    .await?;

    ctx.log(
        LogLevel::Debug,
        format!("blob {} uploaded ({} bytes)", digest, descriptor.size),
    );
    Ok(descriptor)
}

/// One full upload sequence: begin (unless the mount already opened a
/// session), send the bytes, finalize under the digest.
async fn upload_once(
    registry: &dyn RegistryOps,
    target: &ImageReference,
    digest: &Digest,
    data: Bytes,
    opened_location: Option<String>,
    auth: Option<&Authorization>,
) -> crate::registry::Result<()> {
    let location = match opened_location {
        Some(location) => location,
        None => registry.begin_upload(target, auth).await?,
    };

    let location = registry.upload_blob(target, &location, data, auth).await?;
    let returned = registry.finalize_upload(target, &location, digest, auth).await?;

    if let Some(returned) = returned {
        if &returned != digest {
            return Err(RegistryError::DigestMismatch {
                expected: digest.to_string(),
                actual: returned.to_string(),
            });
        }
    }

    Ok(())
}

/// The declared descriptor must match the bytes about to be sent.
fn verify(descriptor: &BlobDescriptor, data: &[u8]) -> Result<()> {
    if data.len() as u64 != descriptor.size {
        return Err(RegistryError::DigestMismatch {
            expected: format!("{} bytes for {}", descriptor.size, descriptor.digest),
            actual: format!("{} bytes streamed", data.len()),
        }
        .into());
    }

    let computed = Digest::from_bytes(data);
    if computed != descriptor.digest {
        return Err(RegistryError::DigestMismatch {
            expected: descriptor.digest.to_string(),
            actual: computed.to_string(),
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_matching_content() {
        let data = b"matching bytes";
        let descriptor = BlobDescriptor::from_bytes(data);
        assert!(verify(&descriptor, data).is_ok());
    }

    #[test]
    fn test_verify_rejects_size_disagreement() {
        let mut descriptor = BlobDescriptor::from_bytes(b"content");
        descriptor.size = 999;

        match verify(&descriptor, b"content") {
            Err(PushError::Registry(RegistryError::DigestMismatch { actual, .. })) => {
                assert!(actual.contains("7 bytes"));
            }
            other => panic!("expected DigestMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_rejects_digest_disagreement() {
        let descriptor = BlobDescriptor::new(Digest::from_bytes(b"declared"), 6);

        assert!(matches!(
            verify(&descriptor, b"actual"),
            Err(PushError::Registry(RegistryError::DigestMismatch { .. }))
        ));
    }
}
