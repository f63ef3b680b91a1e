//! Push Pipeline
//!
//! The fixed DAG of steps publishing an image:
//!
//! ```text
//! authenticate ──► push base layers ──┐
//!              ──► push app layers  ──┤
//!              ──► push config blob ──┼──► push manifest (per tag)
//!                       build image ──┘
//! ```
//!
//! Steps run concurrently on the tokio runtime; network-heavy sections
//! are bounded by a shared semaphore. Blob pushes are deduplicated per
//! (registry, repository, digest) for the lifetime of one push; nothing
//! survives the invocation.

mod authenticate;
mod build_image;
mod push_blob;
mod push_config;
mod push_layers;
mod push_manifest;
mod step;

pub use build_image::ImageSettings;
pub use step::{join_all, Step, StepResult};

use crate::events::{EventSink, LogLevel, PushEvent};
use crate::image::{
    BlobDescriptor, ContainerConfig, Digest, ImageError, ImageReference, Layer, ManifestFormat,
};
use crate::registry::{CredentialProvider, RegistryError, RegistryOps};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Errors resolving a push. A failed step hands the same root cause to
/// every step downstream of it.
#[derive(Error, Debug, Clone)]
pub enum PushError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Push cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PushError>;

/// Key of the blob deduplication map
type TaskKey = (String, String, Digest);

/// Per-invocation deduplication of blob pushes. At most one uploader runs
/// per (registry, repository, digest); later references attach to the
/// first one's step and share its outcome.
#[derive(Default)]
pub(crate) struct PushTaskSet {
    tasks: DashMap<TaskKey, Step<BlobDescriptor>>,
}

impl PushTaskSet {
    /// Return the step registered under `key`, inserting the one `create`
    /// makes if the key is new. The insert is atomic; only the inserter's
    /// step runs an upload.
    pub(crate) fn attach_or_insert(
        &self,
        key: TaskKey,
        create: impl FnOnce() -> Step<BlobDescriptor>,
    ) -> Step<BlobDescriptor> {
        self.tasks.entry(key).or_insert_with(create).clone()
    }
}

/// Injected collaborators plus the shared runtime resources of one push.
/// The core holds no state outside this value.
pub struct PushContext {
    pub(crate) registry: Arc<dyn RegistryOps>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) cancel: CancellationToken,
    pub(crate) uploads: Arc<Semaphore>,
    pub(crate) tasks: PushTaskSet,
}

impl PushContext {
    pub fn new(
        registry: Arc<dyn RegistryOps>,
        credentials: Arc<dyn CredentialProvider>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            credentials,
            events,
            cancel: CancellationToken::new(),
            uploads: Arc::new(Semaphore::new(Self::default_parallelism())),
            tasks: PushTaskSet::default(),
        }
    }

    /// One upload slot per available core by default
    fn default_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    /// Bound the number of concurrently running uploads
    pub fn with_max_concurrent_uploads(mut self, max: usize) -> Self {
        self.uploads = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    /// Token cancelling this push; callers may cancel it directly
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the push once `budget` of wall-clock time elapses
    pub fn cancel_after(&self, budget: Duration) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            cancel.cancel();
        });
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.events.dispatch(PushEvent::Log {
            level,
            message: message.into(),
        });
    }

    /// Acquire an upload slot. Steps call this after joining their
    /// predecessors, so a saturated pool cannot deadlock the DAG.
    pub(crate) async fn acquire_upload_slot(&self) -> Result<OwnedSemaphorePermit> {
        self.uploads
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PushError::Cancelled)
    }
}

/// Everything one push needs. Constructed entirely by the caller; the
/// core adds nothing of its own - in particular no clock reads, the
/// creation timestamp in `settings` is used verbatim.
#[derive(Clone)]
pub struct PushRequest {
    /// Target repository
    pub target: ImageReference,

    /// Tags the manifest is published under; must be nonempty
    pub tags: Vec<String>,

    /// Layers inherited from the source image, in stacking order
    pub base_layers: Vec<Layer>,

    /// Locally produced layers, stacked after the base layers
    pub app_layers: Vec<Layer>,

    /// Repository the base layers may be mounted from, when it lives on
    /// the target registry
    pub source_repository: Option<String>,

    /// Configuration template the image settings are applied to
    pub config: ContainerConfig,

    /// Image metadata applied on top of the template
    pub settings: ImageSettings,

    /// Output manifest format
    pub format: ManifestFormat,
}

/// Run the full push DAG. Returns the image digest: the sha256 of the
/// manifest bytes uploaded under every tag.
///
/// On failure the first non-cancelled failure wins; a push that failed
/// only by cancellation returns `Cancelled`.
pub async fn push_image(ctx: Arc<PushContext>, request: PushRequest) -> Result<Digest> {
    if request.tags.is_empty() {
        return Err(PushError::Internal(
            "push requested with an empty tag set".to_string(),
        ));
    }

    let auth = authenticate::spawn(&ctx, request.target.clone());
    let build = build_image::spawn(
        &ctx,
        request.base_layers.clone(),
        request.app_layers.clone(),
        request.config.clone(),
        request.settings.clone(),
    );
    let base = push_layers::spawn(
        &ctx,
        &auth,
        request.target.clone(),
        request.base_layers.clone(),
        request.source_repository.clone(),
        "base layers",
    );
    let app = push_layers::spawn(
        &ctx,
        &auth,
        request.target.clone(),
        request.app_layers.clone(),
        None,
        "application layers",
    );
    let config = push_config::spawn(&ctx, &auth, &build, request.target.clone(), request.format);
    let manifest = push_manifest::spawn(
        &ctx,
        &auth,
        &base,
        &app,
        &config,
        &build,
        request.target.clone(),
        request.tags.clone(),
        request.format,
    );

    let outcome = manifest.join().await;

    // The outcome is decided; stop whatever is still in flight.
    ctx.cancel.cancel();

    match outcome {
        Ok(digest) => Ok(digest),
        Err(PushError::Cancelled) => {
            // The manifest step saw cancellation, but an earlier step may
            // hold the actual root cause.
            let mut errors = Vec::new();
            if let Some(Err(e)) = auth.peek() {
                errors.push(e);
            }
            if let Some(Err(e)) = base.peek() {
                errors.push(e);
            }
            if let Some(Err(e)) = app.peek() {
                errors.push(e);
            }
            if let Some(Err(e)) = config.peek() {
                errors.push(e);
            }
            if let Some(Err(e)) = build.peek() {
                errors.push(e);
            }

            Err(errors
                .into_iter()
                .find(|e| !matches!(e, PushError::Cancelled))
                .unwrap_or(PushError::Cancelled))
        }
        Err(e) => Err(e),
    }
}
