//! Build-Image Step
//!
//! Assembles the in-memory image the manifest derives from. Deterministic
//! by construction: base layers stack before application layers, maps are
//! ordered, and the creation timestamp comes from the caller rather than
//! a clock.

use crate::events::Timer;
use crate::image::{ContainerConfig, EmptyObject, Image, Layer, RootFs};
use crate::steps::{PushContext, Step};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Image metadata applied on top of the configuration template
#[derive(Debug, Clone, Default)]
pub struct ImageSettings {
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub env: Option<Vec<String>>,
    pub labels: BTreeMap<String, String>,
    pub exposed_ports: Vec<String>,
    pub volumes: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,

    /// RFC 3339 creation timestamp, recorded verbatim
    pub created: Option<String>,
}

pub(crate) fn spawn(
    ctx: &Arc<PushContext>,
    base_layers: Vec<Layer>,
    app_layers: Vec<Layer>,
    template: ContainerConfig,
    settings: ImageSettings,
) -> Step<Image> {
    let cancel = ctx.cancel.clone();
    let ctx = Arc::clone(ctx);

    Step::spawn(&cancel, async move {
        let _timer = Timer::start(ctx.events.clone(), "building image");
        Ok(assemble(base_layers, app_layers, template, settings))
    })
}

/// Pure assembly: identical inputs produce an identical image.
fn assemble(
    base_layers: Vec<Layer>,
    app_layers: Vec<Layer>,
    mut config: ContainerConfig,
    settings: ImageSettings,
) -> Image {
    let mut layers = base_layers;
    layers.extend(app_layers);

    let runtime = config.config.get_or_insert_with(Default::default);
    if settings.entrypoint.is_some() {
        runtime.entrypoint = settings.entrypoint;
    }
    if settings.cmd.is_some() {
        runtime.cmd = settings.cmd;
    }
    if settings.env.is_some() {
        runtime.env = settings.env;
    }
    if settings.working_dir.is_some() {
        runtime.working_dir = settings.working_dir;
    }
    if settings.user.is_some() {
        runtime.user = settings.user;
    }
    if !settings.labels.is_empty() {
        runtime
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(settings.labels);
    }
    for port in settings.exposed_ports {
        runtime
            .exposed_ports
            .get_or_insert_with(BTreeMap::new)
            .insert(port, EmptyObject {});
    }
    for volume in settings.volumes {
        runtime
            .volumes
            .get_or_insert_with(BTreeMap::new)
            .insert(volume, EmptyObject {});
    }

    if settings.created.is_some() {
        config.created = settings.created;
    }

    // Compressed digests stand in for missing diff IDs so the rootfs
    // still lists one entry per layer.
    config.rootfs = RootFs {
        fs_type: "layers".to_string(),
        diff_ids: layers
            .iter()
            .map(|layer| {
                layer
                    .diff_id
                    .clone()
                    .unwrap_or_else(|| layer.descriptor.digest.clone())
            })
            .collect(),
    };

    Image { layers, config }
}
