//! End-to-end loopback session: host and demo module on one in-memory channel.
//!
//! [`run_loopback`] drives every module operation once, the way a host would
//! over a real connection:
//!
//! 1. connect a [`DemoModule`] to the module end of a [`MemoryChannel`] pair
//! 2. `init` it with the configured label
//! 3. fetch its config fields and evaluate their visibility rules locally
//! 4. run a few actions, one of which fails on purpose
//! 5. push a config update and read feedback values back
//! 6. relay a device-list change through a [`SurfaceFeed`] to a client mirror
//! 7. `destroy` the module and close the channel

use std::sync::Arc;

use anyhow::{bail, Context};
use modlink_core::{
    listen_to_events, ClientDevicesListItem, ClientSurfaceItem, ConfigField, SurfaceList,
};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

use crate::application::module_api::{
    ActionInstance, ExecuteActionRequest, FeedbackInstance, FeedbackValue, InitRequest,
    UpdateFeedbacksRequest,
};
use crate::application::{module_handlers, DemoModule, ModuleClient, SurfaceFeed};
use crate::domain::{load_seed_devices, HostConfig};
use crate::infrastructure::memory_channel::MemoryChannel;

/// What a loopback session observed.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackReport {
    /// Fields as the host received them (predicates already in text form).
    pub fields: Vec<ConfigField>,
    /// Ids of the fields visible under the module's final config.
    pub visible_fields: Vec<String>,
    /// Config persisted after `init` and the follow-up `updateConfig`.
    pub config: Map<String, Value>,
    /// Failure text of the action that was expected to fail.
    pub failed_action: Option<String>,
    pub feedbacks: Vec<FeedbackValue>,
    /// Number of surface updates relayed to the client mirror.
    pub updates_relayed: usize,
    /// Device list held by the client mirror at the end.
    pub devices: Vec<ClientDevicesListItem>,
}

/// Runs one loopback session with `config`.
///
/// # Errors
///
/// Returns an error if the seed file cannot be loaded, if any exchange that
/// should succeed fails, or if the client mirror diverges from the host's
/// device list.
pub async fn run_loopback(config: HostConfig) -> anyhow::Result<LoopbackReport> {
    // ── Step 1: Connect the module ────────────────────────────────────────────
    let (host_end, module_end) =
        MemoryChannel::pair("host", "module", config.channel.queue_depth);
    let host_end = host_end.with_call_timeout(config.call_timeout());

    let module = Arc::new(DemoModule::new());
    let handlers = module_handlers(Arc::clone(&module)).context("building module handlers")?;
    listen_to_events(&module_end, &handlers);
    info!(operations = handlers.len(), "demo module connected");

    let client = ModuleClient::new(host_end);

    // ── Step 2: Initialise ────────────────────────────────────────────────────
    let init = client
        .init(&InitRequest {
            label: config.host.module_label.clone(),
            is_first_init: true,
            config: Map::new(),
        })
        .await
        .context("init failed")?;
    let mut module_config = init.new_config.unwrap_or_default();
    info!(keys = module_config.len(), "module initialised");

    // ── Step 3: Config fields ─────────────────────────────────────────────────
    let fields = client
        .get_config_fields()
        .await
        .context("fetching config fields failed")?;
    info!(count = fields.len(), "received config fields");

    // ── Step 4: Actions ───────────────────────────────────────────────────────
    for action_id in ["log", "count", "count"] {
        client
            .execute_action(&action(action_id, json!({"message": "hello from the host"})))
            .await
            .with_context(|| format!("action {action_id} failed"))?;
    }
    let failed_action = match client.execute_action(&action("fail", json!({}))).await {
        Ok(()) => None,
        Err(e) => {
            warn!("expected action failure: {e}");
            e.remote_message().map(str::to_string)
        }
    };

    // ── Step 5: Config update and feedbacks ───────────────────────────────────
    module_config.insert("advanced".to_string(), json!(true));
    client
        .update_config(module_config.clone())
        .await
        .context("config update failed")?;

    let visible_fields = visible_field_ids(&fields, &module_config)?;

    let feedbacks = client
        .update_feedbacks(&UpdateFeedbacksRequest {
            feedbacks: vec![
                feedback("fb-counter", "counter", json!({})),
                feedback("fb-host", "config_value", json!({"key": "host"})),
            ],
        })
        .await
        .context("feedback update failed")?
        .values;

    // ── Step 6: Surface relay ─────────────────────────────────────────────────
    let baseline = match &config.surfaces.seed_file {
        Some(path) => load_seed_devices(path)
            .with_context(|| format!("loading surface seed {}", path.display()))?,
        None => builtin_devices(),
    };
    let feed = SurfaceFeed::with_baseline(baseline, config.surfaces.feed_capacity);
    let (snapshot, mut updates) = feed.subscribe();
    let mut mirror = SurfaceList::from_items(snapshot);

    feed.publish(hot_plug(&feed.snapshot()));

    let mut updates_relayed = 0;
    loop {
        match updates.try_recv() {
            Ok(update) => {
                mirror
                    .apply(&update)
                    .with_context(|| format!("applying update for {}", update.item_id()))?;
                updates_relayed += 1;
            }
            Err(TryRecvError::Empty) => break,
            Err(e) => bail!("surface feed receive failed: {e}"),
        }
    }
    if mirror.to_vec() != feed.snapshot() {
        bail!("client device list diverged from host");
    }
    info!(updates = updates_relayed, devices = mirror.len(), "surface list relayed");

    // ── Step 7: Tear down ─────────────────────────────────────────────────────
    client.destroy().await.context("destroy failed")?;
    client.sender().close();
    info!("loopback session finished");

    Ok(LoopbackReport {
        fields,
        visible_fields,
        config: module.config(),
        failed_action,
        feedbacks,
        updates_relayed,
        devices: mirror.to_vec(),
    })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn action(action_id: &str, options: Value) -> ExecuteActionRequest {
    ExecuteActionRequest {
        action: ActionInstance {
            id: format!("act-{action_id}"),
            action_id: action_id.to_string(),
            options: into_map(options),
        },
        surface_id: None,
    }
}

fn feedback(id: &str, feedback_id: &str, options: Value) -> FeedbackInstance {
    FeedbackInstance {
        id: id.to_string(),
        feedback_id: feedback_id.to_string(),
        options: into_map(options),
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Evaluates each field's `isVisibleFn` against `options`.
fn visible_field_ids(
    fields: &[ConfigField],
    options: &Map<String, Value>,
) -> anyhow::Result<Vec<String>> {
    let mut visible = Vec::new();
    for field in fields {
        if field
            .is_visible_for(options)
            .with_context(|| format!("evaluating visibility of field {}", field.id))?
        {
            visible.push(field.id.clone());
        }
    }
    Ok(visible)
}

/// Device list used when no seed file is configured.
fn builtin_devices() -> Vec<ClientDevicesListItem> {
    vec![
        ClientDevicesListItem {
            id: "emulator:1".to_string(),
            index: Some(0),
            display_name: "Emulator".to_string(),
            is_auto_group: false,
            surfaces: vec![surface("emulator:1", "emulator", "Emulator")],
        },
        ClientDevicesListItem {
            id: "streamdeck:AL12".to_string(),
            index: Some(1),
            display_name: "Stream Deck XL".to_string(),
            is_auto_group: true,
            surfaces: vec![surface("streamdeck:AL12", "elgato-streamdeck", "Stream Deck XL")],
        },
    ]
}

fn surface(id: &str, integration: &str, name: &str) -> ClientSurfaceItem {
    ClientSurfaceItem {
        id: id.to_string(),
        surface_type: "surface".to_string(),
        integration_type: integration.to_string(),
        name: name.to_string(),
        config_fields: vec!["brightness".to_string()],
        is_connected: true,
        display_name: name.to_string(),
        location: None,
    }
}

/// The host's next view: the first device unplugged, the rest renamed, and
/// one new device attached.
fn hot_plug(current: &[ClientDevicesListItem]) -> Vec<ClientDevicesListItem> {
    let mut next: Vec<ClientDevicesListItem> = current
        .iter()
        .skip(1)
        .cloned()
        .map(|mut device| {
            device.display_name = format!("{} (moved)", device.display_name);
            device
        })
        .collect();
    next.push(ClientDevicesListItem {
        id: "satellite:7".to_string(),
        index: None,
        display_name: "Satellite".to_string(),
        is_auto_group: true,
        surfaces: vec![surface("satellite:7", "satellite", "Satellite panel")],
    });
    next
}

// ── Tests ─────────────────────────────────────────────────────────────────────
