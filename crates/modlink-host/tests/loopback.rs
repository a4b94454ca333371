//! Integration tests: a host and the demo module talking over a real
//! in-memory channel, through the public API only.

use std::sync::Arc;
use std::time::Duration;

use modlink_core::listen_to_events;
use modlink_host::application::module_api::{
    ActionInstance, ExecuteActionRequest, InitRequest, UpdateFeedbacksRequest,
};
use modlink_host::application::{module_handlers, DemoModule, ModuleClient};
use modlink_host::domain::{ChannelError, HostConfig};
use modlink_host::infrastructure::{run_loopback, MemoryChannel};
use serde_json::{json, Map, Value};

/// Host end plus the module it talks to.
fn connect() -> (ModuleClient<MemoryChannel>, Arc<DemoModule>, MemoryChannel) {
    let (host, module_end) = MemoryChannel::pair("host", "module", 16);
    let module = Arc::new(DemoModule::new());
    let handlers = module_handlers(Arc::clone(&module)).expect("complete handler table");
    listen_to_events(&module_end, &handlers);
    let host = host.with_call_timeout(Some(Duration::from_secs(5)));
    (ModuleClient::new(host), module, module_end)
}

fn action(action_id: &str) -> ExecuteActionRequest {
    ExecuteActionRequest {
        action: ActionInstance {
            id: format!("btn-{action_id}"),
            action_id: action_id.to_string(),
            options: Map::new(),
        },
        surface_id: Some("emulator:1".to_string()),
    }
}

#[tokio::test]
async fn test_config_fields_cross_the_channel_as_text() {
    // Arrange
    let (client, _module, _module_end) = connect();

    // Act: raw call, so we see exactly what went over the wire
    let raw = client
        .sender()
        .call("getConfigFields", json!({}), None)
        .await
        .unwrap();

    // Assert
    let fields = raw["fields"].as_array().unwrap();
    let port = fields.iter().find(|f| f["id"] == "port").unwrap();
    assert_eq!(port["isVisibleFn"], json!("(options) => options.advanced === true"));
    assert!(port.get("isVisible").is_none());
    let protocol = fields.iter().find(|f| f["id"] == "protocol").unwrap();
    assert_eq!(
        protocol["isVisibleFn"],
        json!("(options) => options.advanced && options.port >= 1024")
    );
    let host = fields.iter().find(|f| f["id"] == "host").unwrap();
    assert!(host.get("isVisibleFn").is_none());
}

#[tokio::test]
async fn test_typed_session_round_trip() {
    // Arrange
    let (client, module, _module_end) = connect();

    // Act
    let init = client
        .init(&InitRequest {
            label: "studio".to_string(),
            is_first_init: true,
            config: Map::new(),
        })
        .await
        .unwrap();
    client.execute_action(&action("count")).await.unwrap();
    let feedbacks = client
        .update_feedbacks(&UpdateFeedbacksRequest {
            feedbacks: serde_json::from_value(json!([
                {"id": "f1", "feedbackId": "counter"}
            ]))
            .unwrap(),
        })
        .await
        .unwrap();
    client.destroy().await.unwrap();

    // Assert
    assert!(init.new_config.is_some());
    assert_eq!(feedbacks.values[0].value, json!(1));
    assert!(module.is_destroyed());
}

#[tokio::test]
async fn test_handler_failure_does_not_stop_the_module() {
    let (client, module, _module_end) = connect();

    let err = client.execute_action(&action("fail")).await.unwrap_err();
    client.execute_action(&action("count")).await.unwrap();

    assert_eq!(err.remote_message(), Some("action btn-fail requested a failure"));
    assert_eq!(module.counter(), 1);
}

#[tokio::test]
async fn test_undecodable_payload_gets_error_reply() {
    // `label` is missing, so the init payload cannot be decoded.
    let (client, _module, _module_end) = connect();

    let err = client
        .sender()
        .call("init", json!({"isFirstInit": true}), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ChannelError::Remote(_)));
}

#[tokio::test]
async fn test_non_object_payload_is_dropped_without_reply() {
    let (client, module, _module_end) = connect();

    let err = client
        .sender()
        .call("executeAction", json!("count"), Some(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, ChannelError::Timeout { .. }));
    assert_eq!(module.counter(), 0);
}

#[tokio::test]
async fn test_rejected_config_update_keeps_previous_config() {
    let (client, module, _module_end) = connect();
    let mut good = Map::new();
    good.insert("port".to_string(), json!(8080));
    client.update_config(good.clone()).await.unwrap();

    let mut bad = Map::new();
    bad.insert("port".to_string(), Value::from("eighty"));
    let err = client.update_config(bad).await.unwrap_err();

    assert!(err.remote_message().unwrap().contains("port must be"));
    assert_eq!(module.config(), good);
}

#[tokio::test]
async fn test_loopback_with_seed_file() {
    // Arrange
    let dir = std::env::temp_dir().join(format!("modlink_loopback_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let seed = dir.join("devices.json");
    std::fs::write(
        &seed,
        r#"[
            {"id": "a", "displayName": "A", "isAutoGroup": false, "surfaces": []},
            {"id": "b", "displayName": "B", "isAutoGroup": true, "surfaces": []}
        ]"#,
    )
    .unwrap();
    let mut config = HostConfig::default();
    config.surfaces.seed_file = Some(seed);

    // Act
    let report = run_loopback(config).await.unwrap();

    // Assert: "a" unplugged, "b" renamed, satellite added
    let ids: Vec<&str> = report.devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["b", "satellite:7"]);
    assert_eq!(report.devices[0].display_name, "B (moved)");
    assert_eq!(report.updates_relayed, 3);
    assert_eq!(
        report.visible_fields,
        ["info", "host", "advanced", "port", "protocol"]
    );
    let _ = std::fs::remove_dir_all(&dir);
}
