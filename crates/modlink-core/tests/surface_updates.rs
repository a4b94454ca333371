//! Integration tests for the surface update feed as a client would see it:
//! JSON events decoded from the wire and applied in order to a baseline.

use modlink_core::{diff_devices, ClientDevicesListItem, SurfaceError, SurfaceList, SurfacesUpdate};
use serde_json::{json, Value};

fn device_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "index": 0,
        "displayName": name,
        "isAutoGroup": false,
        "surfaces": [{
            "id": format!("{id}:0"),
            "type": "streamdeck",
            "integrationType": "elgato",
            "name": "Stream Deck Mini",
            "configFields": ["brightness", "rotation"],
            "isConnected": true,
            "displayName": "Mini",
            "location": "usb:1-2"
        }]
    })
}

fn decode(events: Value) -> Vec<SurfacesUpdate> {
    serde_json::from_value(events).expect("fixture events must decode")
}

#[test]
fn test_add_update_remove_sequence() {
    // Arrange
    let events = decode(json!([
        {"type": "add", "itemId": "d1", "info": device_json("d1", "Desk")},
        {"type": "update", "itemId": "d1",
         "patch": [{"op": "replace", "path": "/displayName", "value": "New"}]},
        {"type": "remove", "itemId": "d1"}
    ]));
    let mut list = SurfaceList::new();

    // Act / Assert
    list.apply(&events[0]).unwrap();
    list.apply(&events[1]).unwrap();
    assert_eq!(list.get("d1").map(|d| d.display_name.as_str()), Some("New"));

    list.apply(&events[2]).unwrap();
    assert!(list.is_empty());
}

#[test]
fn test_patch_order_is_significant() {
    let mut list = SurfaceList::new();
    list.apply_all(&decode(json!([
        {"type": "add", "itemId": "d1", "info": device_json("d1", "Desk")}
    ])))
    .unwrap();

    // Copy before replace: the copy sees the old name.
    let events = decode(json!([{
        "type": "update", "itemId": "d1",
        "patch": [
            {"op": "copy", "from": "/displayName", "path": "/surfaces/0/displayName"},
            {"op": "replace", "path": "/displayName", "value": "Studio"},
            {"op": "test", "path": "/surfaces/0/displayName", "value": "Desk"}
        ]
    }]));
    list.apply_all(&events).unwrap();

    let device = list.get("d1").unwrap();
    assert_eq!(device.display_name, "Studio");
    assert_eq!(device.surfaces[0].display_name, "Desk");
}

#[test]
fn test_update_for_unknown_entry_is_reported() {
    let mut list = SurfaceList::new();
    let events = decode(json!([{
        "type": "update", "itemId": "ghost",
        "patch": [{"op": "remove", "path": "/index"}]
    }]));

    assert_eq!(
        list.apply_all(&events),
        Err(SurfaceError::UnknownItem {
            item_id: "ghost".to_string()
        })
    );
}

#[test]
fn test_producer_diff_drives_consumer_to_same_snapshot() {
    // Arrange: the host's view before and after a hot-plug
    let before: Vec<ClientDevicesListItem> =
        serde_json::from_value(json!([device_json("a", "A"), device_json("b", "B")])).unwrap();
    let mut after = before.clone();
    after.remove(0);
    after[0].surfaces[0].is_connected = false;
    after[0].surfaces[0].location = None;
    after.push(serde_json::from_value(device_json("c", "C")).unwrap());

    // Act: events travel as JSON, as they would over the channel
    let wire = serde_json::to_value(diff_devices(&before, &after)).unwrap();
    let mut client = SurfaceList::from_items(before);
    client.apply_all(&decode(wire)).unwrap();

    // Assert
    assert_eq!(client.to_vec(), after);
}
