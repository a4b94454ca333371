//! Control surfaces, device groupings and the incremental update feed.
//!
//! The surface manager (outside this crate) owns the real device state and
//! sends the client UI one full snapshot followed by a stream of
//! [`SurfacesUpdate`]s.  Each update addresses one list entry by `itemId`:
//!
//! ```json
//! {"type":"add",    "itemId":"d1", "info":{ ...ClientDevicesListItem... }}
//! {"type":"update", "itemId":"d1", "patch":[{"op":"replace","path":"/displayName","value":"New"}]}
//! {"type":"remove", "itemId":"d1"}
//! ```
//!
//! [`SurfaceList`] is the consumer-side mirror that applies the stream in
//! order; [`diff_devices`] is the producer-side helper that turns two
//! snapshots into such a stream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::patch::{self, apply_patch, PatchError, PatchOperation};

// ── Surface model ─────────────────────────────────────────────────────────────

/// One physical or virtual control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSurfaceItem {
    pub id: String,
    #[serde(rename = "type")]
    pub surface_type: String,
    pub integration_type: String,
    pub name: String,
    pub config_fields: Vec<String>,
    pub is_connected: bool,
    pub display_name: String,
    pub location: Option<String>,
}

/// A device (or auto-group) and the surfaces under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDevicesListItem {
    pub id: String,
    /// Ordering hint; `None` for groups without a fixed position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub display_name: String,
    pub is_auto_group: bool,
    pub surfaces: Vec<ClientSurfaceItem>,
}

/// Persisted settings of a surface group.  Field names are snake_case on the
/// wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceGroupConfig {
    pub name: String,
    pub last_page: u32,
    pub startup_page: u32,
    pub use_last_page: bool,
}

/// Free-form per-panel settings.
pub type SurfacePanelConfig = Map<String, Value>;

/// One incremental change to the client-visible device list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SurfacesUpdate {
    Add {
        #[serde(rename = "itemId")]
        item_id: String,
        info: ClientDevicesListItem,
    },
    Remove {
        #[serde(rename = "itemId")]
        item_id: String,
    },
    /// Ordered patch against the entry's last known state.
    Update {
        #[serde(rename = "itemId")]
        item_id: String,
        patch: Vec<PatchOperation>,
    },
}

impl SurfacesUpdate {
    pub fn item_id(&self) -> &str {
        match self {
            SurfacesUpdate::Add { item_id, .. }
            | SurfacesUpdate::Remove { item_id }
            | SurfacesUpdate::Update { item_id, .. } => item_id,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised while applying a [`SurfacesUpdate`].
#[derive(Debug, Error, PartialEq)]
pub enum SurfaceError {
    /// `remove` or `update` named an id that is not in the list.
    #[error("no device list entry with id \"{item_id}\"")]
    UnknownItem { item_id: String },

    /// The patch did not apply cleanly to the entry.
    #[error("patch for \"{item_id}\" failed: {source}")]
    Patch {
        item_id: String,
        #[source]
        source: PatchError,
    },

    /// The patch applied, but the result is not a valid device entry.
    #[error("patched entry \"{item_id}\" is not a valid device: {message}")]
    InvalidShape { item_id: String, message: String },
}

// ── SurfaceList ───────────────────────────────────────────────────────────────

/// Consumer-side mirror of the device list, keyed by `itemId`.
///
/// Entries keep insertion order: an `add` for a new id appends, an `add` for
/// an existing id replaces that entry in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceList {
    entries: Vec<(String, ClientDevicesListItem)>,
}

impl SurfaceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a baseline from a full snapshot, keying each entry by its `id`.
    pub fn from_items(items: impl IntoIterator<Item = ClientDevicesListItem>) -> Self {
        Self {
            entries: items.into_iter().map(|item| (item.id.clone(), item)).collect(),
        }
    }

    /// Applies one update.
    ///
    /// # Errors
    ///
    /// - [`SurfaceError::UnknownItem`] for `remove`/`update` of a missing id.
    /// - [`SurfaceError::Patch`] if the patch does not apply.
    /// - [`SurfaceError::InvalidShape`] if the patched entry no longer
    ///   decodes as a [`ClientDevicesListItem`].
    ///
    /// The list is unchanged when an error is returned.
    pub fn apply(&mut self, update: &SurfacesUpdate) -> Result<(), SurfaceError> {
        match update {
            SurfacesUpdate::Add { item_id, info } => {
                match self.position(item_id) {
                    Some(index) => self.entries[index].1 = info.clone(),
                    None => self.entries.push((item_id.clone(), info.clone())),
                }
                Ok(())
            }
            SurfacesUpdate::Remove { item_id } => {
                let index = self.require(item_id)?;
                self.entries.remove(index);
                Ok(())
            }
            SurfacesUpdate::Update { item_id, patch } => {
                let index = self.require(item_id)?;
                let invalid = |err: serde_json::Error| SurfaceError::InvalidShape {
                    item_id: item_id.clone(),
                    message: err.to_string(),
                };
                let mut doc = serde_json::to_value(&self.entries[index].1).map_err(invalid)?;
                apply_patch(&mut doc, patch).map_err(|source| SurfaceError::Patch {
                    item_id: item_id.clone(),
                    source,
                })?;
                self.entries[index].1 = serde_json::from_value(doc).map_err(invalid)?;
                Ok(())
            }
        }
    }

    /// Applies updates in order, stopping at the first failure.
    ///
    /// Updates before the failing one stay applied.
    pub fn apply_all<'a, I>(&mut self, updates: I) -> Result<(), SurfaceError>
    where
        I: IntoIterator<Item = &'a SurfacesUpdate>,
    {
        updates.into_iter().try_for_each(|update| self.apply(update))
    }

    pub fn get(&self, item_id: &str) -> Option<&ClientDevicesListItem> {
        self.position(item_id).map(|index| &self.entries[index].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in list order.
    pub fn items(&self) -> impl Iterator<Item = &ClientDevicesListItem> {
        self.entries.iter().map(|(_, item)| item)
    }

    pub fn to_vec(&self) -> Vec<ClientDevicesListItem> {
        self.items().cloned().collect()
    }

    fn position(&self, item_id: &str) -> Option<usize> {
        self.entries.iter().position(|(id, _)| id == item_id)
    }

    fn require(&self, item_id: &str) -> Result<usize, SurfaceError> {
        self.position(item_id).ok_or_else(|| SurfaceError::UnknownItem {
            item_id: item_id.to_string(),
        })
    }
}

/// Computes the updates that turn the `old` snapshot into `new`.
///
/// A consumer appends every `add` for an id it does not hold, so list order
/// is carried as follows.  The longest leading run of `new` whose ids already
/// appear in `old` in the same relative order is kept in place and patched.
/// Every other surviving entry is removed and re-added after it, in `new`
/// order.  The emitted sequence is:
///
/// 1. removes, in `old` order (vanished ids and entries that must move)
/// 2. updates for the kept run, in `new` order
/// 3. adds for the rest of `new`, in `new` order
///
/// Applied in order to a [`SurfaceList`] holding `old`, the result equals
/// `new` exactly.  Unchanged snapshots produce nothing.
pub fn diff_devices(
    old: &[ClientDevicesListItem],
    new: &[ClientDevicesListItem],
) -> Vec<SurfacesUpdate> {
    let old_position = |id: &str| old.iter().position(|o| o.id == id);

    let mut kept = 0;
    let mut last = None;
    for item in new {
        match old_position(&item.id) {
            Some(pos) if last < Some(pos) => {
                last = Some(pos);
                kept += 1;
            }
            _ => break,
        }
    }
    let (in_place, appended) = new.split_at(kept);

    let mut updates: Vec<SurfacesUpdate> = old
        .iter()
        .filter(|item| !in_place.iter().any(|n| n.id == item.id))
        .map(|item| SurfacesUpdate::Remove {
            item_id: item.id.clone(),
        })
        .collect();

    for item in in_place {
        // Every id in the kept run came from `old`.
        let Some(previous) = old.iter().find(|o| o.id == item.id) else {
            continue;
        };
        let patch = patch::diff(&device_json(previous), &device_json(item));
        if !patch.is_empty() {
            updates.push(SurfacesUpdate::Update {
                item_id: item.id.clone(),
                patch,
            });
        }
    }

    updates.extend(appended.iter().map(|item| SurfacesUpdate::Add {
        item_id: item.id.clone(),
        info: item.clone(),
    }));
    updates
}

fn device_json(item: &ClientDevicesListItem) -> Value {
    // Plain strings, numbers and bools: serialization cannot fail.
    serde_json::to_value(item).unwrap_or_default()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn surface(id: &str) -> ClientSurfaceItem {
        ClientSurfaceItem {
            id: id.to_string(),
            surface_type: "streamdeck".to_string(),
            integration_type: "elgato".to_string(),
            name: "Stream Deck XL".to_string(),
            config_fields: vec!["brightness".to_string()],
            is_connected: true,
            display_name: format!("Deck {id}"),
            location: None,
        }
    }

    fn device(id: &str, name: &str) -> ClientDevicesListItem {
        ClientDevicesListItem {
            id: id.to_string(),
            index: Some(0),
            display_name: name.to_string(),
            is_auto_group: false,
            surfaces: vec![surface(&format!("{id}:s0"))],
        }
    }

    #[test]
    fn test_add_update_remove_returns_to_empty_baseline() {
        // Arrange
        let updates: Vec<SurfacesUpdate> = serde_json::from_value(json!([
            {"type": "add", "itemId": "d1", "info": serde_json::to_value(device("d1", "Old")).unwrap()},
            {"type": "update", "itemId": "d1",
             "patch": [{"op": "replace", "path": "/displayName", "value": "New"}]},
            {"type": "remove", "itemId": "d1"},
        ]))
        .unwrap();
        let mut list = SurfaceList::new();

        // Act / Assert: intermediate state shows the patched name
        list.apply_all(&updates[..2]).unwrap();
        assert_eq!(list.get("d1").unwrap().display_name, "New");

        list.apply(&updates[2]).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_update_wire_shape() {
        let update = SurfacesUpdate::Update {
            item_id: "d1".to_string(),
            patch: vec![PatchOperation::Remove {
                path: "/index".to_string(),
            }],
        };

        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"type": "update", "itemId": "d1", "patch": [{"op": "remove", "path": "/index"}]})
        );
    }

    #[test]
    fn test_surface_item_wire_shape() {
        let wire = serde_json::to_value(surface("s")).unwrap();

        assert_eq!(wire["type"], json!("streamdeck"));
        assert_eq!(wire["integrationType"], json!("elgato"));
        assert_eq!(wire["isConnected"], json!(true));
        assert_eq!(wire["location"], Value::Null);
    }

    #[test]
    fn test_group_config_keeps_snake_case() {
        let config: SurfaceGroupConfig = serde_json::from_value(json!({
            "name": "Main", "last_page": 3, "startup_page": 1, "use_last_page": true
        }))
        .unwrap();

        assert_eq!(config.last_page, 3);
        assert!(config.use_last_page);
    }

    #[test]
    fn test_add_existing_id_replaces_in_place() {
        let mut list = SurfaceList::from_items([device("a", "A"), device("b", "B")]);

        list.apply(&SurfacesUpdate::Add {
            item_id: "a".to_string(),
            info: device("a", "A2"),
        })
        .unwrap();

        let names: Vec<&str> = list.items().map(|d| d.display_name.as_str()).collect();
        assert_eq!(names, ["A2", "B"]);
    }

    #[test]
    fn test_remove_unknown_id_is_an_error() {
        let mut list = SurfaceList::new();

        let err = list
            .apply(&SurfacesUpdate::Remove {
                item_id: "ghost".to_string(),
            })
            .unwrap_err();

        assert_eq!(
            err,
            SurfaceError::UnknownItem {
                item_id: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_failed_patch_leaves_entry_unchanged() {
        let mut list = SurfaceList::from_items([device("d1", "Old")]);
        let before = list.clone();

        let err = list
            .apply(&SurfacesUpdate::Update {
                item_id: "d1".to_string(),
                patch: vec![
                    PatchOperation::Replace {
                        path: "/displayName".to_string(),
                        value: json!("New"),
                    },
                    PatchOperation::Remove {
                        path: "/surfaces/5".to_string(),
                    },
                ],
            })
            .unwrap_err();

        assert!(matches!(err, SurfaceError::Patch { .. }));
        assert_eq!(list, before);
    }

    #[test]
    fn test_patch_producing_invalid_device_is_rejected() {
        let mut list = SurfaceList::from_items([device("d1", "Old")]);

        let err = list
            .apply(&SurfacesUpdate::Update {
                item_id: "d1".to_string(),
                patch: vec![PatchOperation::Replace {
                    path: "/isAutoGroup".to_string(),
                    value: json!("yes"),
                }],
            })
            .unwrap_err();

        assert!(matches!(err, SurfaceError::InvalidShape { .. }));
        assert!(!list.get("d1").unwrap().is_auto_group);
    }

    fn kinds(updates: &[SurfacesUpdate]) -> Vec<(&str, &str)> {
        updates
            .iter()
            .map(|u| {
                let kind = match u {
                    SurfacesUpdate::Add { .. } => "add",
                    SurfacesUpdate::Remove { .. } => "remove",
                    SurfacesUpdate::Update { .. } => "update",
                };
                (kind, u.item_id())
            })
            .collect()
    }

    fn ids(list: &SurfaceList) -> Vec<&str> {
        list.items().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_diff_devices_orders_removes_then_updates_then_adds() {
        // Arrange
        let old = vec![device("a", "A"), device("b", "B")];
        let mut renamed = device("b", "B");
        renamed.display_name = "Bee".to_string();
        let new = vec![renamed, device("c", "C")];

        // Act
        let updates = diff_devices(&old, &new);

        // Assert
        assert_eq!(
            kinds(&updates),
            [("remove", "a"), ("update", "b"), ("add", "c")]
        );
    }

    #[test]
    fn test_diff_devices_insert_in_the_middle_keeps_order() {
        // Arrange
        let old = vec![device("a", "A"), device("c", "C")];
        let new = vec![device("a", "A"), device("b", "B"), device("c", "C")];
        let mut mirror = SurfaceList::from_items(old.clone());

        // Act
        let updates = diff_devices(&old, &new);
        mirror.apply_all(&updates).unwrap();

        // Assert: "c" moves behind the new entry
        assert_eq!(ids(&mirror), ["a", "b", "c"]);
        assert_eq!(mirror.to_vec(), new);
        assert_eq!(
            kinds(&updates),
            [("remove", "c"), ("add", "b"), ("add", "c")]
        );
    }

    #[test]
    fn test_diff_devices_reorder_is_not_lost() {
        // Arrange
        let old = vec![device("a", "A"), device("b", "B")];
        let new = vec![device("b", "B"), device("a", "A")];
        let mut mirror = SurfaceList::from_items(old.clone());

        // Act
        let updates = diff_devices(&old, &new);
        mirror.apply_all(&updates).unwrap();

        // Assert
        assert_eq!(kinds(&updates), [("remove", "a"), ("add", "a")]);
        assert_eq!(ids(&mirror), ["b", "a"]);
    }

    #[test]
    fn test_diff_devices_new_entry_first_moves_everything_behind_it() {
        let old = vec![device("a", "A"), device("b", "B")];
        let mut b = device("b", "B");
        b.display_name = "Bee".to_string();
        let new = vec![device("z", "Z"), device("a", "A"), b];
        let mut mirror = SurfaceList::from_items(old.clone());

        mirror.apply_all(&diff_devices(&old, &new)).unwrap();

        assert_eq!(mirror.to_vec(), new);
    }

    #[test]
    fn test_diff_devices_replayed_reaches_new_snapshot() {
        let old = vec![device("a", "A"), device("b", "B")];
        let mut b = device("b", "B");
        b.index = None;
        b.surfaces.push(surface("b:s1"));
        b.surfaces[0].is_connected = false;
        let new = vec![b, device("c", "C")];

        let mut list = SurfaceList::from_items(old.clone());
        list.apply_all(&diff_devices(&old, &new)).unwrap();

        assert_eq!(list.to_vec(), new);
    }

    #[test]
    fn test_unchanged_snapshot_produces_no_updates() {
        let snapshot = vec![device("a", "A")];

        assert!(diff_devices(&snapshot, &snapshot).is_empty());
    }
}
