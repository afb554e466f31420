//! World snapshot model.
//!
//! A snapshot is the server's complete description of visible world state for
//! one simulation tick. The presentation core only reads entity ids,
//! positions and room coordinates; every other field is carried through for
//! the renderer and HUD. Only a bad entity id or position fails a decode.
//! HUD and room fields of the wrong shape fall back to their defaults.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::math::{RoomCoords, Vec2};

/// Server-assigned entity id, stable while the entity stays in view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Deserializes `T`, using its default for `null` or a mismatched shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Deserializes `T`, using its default for `null`. Other errors still fail.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Room size in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FrameInfo {
    pub width: f32,
    pub height: f32,
}

/// Component map of one entity.
///
/// Only `position` is interpreted here; other component kinds (sprite,
/// health, velocity, collider, door, ...) are kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Components {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec2>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// One entity in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub components: Components,
}

impl EntityRecord {
    pub fn position(&self) -> Option<Vec2> {
        self.components.position
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Currency {
    pub coins: u32,
    pub bombs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

/// HUD summary fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UiSummary {
    #[serde(deserialize_with = "lenient")]
    pub currency: Currency,
    #[serde(deserialize_with = "lenient")]
    pub health: Health,
    /// Collected item records, passed through untouched.
    #[serde(deserialize_with = "lenient")]
    pub items: Vec<Value>,
}

/// Current room and its doors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RoomInfo {
    #[serde(deserialize_with = "lenient")]
    pub position: Option<[i32; 2]>,
    #[serde(deserialize_with = "lenient")]
    pub doors: Vec<EntityRecord>,
}

/// Full state snapshot pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(deserialize_with = "lenient")]
    pub frame: FrameInfo,
    pub entities: Vec<EntityRecord>,
    #[serde(default, deserialize_with = "lenient")]
    pub player: Option<EntityRecord>,
    #[serde(default, deserialize_with = "lenient")]
    pub ui: UiSummary,
    #[serde(default, deserialize_with = "lenient")]
    pub room: RoomInfo,
}

impl StateSnapshot {
    /// Room coordinates, when the server reports them.
    pub fn room_coords(&self) -> Option<RoomCoords> {
        self.room.position.map(RoomCoords::from)
    }

    /// Entities that carry a position component.
    pub fn positioned(&self) -> impl Iterator<Item = (EntityId, Vec2)> + '_ {
        self.entities
            .iter()
            .filter_map(|e| e.position().map(|p| (e.id, p)))
    }

    pub fn find(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.iter().find(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const EXPORTED: &str = r##"{
        "frame": {"width": 60, "height": 20},
        "entities": [
            {"id": 1, "type": "player", "components": {
                "position": {"x": 30.5, "y": 10},
                "sprite": {"char": "@", "color": "#00ff00"},
                "health": {"current": 3, "max": 3}}},
            {"id": 7, "type": "door", "components": {
                "door": {"direction": "north", "locked": false, "leads_to": [2, 1]}}}
        ],
        "player": null,
        "ui": {"currency": {"coins": 4, "bombs": 1}, "health": {"current": 3, "max": 6}, "items": ["onion"]},
        "room": {"position": [2, 2], "doors": []}
    }"##;

    #[test]
    fn parses_exported_state() {
        let snap: StateSnapshot = serde_json::from_str(EXPORTED).unwrap();
        assert_eq!(snap.frame.width, 60.0);
        assert_eq!(snap.entities.len(), 2);
        assert_eq!(snap.room_coords(), Some(RoomCoords::new(2, 2)));
        assert_eq!(snap.ui.currency.coins, 4);
        assert_eq!(snap.ui.items, vec![json!("onion")]);

        let player = snap.find(EntityId(1)).unwrap();
        assert_eq!(player.kind, "player");
        assert_eq!(player.position(), Some(Vec2::new(30.5, 10.0)));
        assert!(player.components.other.contains_key("sprite"));
    }

    #[test]
    fn positioned_skips_entities_without_position() {
        let snap: StateSnapshot = serde_json::from_str(EXPORTED).unwrap();
        let ids: Vec<EntityId> = snap.positioned().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![EntityId(1)]);
    }

    #[test]
    fn optional_sections_default() {
        let snap: StateSnapshot =
            serde_json::from_str(r#"{"frame": {"width": 1, "height": 1}, "entities": []}"#).unwrap();
        assert_eq!(snap.room_coords(), None);
        assert_eq!(snap.ui, UiSummary::default());
        assert!(snap.player.is_none());
    }

    fn with(overrides: Value) -> Result<StateSnapshot, serde_json::Error> {
        let mut base = json!({
            "frame": {"width": 60, "height": 20},
            "entities": [{"id": 1, "type": "player", "components": {"position": {"x": 1, "y": 2}}}],
        });
        if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), overrides) {
            base.extend(extra);
        }
        serde_json::from_value(base)
    }

    #[test]
    fn item_records_pass_through() {
        let snap = with(json!({"ui": {"items": [{"name": "onion", "effect": "tears_up"}]}})).unwrap();
        assert_eq!(snap.ui.items, vec![json!({"name": "onion", "effect": "tears_up"})]);
    }

    #[test]
    fn odd_hud_and_room_shapes_fall_back_to_defaults() {
        let snap = with(json!({"ui": null})).unwrap();
        assert_eq!(snap.ui, UiSummary::default());

        let snap = with(json!({"ui": {"currency": {"coins": "many"}, "health": {"current": 2, "max": 4}}})).unwrap();
        assert_eq!(snap.ui.currency, Currency::default());
        assert_eq!(snap.ui.health, Health { current: 2.0, max: 4.0 });

        let snap = with(json!({"room": {"position": [3, 1], "doors": null}})).unwrap();
        assert_eq!(snap.room_coords(), Some(RoomCoords::new(3, 1)));
        assert!(snap.room.doors.is_empty());

        let snap = with(json!({"room": {"position": "north"}})).unwrap();
        assert_eq!(snap.room_coords(), None);

        let snap = with(json!({"frame": {}})).unwrap();
        assert_eq!(snap.frame, FrameInfo::default());
        assert_eq!(snap.entities.len(), 1);
    }

    #[test]
    fn null_components_and_odd_kind_are_tolerated() {
        let snap = with(json!({"entities": [{"id": 4, "type": 9, "components": null}]})).unwrap();
        assert_eq!(snap.entities[0].kind, "");
        assert_eq!(snap.entities[0].position(), None);
    }

    #[test]
    fn bad_id_or_position_still_fails() {
        assert!(with(json!({"entities": [{"id": "one"}]})).is_err());
        assert!(with(json!({"entities": [{"id": 1, "components": {"position": [1, 2]}}]})).is_err());
    }
}
