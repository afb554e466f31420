//! Demo world.
//!
//! Stands in for the real game simulation so clients have a live snapshot
//! stream: the player circles the room, and every few seconds the party
//! moves to the neighbouring room, which rearranges the other entities.

use crawl_shared::{
    math::{RoomCoords, Vec2},
    snapshot::{
        Components, Currency, EntityId, EntityRecord, FrameInfo, Health, RoomInfo, StateSnapshot,
        UiSummary,
    },
};
use serde_json::{json, Map, Value};

/// Seconds spent in each room.
pub const ROOM_PERIOD_SECS: f32 = 8.0;

const ROOM_WIDTH: f32 = 60.0;
const ROOM_HEIGHT: f32 = 20.0;

const PLAYER: EntityId = EntityId(1);
const CHASER: EntityId = EntityId(2);
const COIN: EntityId = EntityId(3);
const DOOR: EntityId = EntityId(10);

/// Deterministic stand-in simulation for one session.
#[derive(Debug, Clone)]
pub struct DemoWorld {
    tick: u64,
    elapsed: f32,
    room_timer: f32,
    room: RoomCoords,
    coins: u32,
}

impl Default for DemoWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoWorld {
    pub fn new() -> Self {
        Self {
            tick: 0,
            elapsed: 0.0,
            room_timer: 0.0,
            room: RoomCoords::new(0, 0),
            coins: 0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn room(&self) -> RoomCoords {
        self.room
    }

    /// Advances the world by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.tick += 1;
        self.elapsed += dt;
        self.room_timer += dt;
        while self.room_timer >= ROOM_PERIOD_SECS {
            self.room_timer -= ROOM_PERIOD_SECS;
            // Shuttle between two rooms side by side.
            let dx = if self.room.x == 0 { 1 } else { -1 };
            self.room = RoomCoords::new(self.room.x + dx, self.room.y);
            self.coins += 1;
        }
    }

    fn player_position(&self) -> Vec2 {
        let t = self.elapsed;
        Vec2::new(
            ROOM_WIDTH / 2.0 + t.cos() * 10.0,
            ROOM_HEIGHT / 2.0 + t.sin() * 5.0,
        )
    }

    fn even_room(&self) -> bool {
        (self.room.x + self.room.y) % 2 == 0
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let player = entity(
            PLAYER,
            "player",
            self.player_position(),
            [
                ("sprite", json!({"char": "@", "color": "#00ff00"})),
                ("health", json!({"current": 3, "max": 6})),
            ],
        );

        let chaser_pos = if self.even_room() {
            Vec2::new(45.0, 8.0)
        } else {
            Vec2::new(12.0, 15.0)
        };
        let chaser = entity(
            CHASER,
            "enemy_chaser",
            chaser_pos,
            [
                ("sprite", json!({"char": "C", "color": "#ff0000"})),
                ("health", json!({"current": 2, "max": 3})),
            ],
        );

        let (door_pos, door_dir, leads_to) = if self.room.x == 0 {
            (Vec2::new(59.0, 10.0), "east", [self.room.x + 1, self.room.y])
        } else {
            (Vec2::new(0.0, 10.0), "west", [self.room.x - 1, self.room.y])
        };
        let door = entity(
            DOOR,
            "door",
            door_pos,
            [(
                "door",
                json!({"direction": door_dir, "locked": false, "leads_to": leads_to}),
            )],
        );

        let mut entities = vec![player.clone(), chaser];
        if self.even_room() {
            entities.push(entity(
                COIN,
                "coin",
                Vec2::new(20.0, 5.0),
                [("sprite", json!({"char": "$", "color": "#ffff00"}))],
            ));
        }
        entities.push(door.clone());

        StateSnapshot {
            frame: FrameInfo {
                width: ROOM_WIDTH,
                height: ROOM_HEIGHT,
            },
            entities,
            player: Some(player),
            ui: UiSummary {
                currency: Currency {
                    coins: self.coins,
                    bombs: 1,
                },
                health: Health {
                    current: 3.0,
                    max: 6.0,
                },
                items: Vec::new(),
            },
            room: RoomInfo {
                position: Some([self.room.x, self.room.y]),
                doors: vec![door],
            },
        }
    }
}

fn entity<const N: usize>(
    id: EntityId,
    kind: &str,
    position: Vec2,
    extra: [(&str, Value); N],
) -> EntityRecord {
    let other: Map<String, Value> = extra
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    EntityRecord {
        id,
        kind: kind.to_string(),
        components: Components {
            position: Some(position),
            other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_changes_on_period() {
        let mut w = DemoWorld::new();
        for _ in 0..159 {
            w.step(0.05);
        }
        assert_eq!(w.room(), RoomCoords::new(0, 0));
        w.step(0.06);
        assert_eq!(w.room(), RoomCoords::new(1, 0));
    }

    #[test]
    fn snapshot_round_trips_through_the_decoder() {
        let w = DemoWorld::new();
        let text = serde_json::to_string(&w.snapshot()).unwrap();
        match crawl_shared::net::decode_inbound(&text).unwrap() {
            crawl_shared::net::Inbound::Snapshot(s) => {
                assert_eq!(s.room_coords(), Some(RoomCoords::new(0, 0)));
                assert!(s.find(COIN).is_some());
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn odd_rooms_move_the_chaser_and_drop_the_coin() {
        let mut w = DemoWorld::new();
        w.step(ROOM_PERIOD_SECS);
        let snap = w.snapshot();
        assert!(snap.find(COIN).is_none());
        assert_eq!(
            snap.find(CHASER).and_then(|e| e.position()),
            Some(Vec2::new(12.0, 15.0))
        );
        assert_eq!(snap.ui.currency.coins, 1);
    }
}
