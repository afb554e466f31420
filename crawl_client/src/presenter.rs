//! Presentation orchestration.
//!
//! Wires connection events into the smoother and the transition controller
//! and assembles what the renderer needs each frame. Snapshot positions are
//! in tiles; everything downstream of this module is in pixels.

use std::collections::HashMap;

use crawl_shared::{
    config::TILE_SIZE,
    event::{ClientEvent, LinkError},
    math::{RoomCoords, Vec2},
    net::SessionInfo,
    snapshot::{EntityId, StateSnapshot, UiSummary},
};
use tracing::debug;

use crate::{interp::PositionSmoother, transition::TransitionController};

/// One entity as the renderer should draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderEntity {
    pub id: EntityId,
    pub kind: String,
    /// Pixel position before the scene offset is applied.
    pub position: Vec2,
}

/// Everything the renderer reads for one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameView {
    /// Scene offset from room transition and shake.
    pub offset: Vec2,
    /// Sorted by id.
    pub entities: Vec<RenderEntity>,
}

/// Client-side presentation state.
#[derive(Debug, Default)]
pub struct Presentation {
    smoother: PositionSmoother,
    transitions: TransitionController,
    kinds: HashMap<EntityId, String>,
    room: Option<RoomCoords>,
    session: Option<SessionInfo>,
    ui: UiSummary,
    last_error: Option<LinkError>,
    connected: bool,
    snapshots: u64,
}

impl Presentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one connection event. Events must arrive in receipt order.
    pub fn apply_event(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::SessionEstablished(info) => {
                self.session = Some(info.clone());
                self.connected = true;
                self.last_error = None;
            }
            ClientEvent::Snapshot(snap) => self.apply_snapshot(snap),
            ClientEvent::Disconnected { .. } => {
                // Keep the last scene on screen while reconnecting.
                self.connected = false;
            }
            ClientEvent::Error(e) => self.last_error = Some(e.clone()),
        }
    }

    fn apply_snapshot(&mut self, snap: &StateSnapshot) {
        self.snapshots += 1;
        self.connected = true;

        if let Some(room) = snap.room_coords() {
            if let Some(prev) = self.room.replace(room) {
                if prev != room {
                    debug!(from = ?prev, to = ?room, "Room changed");
                    self.transitions.start_transition(prev, room);
                }
            }
        }

        self.kinds.clear();
        for entity in &snap.entities {
            let Some(pos) = entity.position() else {
                continue;
            };
            let px = pos * TILE_SIZE;
            self.smoother.set_target(entity.id, px.x, px.y);
            self.kinds.insert(entity.id, entity.kind.clone());
        }
        let kinds = &self.kinds;
        self.smoother.retain(|id| kinds.contains_key(&id));

        self.ui = snap.ui.clone();
    }

    /// Advances smoothing and scene effects by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.smoother.update(dt);
        self.transitions.update(dt);
    }

    /// Starts a screen shake, e.g. on damage.
    pub fn shake(&mut self, intensity: f32, duration: Option<f32>) {
        self.transitions.start_shake(intensity, duration);
    }

    /// Renderer input at `time` seconds.
    pub fn frame(&self, time: f64) -> FrameView {
        let mut entities: Vec<RenderEntity> = self
            .smoother
            .iter()
            .map(|(id, p)| RenderEntity {
                id,
                kind: self.kinds.get(&id).cloned().unwrap_or_default(),
                position: p.current,
            })
            .collect();
        entities.sort_by_key(|e| e.id);
        FrameView {
            offset: self.transitions.offset(time),
            entities,
        }
    }

    pub fn smoother(&self) -> &PositionSmoother {
        &self.smoother
    }

    pub fn transitions(&self) -> &TransitionController {
        &self.transitions
    }

    pub fn room(&self) -> Option<RoomCoords> {
        self.room
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    pub fn ui(&self) -> &UiSummary {
        &self.ui
    }

    pub fn last_error(&self) -> Option<&LinkError> {
        self.last_error.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn snapshots_seen(&self) -> u64 {
        self.snapshots
    }
}
