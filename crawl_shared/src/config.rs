//! Configuration system.
//!
//! Loads client/server configuration from JSON strings (file IO left to app).
//! Presentation tuning values are fixed constants; their structs exist so the
//! numbers live in one place.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::Role;

/// Exponential smoothing rate, per second.
pub const SMOOTHING_RATE: f32 = 15.0;
/// Distance beyond which an entity jumps straight to its target.
pub const SNAP_DISTANCE: f32 = 160.0;
/// Duration of each half of a room transition, in seconds.
pub const TRANSITION_PHASE_SECS: f32 = 0.15;
pub const DEFAULT_SHAKE_SECS: f32 = 0.3;
/// Peak shake displacement in pixels.
pub const MAX_SHAKE_OFFSET: f32 = 8.0;
/// Pixels per tile.
pub const TILE_SIZE: f32 = 16.0;
/// Room size in tiles.
pub const ROOM_TILES_WIDE: f32 = 60.0;
pub const ROOM_TILES_HIGH: f32 = 20.0;

pub const RECONNECT_BASE_DELAY_MS: u64 = 2000;
pub const RECONNECT_MULTIPLIER: f64 = 1.5;
pub const RECONNECT_CAP_DELAY_MS: u64 = 10_000;
pub const RECONNECT_MAX_ATTEMPTS: u32 = 5;

/// Position smoother tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingTuning {
    pub rate: f32,
    pub snap_distance: f32,
}

impl Default for SmoothingTuning {
    fn default() -> Self {
        Self {
            rate: SMOOTHING_RATE,
            snap_distance: SNAP_DISTANCE,
        }
    }
}

/// Room transition and shake tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionTuning {
    pub phase_secs: f32,
    /// Room width in pixels.
    pub room_width: f32,
    /// Room height in pixels.
    pub room_height: f32,
    pub default_shake_secs: f32,
    pub max_shake_offset: f32,
}

impl Default for TransitionTuning {
    fn default() -> Self {
        Self {
            phase_secs: TRANSITION_PHASE_SECS,
            room_width: ROOM_TILES_WIDE * TILE_SIZE,
            room_height: ROOM_TILES_HIGH * TILE_SIZE,
            default_shake_secs: DEFAULT_SHAKE_SECS,
            max_shake_offset: MAX_SHAKE_OFFSET,
        }
    }
}

/// Backoff schedule for automatic reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub cap_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: RECONNECT_BASE_DELAY_MS,
            multiplier: RECONNECT_MULTIPLIER,
            cap_delay_ms: RECONNECT_CAP_DELAY_MS,
            max_attempts: RECONNECT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero-based):
    /// `min(base * multiplier^attempt, cap)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ms = self.base_delay_ms as f64 * self.multiplier.powi(exp);
        let ms = ms.min(self.cap_delay_ms as f64);
        Duration::from_millis(ms.round() as u64)
    }
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, e.g. `127.0.0.1:8765`.
    pub server_addr: String,
    pub role: Role,
    /// Session to resume or spectate.
    pub session_id: Option<String>,
    /// Presentation frame rate.
    pub render_hz: u32,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8765".to_string(),
            role: Role::Player,
            session_id: None,
            render_hz: 60,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.render_hz.max(1) as f32)
    }
}

/// Development server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub server_addr: String,
    /// Snapshot rate.
    pub tick_hz: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8765".to_string(),
            tick_hz: 20,
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_hz.max(1) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (0..5).map(|a| policy.delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![2000, 3000, 4500, 6750, 10000]);
        assert_eq!(policy.delay_for(40).as_millis(), 10000);
    }

    #[test]
    fn room_is_sixty_by_twenty_tiles() {
        let t = TransitionTuning::default();
        assert_eq!(t.room_width, 960.0);
        assert_eq!(t.room_height, 320.0);
    }

    #[test]
    fn client_config_fills_defaults() {
        let cfg = ClientConfig::from_json_str(
            r#"{"server_addr": "10.0.0.2:9000", "role": "spectator", "session_id": "ab12cd34"}"#,
        )
        .unwrap();
        assert_eq!(cfg.server_addr, "10.0.0.2:9000");
        assert_eq!(cfg.role, Role::Spectator);
        assert_eq!(cfg.session_id.as_deref(), Some("ab12cd34"));
        assert_eq!(cfg.render_hz, 60);
        assert_eq!(cfg.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn server_config_parses() {
        let cfg = ServerConfig::from_json_str(r#"{"tick_hz": 30}"#).unwrap();
        assert_eq!(cfg.tick_hz, 30);
        assert_eq!(cfg.server_addr, "127.0.0.1:8765");
    }
}
