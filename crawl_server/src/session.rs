//! Session registry.
//!
//! A session is one demo world plus the feed its snapshots go out on. A
//! player connection creates a session (or resumes one it names); spectator
//! connections attach to an existing one by id.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use crawl_shared::{
    math::RoomCoords,
    net::{KeyAction, Role},
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::demo::DemoWorld;

/// Snapshots buffered per subscriber before it starts lagging.
const FEED_CAPACITY: usize = 16;

/// Serialized snapshot shared by every subscriber of a session.
pub type SnapshotText = Arc<str>;

/// Why a connection could not attach to a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("session not found")]
    UnknownSession(String),
    #[error("spectators must name a session")]
    MissingSession,
}

/// Result of a successful join.
#[derive(Debug)]
pub struct Joined {
    pub session_id: String,
    /// `true` when an existing player session was picked up again.
    pub resumed: bool,
    pub feed: broadcast::Receiver<SnapshotText>,
}

/// One running session.
#[derive(Debug)]
pub struct GameSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    world: DemoWorld,
    feed: broadcast::Sender<SnapshotText>,
    players: u32,
    spectators: u32,
    inputs: u64,
    held: BTreeSet<String>,
}

impl GameSession {
    fn new(id: String) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            id,
            created_at: Utc::now(),
            world: DemoWorld::new(),
            feed,
            players: 0,
            spectators: 0,
            inputs: 0,
            held: BTreeSet::new(),
        }
    }

    pub fn players(&self) -> u32 {
        self.players
    }

    pub fn spectators(&self) -> u32 {
        self.spectators
    }

    pub fn inputs(&self) -> u64 {
        self.inputs
    }

    pub fn held_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.held.iter().map(String::as_str)
    }

    pub fn room(&self) -> RoomCoords {
        self.world.room()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            tick: self.world.tick(),
            room: self.world.room(),
            players: self.players,
            spectators: self.spectators,
            inputs: self.inputs,
        }
    }
}

/// Status line data for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub tick: u64,
    pub room: RoomCoords,
    pub players: u32,
    pub spectators: u32,
    pub inputs: u64,
}

/// All sessions known to the server.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<String, GameSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty session under a fresh 8-hex-digit id.
    pub fn create(&mut self) -> &mut GameSession {
        let id = loop {
            let candidate = format!("{:08x}", rand::random::<u32>());
            if !self.sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        info!(session = %id, "Session created");
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| GameSession::new(id))
    }

    pub fn get(&self, id: &str) -> Option<&GameSession> {
        self.sessions.get(id)
    }

    /// Ends a session. Its subscribers see their feed close.
    pub fn remove(&mut self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!(session = %id, "Session removed");
        }
        removed
    }

    /// Sorted by creation time, then id.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> =
            self.sessions.values().map(GameSession::summary).collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Attaches a connection.
    ///
    /// A player naming a known session resumes it; any other player gets a
    /// new session. A spectator must name a known session.
    pub fn join(&mut self, role: Role, requested: Option<&str>) -> Result<Joined, JoinError> {
        let known = requested.filter(|id| self.sessions.contains_key(*id));
        let (session, resumed) = match (role, known) {
            (_, Some(id)) => match self.sessions.get_mut(id) {
                Some(session) => (session, true),
                None => return Err(JoinError::UnknownSession(id.to_string())),
            },
            (Role::Player, None) => {
                if let Some(id) = requested {
                    debug!(session = %id, "Unknown session requested, starting a new one");
                }
                (self.create(), false)
            }
            (Role::Spectator, None) => {
                return Err(match requested {
                    Some(id) => JoinError::UnknownSession(id.to_string()),
                    None => JoinError::MissingSession,
                })
            }
        };

        match role {
            Role::Player => {
                if session.players > 0 {
                    warn!(session = %session.id, "Second player attached to session");
                }
                session.players += 1;
            }
            Role::Spectator => session.spectators += 1,
        }

        Ok(Joined {
            session_id: session.id.clone(),
            resumed,
            feed: session.feed.subscribe(),
        })
    }

    /// Detaches a connection. The session itself stays for later resumes.
    pub fn leave(&mut self, id: &str, role: Role) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        match role {
            Role::Player => {
                session.players = session.players.saturating_sub(1);
                if session.players == 0 {
                    session.held.clear();
                }
            }
            Role::Spectator => session.spectators = session.spectators.saturating_sub(1),
        }
    }

    /// Records a player's key edge.
    pub fn record_input(&mut self, id: &str, key: &str, action: KeyAction) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        session.inputs += 1;
        match action {
            KeyAction::Press => session.held.insert(key.to_string()),
            KeyAction::Release => session.held.remove(key),
        };
        debug!(session = %id, key = %key, ?action, "Input");
    }

    /// Drops every connection attached to a session but keeps the session.
    pub fn kick(&mut self, id: &str) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        // Replacing the sender closes every existing subscription.
        session.feed = broadcast::channel(FEED_CAPACITY).0;
        info!(session = %id, "Kicked all connections");
        true
    }

    /// Advances every session and publishes a snapshot to subscribers.
    ///
    /// Returns how many snapshots were published.
    pub fn step(&mut self, dt: f32) -> usize {
        let mut published = 0;
        for session in self.sessions.values_mut() {
            session.world.step(dt);
            if session.feed.receiver_count() == 0 {
                continue;
            }
            let text = match serde_json::to_string(&session.world.snapshot()) {
                Ok(text) => text,
                Err(e) => {
                    warn!(session = %session.id, error = %e, "Snapshot serialization failed");
                    continue;
                }
            };
            if session.feed.send(SnapshotText::from(text)).is_ok() {
                published += 1;
            }
        }
        published
    }
}
