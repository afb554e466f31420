//! `crawl_server`
//!
//! Development server:
//! - `connect` handshake for players and spectators
//! - Session registry with resume by id
//! - Fixed tick loop publishing demo snapshots
//!
//! Transport is the length-prefixed text framing from `crawl_shared::net`.

pub mod demo;
pub mod server;
pub mod session;

pub use server::{bind_ephemeral, GameServer};
pub use session::SessionManager;
