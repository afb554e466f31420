//! `crawl_client`
//!
//! Client-side presentation core:
//! - Connection management with automatic reconnect and typed events
//! - Position smoothing of authoritative snapshot positions
//! - Room transition slide and screen shake offsets
//! - Input edge filtering
//! - Presentation wiring for an external renderer

pub mod client;
pub mod input;
pub mod interp;
pub mod link;
pub mod presenter;
pub mod transition;

pub use client::{ConnectionManager, LinkState};
pub use interp::PositionSmoother;
pub use link::{Connector, TcpConnector};
pub use presenter::Presentation;
pub use transition::TransitionController;
