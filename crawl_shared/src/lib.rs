//! `crawl_shared`
//!
//! Shared libraries used by both client and dev server.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - One place for the wire protocol and its decode rules.
//! - No `unsafe`.

pub mod config;
pub mod event;
pub mod math;
pub mod net;
pub mod snapshot;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::snapshot::*;
}
