//! Typed client events.
//!
//! The connection manager never returns errors to its caller; everything it
//! observes is reported as one of these events, in receipt order.

use crate::{net::SessionInfo, snapshot::StateSnapshot};

/// Error notice carried by [`ClientEvent::Error`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// An inbound frame could not be decoded. The link stays up.
    #[error("invalid message")]
    InvalidMessage { detail: String },
    /// The server reported an application error. The link stays up.
    #[error("server error: {0}")]
    Server(String),
    /// Automatic recovery gave up.
    #[error("connection lost after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl LinkError {
    /// Fatal notices end the session; no automatic retry follows.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::ReconnectExhausted { .. })
    }
}

/// Event raised by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SessionEstablished(SessionInfo),
    Snapshot(Box<StateSnapshot>),
    Disconnected { reason: String },
    Error(LinkError),
}

impl ClientEvent {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientEvent::Error(e) if e.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exhaustion_is_fatal() {
        assert!(ClientEvent::Error(LinkError::ReconnectExhausted { attempts: 5 }).is_fatal());
        assert!(!ClientEvent::Error(LinkError::Server("nope".into())).is_fatal());
        assert!(!ClientEvent::Disconnected {
            reason: "closed".into()
        }
        .is_fatal());
    }

    #[test]
    fn invalid_message_text_is_fixed() {
        let e = LinkError::InvalidMessage {
            detail: "expected value at line 1".into(),
        };
        assert_eq!(e.to_string(), "invalid message");
    }
}
