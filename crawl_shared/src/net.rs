//! Networking primitives.
//!
//! - Client and server message types with their JSON shapes.
//! - A centralized decode step that turns an inbound text frame into one of
//!   the known message kinds, in a fixed priority order.
//! - Length-prefixed text framing over any async byte stream.

use anyhow::{bail, Context};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::snapshot::StateSnapshot;

/// Largest frame accepted by [`FrameReader`].
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Connection role. Spectators are read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Player,
    Spectator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Player => "player",
            Role::Spectator => "spectator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "player" => Ok(Role::Player),
            "spectator" => Ok(Role::Spectator),
            other => bail!("unknown role: {other}"),
        }
    }
}

/// Key transition carried by an input message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Press,
    Release,
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Handshake; `session_id` resumes or spectates an existing session.
    Connect {
        role: Role,
        #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Input {
        key: String,
        action: KeyAction,
    },
}

/// Session-established payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub role: Role,
    pub status: String,
}

/// Server -> client messages that are not snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    SessionInfo(SessionInfo),
    Error { message: String },
}

/// Stand-in text for an `error` frame that carries no message.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    SessionInfo(SessionInfo),
    Error { message: String },
    Snapshot(Box<StateSnapshot>),
    /// Well-formed JSON of a shape this client does not know.
    Ignored,
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid message: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes one inbound text frame.
///
/// Priority: `session_info`, then `error`, then anything carrying both
/// `frame` and `entities` as a snapshot, else [`Inbound::Ignored`].
pub fn decode_inbound(text: &str) -> Result<Inbound, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::InvalidJson)?;
    let Value::Object(ref obj) = value else {
        return Ok(Inbound::Ignored);
    };

    match obj.get("type").and_then(Value::as_str) {
        Some("session_info") => {
            return serde_json::from_value::<SessionInfo>(value)
                .map(Inbound::SessionInfo)
                .map_err(|source| DecodeError::Malformed {
                    kind: "session_info",
                    source,
                });
        }
        Some("error") => {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or(UNKNOWN_ERROR)
                .to_string();
            return Ok(Inbound::Error { message });
        }
        _ => {}
    }

    if obj.contains_key("frame") && obj.contains_key("entities") {
        return serde_json::from_value::<StateSnapshot>(value)
            .map(|s| Inbound::Snapshot(Box::new(s)))
            .map_err(|source| DecodeError::Malformed {
                kind: "snapshot",
                source,
            });
    }

    Ok(Inbound::Ignored)
}

/// Decodes a client message (server side).
pub fn decode_client(text: &str) -> anyhow::Result<ClientMsg> {
    serde_json::from_str(text).context("decode client msg")
}

pub fn encode<T: Serialize>(msg: &T) -> anyhow::Result<String> {
    serde_json::to_string(msg).context("serialize msg")
}

/// Reads length-prefixed UTF-8 text frames.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns `Ok(None)` on a clean EOF at a frame boundary.
    pub async fn recv(&mut self) -> anyhow::Result<Option<String>> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).context("read frame len"),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            bail!("frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}");
        }
        let mut payload = vec![0u8; len];
        self.inner
            .read_exact(&mut payload)
            .await
            .context("read frame payload")?;
        String::from_utf8(payload).context("frame is not utf-8").map(Some)
    }
}

/// Writes length-prefixed UTF-8 text frames.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, text: &str) -> anyhow::Result<()> {
        if text.len() > MAX_FRAME_LEN {
            bail!("frame of {} bytes exceeds limit of {MAX_FRAME_LEN}", text.len());
        }
        let mut buf = BytesMut::with_capacity(4 + text.len());
        buf.put_u32(text.len() as u32);
        buf.extend_from_slice(text.as_bytes());
        self.inner.write_all(&buf).await.context("write frame")?;
        self.inner.flush().await.context("flush frame")?;
        Ok(())
    }

    pub async fn send_msg<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let text = encode(msg)?;
        self.send(&text).await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.context("shutdown writer")
    }
}
