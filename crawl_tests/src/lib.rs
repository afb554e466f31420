//! Shared helpers for the socket-level integration tests.

use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use crawl_client::{ConnectionManager, Connector};
use crawl_server::server::{bind_ephemeral, SharedSessions};
use crawl_shared::{config::ReconnectPolicy, event::ClientEvent};
use tokio::task::JoinHandle;

/// How long any single wait in a test may take.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A dev server running in the background on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub sessions: SharedSessions,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn spawn(tick_hz: u32) -> anyhow::Result<Self> {
        let (server, cfg) = bind_ephemeral(tick_hz).await?;
        let sessions = server.sessions();
        let addr = cfg.server_addr.parse().context("parse bound addr")?;
        let handle = tokio::spawn(server.run());
        Ok(Self {
            addr,
            sessions,
            handle,
        })
    }

    /// Inputs recorded for a session so far.
    pub fn inputs(&self, session_id: &str) -> Option<u64> {
        self.sessions
            .lock()
            .ok()?
            .get(session_id)
            .map(|s| s.inputs())
    }

    /// Drops every connection of a session, keeping the session.
    pub fn kick(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .map(|mut s| s.kick(session_id))
            .unwrap_or(false)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Quick reconnects so recovery tests finish in well under a second.
pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay_ms: 50,
        multiplier: 1.5,
        cap_delay_ms: 200,
        max_attempts: 5,
    }
}

/// Waits for the next event, failing on timeout or when the manager goes quiet.
pub async fn next_event<C: Connector>(conn: &mut ConnectionManager<C>) -> anyhow::Result<ClientEvent> {
    match tokio::time::timeout(EVENT_TIMEOUT, conn.next_event()).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => bail!("connection manager went quiet in state {:?}", conn.state()),
        Err(_) => bail!("timed out waiting for an event"),
    }
}

/// Skips events until one satisfies `pred`.
pub async fn wait_for<C, F>(conn: &mut ConnectionManager<C>, mut pred: F) -> anyhow::Result<ClientEvent>
where
    C: Connector,
    F: FnMut(&ClientEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    loop {
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out waiting for a matching event");
        }
        let event = next_event(conn).await?;
        if pred(&event) {
            return Ok(event);
        }
    }
}

/// Polls `check` every few milliseconds until it holds.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            bail!("condition never held");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
