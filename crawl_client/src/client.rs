//! Connection manager.
//!
//! Owns the single link to the server, turns inbound frames into typed
//! [`ClientEvent`]s and re-establishes the link after failures.
//!
//! ```text
//!            connect()              opened            link failure, attempts < max
//!   Idle ─────────────▶ Connecting ─────────▶ Connected ─────────────────────▶ AwaitingRetry
//!    ▲                      ▲   │ open failed                                       │
//!    │ disconnect()         │   └──────────────────────────────▶ AwaitingRetry      │
//!    │                      └─────────────── retry timer fires ─────────────────────┘
//!    │
//!    └──────────── any state              link failure, attempts ≥ max
//!                                         Exhausted
//! ```
//!
//! The manager is driven cooperatively: the owner calls
//! [`ConnectionManager::next_event`] from its loop. The retry timer and the
//! in-flight open are both owned by the manager and survive a cancelled
//! `next_event`; every `connect`/`disconnect` drops them, so there is never
//! more than one link or attempt.

use std::{collections::VecDeque, future::Future, pin::Pin, sync::Arc, time::Duration};

use crawl_shared::{
    config::ReconnectPolicy,
    event::{ClientEvent, LinkError},
    net::{decode_inbound, ClientMsg, Inbound, KeyAction, Role},
};
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::link::{Connector, Link, LinkFrame};

/// Recovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Never connected, or explicitly disconnected.
    Idle,
    /// Opening a link and sending the handshake.
    Connecting,
    Connected,
    /// Link lost; a reconnect is scheduled.
    AwaitingRetry,
    /// Gave up reconnecting.
    Exhausted,
}

/// Connect plus handshake, resumable across cancelled polls.
type OpenFuture<S> = Pin<Box<dyn Future<Output = anyhow::Result<Link<S>>> + Send>>;

struct PendingRetry {
    delay: Duration,
    timer: Pin<Box<Sleep>>,
}

/// Connection lifecycle manager.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    policy: ReconnectPolicy,
    role: Role,
    session_id: Option<String>,
    attempts: u32,
    state: LinkState,
    link: Option<Link<C::Stream>>,
    retry: Option<PendingRetry>,
    opening: Option<OpenFuture<C::Stream>>,
    pending: VecDeque<ClientEvent>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            connector: Arc::new(connector),
            policy,
            role: Role::Player,
            session_id: None,
            attempts: 0,
            state: LinkState::Idle,
            link: None,
            retry: None,
            opening: None,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Session this client will resume on reconnect.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Reconnect attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay of the currently scheduled reconnect.
    pub fn retry_delay(&self) -> Option<Duration> {
        self.retry.as_ref().map(|r| r.delay)
    }

    pub fn connector(&self) -> &C {
        self.connector.as_ref()
    }

    /// Opens a fresh link and sends the handshake.
    ///
    /// Any scheduled retry, in-flight open and existing link are dropped
    /// first, and the attempt budget starts over. A failure to open is
    /// reported like any other link failure. If this call is cancelled the
    /// open carries on from [`ConnectionManager::next_event`].
    pub async fn connect(&mut self, role: Role, session_id: Option<String>) {
        self.cancel_retry();
        self.opening = None;
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        self.pending.clear();
        self.attempts = 0;
        self.role = role;
        self.session_id = session_id;
        self.begin_open();
        self.finish_open().await;
    }

    /// Sends a key press or release. Spectators never send input.
    pub async fn send_input(&mut self, key: impl Into<String>, action: KeyAction) {
        if self.role == Role::Spectator {
            return;
        }
        let Some(link) = self.link.as_mut() else {
            debug!("Dropping input, no open link");
            return;
        };
        let msg = ClientMsg::Input {
            key: key.into(),
            action,
        };
        if let Err(e) = link.send_msg(&msg).await {
            warn!(error = %e, "Input send failed");
            self.link_failed(format!("{e:#}"));
        }
    }

    /// Closes the link and forgets the session. Idempotent.
    pub async fn disconnect(&mut self) {
        self.cancel_retry();
        if self.opening.take().is_some() {
            debug!("Abandoned in-flight open");
        }
        if let Some(mut link) = self.link.take() {
            link.close().await;
            info!("Disconnected");
        }
        self.pending.clear();
        self.attempts = 0;
        self.state = LinkState::Idle;
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once idle or exhausted with nothing left to report.
    /// Safe to cancel: inbound frames stay buffered, a pending retry keeps
    /// its deadline and an in-flight open is resumed by the next call.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.state {
                LinkState::Idle | LinkState::Exhausted => return None,
                LinkState::AwaitingRetry => {
                    if let Some(retry) = self.retry.as_mut() {
                        retry.timer.as_mut().await;
                    }
                    self.retry = None;
                    info!(attempt = self.attempts, "Reconnecting");
                    self.begin_open();
                }
                LinkState::Connecting => self.finish_open().await,
                LinkState::Connected => {
                    let frame = match self.link.as_mut() {
                        Some(link) => link.recv().await,
                        None => LinkFrame::Closed,
                    };
                    self.on_frame(frame);
                }
            }
        }
    }

    fn begin_open(&mut self) {
        let connector = Arc::clone(&self.connector);
        let hello = ClientMsg::Connect {
            role: self.role,
            session_id: self.session_id.clone(),
        };
        let opening: OpenFuture<C::Stream> = Box::pin(async move {
            let stream = connector.open().await?;
            let mut link = Link::spawn(stream);
            link.send_msg(&hello).await?;
            anyhow::Ok(link)
        });
        self.opening = Some(opening);
        self.state = LinkState::Connecting;
    }

    /// Drives the in-flight open to completion. Cancel-safe.
    async fn finish_open(&mut self) {
        let opened = match self.opening.as_mut() {
            Some(opening) => opening.as_mut().await,
            None => {
                debug!("No open in flight");
                self.state = LinkState::Idle;
                return;
            }
        };
        self.opening = None;

        match opened {
            Ok(link) => {
                info!(role = %self.role, session = ?self.session_id, "Link open");
                self.link = Some(link);
                self.attempts = 0;
                self.state = LinkState::Connected;
            }
            Err(e) => {
                warn!(error = %e, "Link open failed");
                self.link_failed(format!("{e:#}"));
            }
        }
    }

    fn on_frame(&mut self, frame: LinkFrame) {
        let text = match frame {
            LinkFrame::Text(text) => text,
            LinkFrame::Closed => return self.link_failed("connection closed".to_string()),
            LinkFrame::Failed(reason) => return self.link_failed(reason),
        };

        let event = match decode_inbound(&text) {
            Ok(Inbound::SessionInfo(info)) => {
                info!(session = %info.session_id, role = %info.role, status = %info.status, "Session established");
                self.session_id = Some(info.session_id.clone());
                ClientEvent::SessionEstablished(info)
            }
            Ok(Inbound::Error { message }) => {
                warn!(message = %message, "Server error");
                ClientEvent::Error(LinkError::Server(message))
            }
            Ok(Inbound::Snapshot(snap)) => ClientEvent::Snapshot(snap),
            Ok(Inbound::Ignored) => {
                debug!(len = text.len(), "Ignoring unrecognized message");
                return;
            }
            Err(e) => {
                debug!(error = %e, "Dropping undecodable message");
                ClientEvent::Error(LinkError::InvalidMessage {
                    detail: e.to_string(),
                })
            }
        };
        self.pending.push_back(event);
    }

    fn link_failed(&mut self, reason: String) {
        self.link = None;
        info!(reason = %reason, attempts = self.attempts, "Link lost");
        self.pending.push_back(ClientEvent::Disconnected { reason });

        if self.attempts < self.policy.max_attempts {
            let delay = self.policy.delay_for(self.attempts);
            self.attempts += 1;
            debug!(delay_ms = delay.as_millis() as u64, attempt = self.attempts, "Scheduling reconnect");
            self.retry = Some(PendingRetry {
                delay,
                timer: Box::pin(tokio::time::sleep(delay)),
            });
            self.state = LinkState::AwaitingRetry;
        } else {
            warn!(attempts = self.attempts, "Giving up on reconnect");
            self.state = LinkState::Exhausted;
            self.pending.push_back(ClientEvent::Error(LinkError::ReconnectExhausted {
                attempts: self.attempts,
            }));
        }
    }

    fn cancel_retry(&mut self) {
        if self.retry.take().is_some() {
            debug!("Cancelled pending reconnect");
        }
    }
}
