//! Server implementation.
//!
//! A development stand-in for the game host. It supports:
//! - The `connect` handshake for players and spectators
//! - Session creation, resume, and spectating by id
//! - A fixed tick loop that advances each session's demo world and
//!   publishes snapshots to everyone attached
//! - Console commands (status, sessions, kick, end, quit)
//!
//! Each connection runs in its own task. Session state lives behind one
//! mutex that is never held across an await.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use crawl_shared::{
    config::ServerConfig,
    net::{decode_client, ClientMsg, FrameReader, FrameWriter, Role, ServerMsg, SessionInfo},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::{broadcast, broadcast::error::RecvError, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::session::{SessionManager, SnapshotText};

/// Session registry shared with connection tasks.
pub type SharedSessions = Arc<Mutex<SessionManager>>;

fn lock(sessions: &SharedSessions) -> MutexGuard<'_, SessionManager> {
    // A panicked connection task leaves the registry itself consistent.
    sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Development server.
pub struct GameServer {
    pub cfg: ServerConfig,
    sessions: SharedSessions,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    accept_task: Option<JoinHandle<()>>,
    tick: u64,
    started_at: DateTime<Utc>,
    shutdown: bool,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl GameServer {
    /// Binds the listener at `cfg.server_addr`.
    pub async fn new(cfg: ServerConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        let local_addr = listener.local_addr().context("local_addr")?;
        Ok(Self {
            cfg,
            sessions: Arc::new(Mutex::new(SessionManager::new())),
            listener: Some(listener),
            local_addr,
            accept_task: None,
            tick: 0,
            started_at: Utc::now(),
            shutdown: false,
            console_rx: None,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn sessions(&self) -> SharedSessions {
        Arc::clone(&self.sessions)
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown
    }

    /// Starts accepting connections in the background. Idempotent.
    pub fn start_accepting(&mut self) {
        if let Some(listener) = self.listener.take() {
            info!(addr = %self.local_addr, "Accepting connections");
            self.accept_task = Some(tokio::spawn(accept_loop(
                listener,
                Arc::clone(&self.sessions),
            )));
        }
    }

    /// Accepts and ticks until a `quit` console command.
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.start_accepting();
        let tick_interval = self.cfg.tick_interval();
        let mut next_tick = Instant::now();

        while !self.shutdown {
            self.step(tick_interval.as_secs_f32());
            next_tick += tick_interval;
            tokio::time::sleep_until(next_tick).await;
        }
        info!("Server shutting down");
        Ok(())
    }

    /// Executes one fixed step: console, then every session.
    pub fn step(&mut self, dt_sec: f32) {
        self.process_console_commands();
        lock(&self.sessions).step(dt_sec);
        self.tick += 1;
    }

    fn process_console_commands(&mut self) {
        // Collect lines first to avoid borrow conflict
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            for out in self.exec_console(&line) {
                println!("{out}");
            }
        }
    }

    /// Executes a console command and returns its output lines.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Vec::new(),
            ["status"] => {
                let sessions = lock(&self.sessions);
                let uptime = Utc::now() - self.started_at;
                vec![
                    format!("Listening: {}", self.local_addr),
                    format!("Tick: {} ({} Hz)", self.tick, self.cfg.tick_hz),
                    format!("Uptime: {}s", uptime.num_seconds()),
                    format!("Sessions: {}", sessions.len()),
                ]
            }
            ["sessions"] => {
                let list = lock(&self.sessions).list();
                if list.is_empty() {
                    return vec!["No sessions".to_string()];
                }
                list.into_iter()
                    .map(|s| {
                        format!(
                            "  {}: created={} tick={} room=({}, {}) players={} spectators={} inputs={}",
                            s.id,
                            s.created_at.format("%H:%M:%S"),
                            s.tick,
                            s.room.x,
                            s.room.y,
                            s.players,
                            s.spectators,
                            s.inputs
                        )
                    })
                    .collect()
            }
            ["kick", id] => {
                if lock(&self.sessions).kick(id) {
                    vec![format!("Kicked connections of {id}")]
                } else {
                    vec![format!("No session {id}")]
                }
            }
            ["end", id] => {
                if lock(&self.sessions).remove(id) {
                    vec![format!("Ended session {id}")]
                } else {
                    vec![format!("No session {id}")]
                }
            }
            ["quit"] | ["exit"] => {
                self.shutdown = true;
                vec!["Shutting down".to_string()]
            }
            _ => vec![format!("Unknown command: {}", line.trim())],
        }
    }
}

impl Drop for GameServer {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, sessions: SharedSessions) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "set_nodelay failed");
        }
        let sessions = Arc::clone(&sessions);
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, peer, sessions).await {
                debug!(%peer, error = %e, "Connection ended with error");
            }
        });
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    sessions: SharedSessions,
) -> anyhow::Result<()> {
    let (rd, wr) = stream.into_split();
    serve(FrameReader::new(rd), FrameWriter::new(wr), peer, sessions).await
}

/// Handshake, then snapshots out and inputs in until either side closes.
async fn serve<R, W>(
    mut reader: FrameReader<R>,
    mut writer: FrameWriter<W>,
    peer: SocketAddr,
    sessions: SharedSessions,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let Some(first) = reader.recv().await? else {
        debug!(%peer, "Closed before handshake");
        return Ok(());
    };

    let (role, requested) = match decode_client(&first) {
        Ok(ClientMsg::Connect { role, session_id }) => (role, session_id),
        Ok(other) => {
            debug!(%peer, ?other, "Expected connect");
            return refuse(writer, "expected connect").await;
        }
        Err(e) => {
            debug!(%peer, error = %e, "Undecodable handshake");
            return refuse(writer, "invalid message").await;
        }
    };

    let joined = lock(&sessions).join(role, requested.as_deref());
    let joined = match joined {
        Ok(joined) => joined,
        Err(e) => {
            info!(%peer, %role, requested = ?requested, error = %e, "Join refused");
            return refuse(writer, &e.to_string()).await;
        }
    };
    info!(%peer, %role, session = %joined.session_id, resumed = joined.resumed, "Client joined");
    let session_id = joined.session_id;
    let feed = joined.feed;

    let served = async {
        writer
            .send_msg(&ServerMsg::SessionInfo(SessionInfo {
                session_id: session_id.clone(),
                role,
                status: "ready".to_string(),
            }))
            .await?;

        let mut forward = tokio::spawn(forward_snapshots(feed, writer));
        let result = tokio::select! {
            r = read_client(&mut reader, &sessions, &session_id, role) => r,
            _ = &mut forward => Ok(()),
        };
        forward.abort();
        result
    }
    .await;

    lock(&sessions).leave(&session_id, role);
    info!(%peer, %role, session = %session_id, "Client left");
    served
}

async fn refuse<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    message: &str,
) -> anyhow::Result<()> {
    writer
        .send_msg(&ServerMsg::Error {
            message: message.to_string(),
        })
        .await?;
    writer.shutdown().await
}

async fn forward_snapshots<W: AsyncWrite + Unpin>(
    mut feed: broadcast::Receiver<SnapshotText>,
    mut writer: FrameWriter<W>,
) {
    loop {
        match feed.recv().await {
            Ok(text) => {
                if let Err(e) = writer.send(&text).await {
                    debug!(error = %e, "Snapshot write failed");
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "Subscriber lagging"),
            Err(RecvError::Closed) => {
                let _ = writer.shutdown().await;
                return;
            }
        }
    }
}

async fn read_client<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    sessions: &SharedSessions,
    session_id: &str,
    role: Role,
) -> anyhow::Result<()> {
    while let Some(text) = reader.recv().await? {
        match decode_client(&text) {
            Ok(ClientMsg::Input { key, action }) => match role {
                Role::Player => lock(sessions).record_input(session_id, &key, action),
                Role::Spectator => debug!(session = %session_id, "Ignoring spectator input"),
            },
            Ok(ClientMsg::Connect { .. }) => debug!(session = %session_id, "Ignoring repeated connect"),
            Err(e) => warn!(session = %session_id, error = %e, "Bad client frame"),
        }
    }
    Ok(())
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, ServerConfig)> {
    let cfg = ServerConfig {
        server_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        tick_hz,
    };
    let mut server = GameServer::new(cfg).await?;
    server.cfg.server_addr = server.local_addr().to_string();
    let cfg = server.cfg.clone();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawl_shared::net::{decode_inbound, encode, Inbound};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

    async fn dial(
        addr: SocketAddr,
        hello: &str,
    ) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (rd, wr) = stream.into_split();
        let mut writer = FrameWriter::new(wr);
        writer.send(hello).await.unwrap();
        (FrameReader::new(rd), writer)
    }

    async fn next_inbound(reader: &mut FrameReader<OwnedReadHalf>) -> Inbound {
        let text = tokio::time::timeout(Duration::from_secs(5), reader.recv())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("connection closed");
        decode_inbound(&text).unwrap()
    }

    fn connect_msg(role: Role, session_id: Option<&str>) -> String {
        encode(&ClientMsg::Connect {
            role,
            session_id: session_id.map(str::to_string),
        })
        .unwrap()
    }

    async fn spawn_server() -> (SocketAddr, SharedSessions) {
        let (server, cfg) = bind_ephemeral(50).await.unwrap();
        let sessions = server.sessions();
        tokio::spawn(server.run());
        (cfg.server_addr.parse().unwrap(), sessions)
    }

    #[tokio::test]
    async fn player_gets_session_info_then_snapshots() {
        let (addr, sessions) = spawn_server().await;
        let (mut reader, _writer) = dial(addr, &connect_msg(Role::Player, None)).await;

        let info = match next_inbound(&mut reader).await {
            Inbound::SessionInfo(info) => info,
            other => panic!("expected session_info, got {other:?}"),
        };
        assert_eq!(info.role, Role::Player);
        assert_eq!(info.status, "ready");
        assert!(lock(&sessions).get(&info.session_id).is_some());

        assert!(matches!(next_inbound(&mut reader).await, Inbound::Snapshot(_)));
    }

    #[tokio::test]
    async fn spectator_joins_existing_session() {
        let (addr, _sessions) = spawn_server().await;
        let (mut host, _host_writer) = dial(addr, &connect_msg(Role::Player, None)).await;
        let Inbound::SessionInfo(host_info) = next_inbound(&mut host).await else {
            panic!("expected session_info");
        };

        let hello = connect_msg(Role::Spectator, Some(&host_info.session_id));
        let (mut watcher, _watcher_writer) = dial(addr, &hello).await;
        match next_inbound(&mut watcher).await {
            Inbound::SessionInfo(info) => {
                assert_eq!(info.session_id, host_info.session_id);
                assert_eq!(info.role, Role::Spectator);
            }
            other => panic!("expected session_info, got {other:?}"),
        }
        assert!(matches!(next_inbound(&mut watcher).await, Inbound::Snapshot(_)));
    }

    #[tokio::test]
    async fn spectator_with_unknown_session_is_refused() {
        let (addr, _sessions) = spawn_server().await;
        let hello = connect_msg(Role::Spectator, Some("deadbeef"));
        let (mut reader, _writer) = dial(addr, &hello).await;

        assert_eq!(
            next_inbound(&mut reader).await,
            Inbound::Error {
                message: "session not found".into()
            }
        );
        assert_eq!(reader.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn garbage_handshake_is_refused() {
        let (addr, _sessions) = spawn_server().await;
        let (mut reader, _writer) = dial(addr, "{nope").await;
        assert_eq!(
            next_inbound(&mut reader).await,
            Inbound::Error {
                message: "invalid message".into()
            }
        );
    }

    #[tokio::test]
    async fn player_input_is_recorded() {
        let (addr, sessions) = spawn_server().await;
        let (mut reader, mut writer) = dial(addr, &connect_msg(Role::Player, None)).await;
        let Inbound::SessionInfo(info) = next_inbound(&mut reader).await else {
            panic!("expected session_info");
        };

        writer
            .send_msg(&ClientMsg::Input {
                key: "w".into(),
                action: crawl_shared::net::KeyAction::Press,
            })
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let inputs = lock(&sessions).get(&info.session_id).map(|s| s.inputs());
            if inputs == Some(1) {
                break;
            }
            assert!(Instant::now() < deadline, "input never recorded");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn console_commands() {
        let (mut server, _cfg) = bind_ephemeral(20).await.unwrap();
        assert_eq!(server.exec_console("sessions"), vec!["No sessions".to_string()]);

        let id = lock(&server.sessions()).create().id.clone();
        server.step(0.05);
        assert_eq!(server.tick(), 1);

        let status = server.exec_console("status");
        assert!(status.iter().any(|l| l == "Sessions: 1"));
        assert_eq!(server.exec_console("sessions").len(), 1);
        assert_eq!(server.exec_console(&format!("kick {id}")), vec![format!("Kicked connections of {id}")]);
        assert_eq!(server.exec_console(&format!("end {id}")), vec![format!("Ended session {id}")]);
        assert_eq!(server.exec_console("end nobody"), vec!["No session nobody".to_string()]);

        server.exec_console("quit");
        assert!(server.is_shutting_down());
    }
}
