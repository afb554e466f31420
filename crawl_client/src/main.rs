//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p crawl_client -- [--addr 127.0.0.1:8765] [--role player|spectator]
//!                                [--session <id>] [--render-hz 60] [--config client.json]
//!
//! The client connects to the server, smooths incoming snapshots at the
//! render rate, and logs the scene it would draw.
//!
//! Console commands:
//!   press <key>         - Send a key press
//!   release <key>       - Send a key release
//!   connect             - Reconnect with the configured role/session
//!   disconnect          - Close the link
//!   shake [intensity]   - Trigger a screen shake
//!   status              - Show client status
//!   quit                - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::time::Instant;

use anyhow::Context;
use crawl_client::{
    input::InputTracker, ConnectionManager, LinkState, Presentation, TcpConnector,
};
use crawl_shared::config::ClientConfig;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let text = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            ClientConfig::from_json_str(&text).context("parse config")?
        }
        _ => ClientConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--role" if i + 1 < args.len() => {
                cfg.role = args[i + 1].parse()?;
                i += 2;
            }
            "--session" if i + 1 < args.len() => {
                cfg.session_id = Some(args[i + 1].clone());
                i += 2;
            }
            "--render-hz" if i + 1 < args.len() => {
                cfg.render_hz = args[i + 1].parse().unwrap_or(60);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

fn print_status(conn: &ConnectionManager<TcpConnector>, view: &Presentation) {
    println!("State: {:?}", conn.state());
    println!("Role: {}", conn.role());
    println!("Session: {}", conn.session_id().unwrap_or("-"));
    println!("Reconnect attempts: {}", conn.attempts());
    if let Some(delay) = conn.retry_delay() {
        println!("Next retry in: {:?}", delay);
    }
    println!("Snapshots: {}", view.snapshots_seen());
    println!("Tracked entities: {}", view.smoother().len());
    if let Some(room) = view.room() {
        println!("Room: ({}, {})", room.x, room.y);
    }
    let ui = view.ui();
    println!(
        "HP {}/{}  coins {}  bombs {}",
        ui.health.current, ui.health.max, ui.currency.coins, ui.currency.bombs
    );
    if let Some(err) = view.last_error() {
        println!("Last error: {}", err);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_addr, role = %cfg.role, "Starting client");

    let mut conn = ConnectionManager::new(TcpConnector::new(&cfg.server_addr), cfg.reconnect);
    let mut view = Presentation::new();
    let mut keys = InputTracker::new();

    conn.connect(cfg.role, cfg.session_id.clone()).await;

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Client started. Type 'status' for info, 'quit' to exit.");
    println!();

    let started = Instant::now();
    let mut frames = tokio::time::interval(cfg.frame_interval());
    let mut last_frame = Instant::now();
    let mut frame_no: u64 = 0;

    loop {
        let live = matches!(
            conn.state(),
            LinkState::Connecting | LinkState::Connected | LinkState::AwaitingRetry
        );

        tokio::select! {
            event = conn.next_event(), if live => {
                if let Some(event) = event {
                    if event.is_fatal() {
                        println!("Connection lost for good. Type 'connect' to try again.");
                    }
                    view.apply_event(&event);
                }
            }
            _ = frames.tick() => {
                let now = Instant::now();
                view.update(now.duration_since(last_frame).as_secs_f32());
                last_frame = now;
                frame_no += 1;

                if frame_no % (u64::from(cfg.render_hz.max(1)) * 5) == 0 {
                    let frame = view.frame(started.elapsed().as_secs_f64());
                    info!(
                        entities = frame.entities.len(),
                        offset_x = frame.offset.x,
                        offset_y = frame.offset.y,
                        "Frame"
                    );
                }
            }
            line = console_rx.recv() => {
                let Some(line) = line else { break };
                let tokens: Vec<&str> = line.split_whitespace().collect();
                match tokens.as_slice() {
                    ["press", key] => {
                        if let Some(edge) = keys.press(key) {
                            conn.send_input(edge.key, edge.action).await;
                        }
                    }
                    ["release", key] => {
                        if let Some(edge) = keys.release(key) {
                            conn.send_input(edge.key, edge.action).await;
                        }
                    }
                    ["connect"] => {
                        let session = conn.session_id().map(str::to_string).or(cfg.session_id.clone());
                        conn.connect(cfg.role, session).await;
                    }
                    ["disconnect"] => {
                        for edge in keys.release_all() {
                            conn.send_input(edge.key, edge.action).await;
                        }
                        conn.disconnect().await;
                        println!("Disconnected");
                    }
                    ["shake"] => view.shake(1.0, None),
                    ["shake", intensity] => view.shake(intensity.parse().unwrap_or(1.0), None),
                    ["status"] => print_status(&conn, &view),
                    ["quit"] | ["exit"] => break,
                    _ => println!("Unknown command: {}", line),
                }
            }
        }
    }

    conn.disconnect().await;
    Ok(())
}
