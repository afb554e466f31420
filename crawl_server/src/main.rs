//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p crawl_server -- [--addr 127.0.0.1:8765] [--tick-hz 20] [--config server.json]
//!
//! The server accepts client connections, runs one demo world per session,
//! and streams snapshots to every connection attached to it.
//!
//! Console commands:
//!   status         - Show server status
//!   sessions       - List sessions
//!   kick <id>      - Drop every connection of a session
//!   end <id>       - Remove a session
//!   quit           - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use crawl_server::GameServer;
use crawl_shared::config::ServerConfig;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let text = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            ServerConfig::from_json_str(&text).context("parse config")?
        }
        _ => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(20);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, "Starting server");

    let mut server = GameServer::new(cfg).await.context("create server")?;
    info!(local = %server.local_addr(), "Server listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

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

    println!("Server ready. Type 'sessions' to list sessions, 'status' for info, 'quit' to exit.");
    println!();

    server.run().await
}
