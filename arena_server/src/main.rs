//! Standalone session host binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--config host.json] [--addr 127.0.0.1:40000]
//!                                 [--session MainGameRoom] [--min-players 2] [--max-players 4]
//!
//! The host accepts participants, starts the match once enough have joined,
//! and forwards every state change to all of them.
//!
//! Console commands:
//!   status           - Show session status
//!   start            - Start now if enough participants joined
//!   conclude <name>  - End the match with a winner
//!   reset            - Return to waiting for participants
//!   kick <id>        - Disconnect a participant
//!   quit             - Shutdown host

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use arena_server::server::SessionHost;
use arena_shared::config::SessionConfig;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<SessionConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let text = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            SessionConfig::from_json_str(&text).context("parse config")?
        }
        _ => SessionConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--session" if i + 1 < args.len() => {
                cfg.session_name = args[i + 1].clone();
                i += 2;
            }
            "--min-players" if i + 1 < args.len() => {
                cfg.min_participants = args[i + 1].parse().context("parse --min-players")?;
                i += 2;
            }
            "--max-players" if i + 1 < args.len() => {
                cfg.max_participants = args[i + 1].parse().context("parse --max-players")?;
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
    info!(
        addr = %cfg.server_addr,
        session = %cfg.session_name,
        min = cfg.min_participants,
        max = cfg.max_participants,
        "Starting host"
    );

    let mut host = SessionHost::bind(cfg).await.context("create host")?;

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    host.set_console_input(console_rx);

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

    println!("Host ready on {}. Type 'status' for info, 'quit' to exit.", host.local_addr());
    println!();

    host.run().await
}
