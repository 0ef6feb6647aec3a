//! Standalone participant binary.
//!
//! Usage:
//!   cargo run -p arena_client -- [--config client.json] [--addr 127.0.0.1:40000]
//!                                 [--session MainGameRoom] [--name alice]
//!
//! The client joins the session, retrying while the host comes up. If no host
//! answers it hosts the session itself and joins as its first participant.
//!
//! Console commands:
//!   status  - Show the session as this participant sees it
//!   win     - Claim the win (reached the goal)
//!   leave   - Leave the session and exit

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use arena_client::{client::ClientState, join_or_host};
use arena_shared::config::SessionConfig;
use tokio::sync::mpsc;
use tracing::{info, warn};

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
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
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
    cfg.validate().context("invalid config")?;
    info!(server = %cfg.server_addr, session = %cfg.session_name, "Starting client");

    let (mut client, host) = join_or_host(&cfg).await?;
    let host_task = host.map(|mut host| {
        tokio::spawn(async move {
            if let Err(e) = host.run().await {
                warn!(error = %e, "Hosted session stopped");
            }
        })
    });

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

    println!(
        "Joined as {} {}. Type 'status' for info, 'leave' to exit.",
        client.participant_id, client.name
    );
    println!();

    let tick_interval = cfg.tick_interval();
    let mut last_status = String::new();

    loop {
        while let Ok(line) = console_rx.try_recv() {
            match client.exec_console(&line).await {
                Ok(output) => {
                    for line in output {
                        println!("{line}");
                    }
                }
                Err(e) => println!("Error: {e}"),
            }
        }

        client.poll();

        let status = client.view.status_line();
        if status != last_status {
            println!("{status}");
            last_status = status;
        }

        if let ClientState::Disconnected { reason } = &client.state {
            println!("Disconnected: {reason}");
            break;
        }

        tokio::time::sleep(tick_interval).await;
    }

    if let Some(task) = host_task {
        task.abort();
    }
    Ok(())
}
