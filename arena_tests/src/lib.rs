//! Shared helpers for the arena integration tests.
//!
//! [`HostHarness`] runs a [`SessionHost`] in a background task and drives it
//! through its console channel, the same way an operator would.

use std::time::Duration;

use anyhow::Context;
use arena_client::SessionClient;
use arena_server::server::{bind_ephemeral, SessionHost};
use arena_shared::config::{ConnectPolicy, SessionConfig};
use tokio::{sync::mpsc, task::JoinHandle};

/// How long any single test condition may take.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A fast-ticking config that never sleeps between join attempts.
pub fn fast_config(min_participants: usize, max_participants: usize) -> SessionConfig {
    SessionConfig {
        tick_hz: 200,
        min_participants,
        max_participants,
        connect: ConnectPolicy::immediate(1),
        ..Default::default()
    }
}

/// A host running in the background.
pub struct HostHarness {
    /// Config pointing at the running host.
    pub cfg: SessionConfig,
    console: mpsc::Sender<String>,
    task: JoinHandle<anyhow::Result<SessionHost>>,
}

impl HostHarness {
    pub async fn start(cfg: SessionConfig) -> anyhow::Result<Self> {
        let (mut host, cfg) = bind_ephemeral(cfg).await?;
        let (console, console_rx) = mpsc::channel(16);
        host.set_console_input(console_rx);
        let task = tokio::spawn(async move {
            host.run().await?;
            Ok(host)
        });
        Ok(Self { cfg, console, task })
    }

    /// Joins a participant with the given display name.
    pub async fn join(&self, name: &str) -> anyhow::Result<SessionClient> {
        let cfg = SessionConfig {
            player_name: name.to_string(),
            ..self.cfg.clone()
        };
        tokio::time::timeout(WAIT, SessionClient::connect(&cfg))
            .await
            .context("join timed out")?
    }

    /// Queues a host console command.
    pub async fn console(&self, line: &str) -> anyhow::Result<()> {
        self.console
            .send(line.to_string())
            .await
            .context("host stopped")
    }

    /// Quits the host and returns it for inspection.
    pub async fn stop(self) -> anyhow::Result<SessionHost> {
        self.console("quit").await?;
        tokio::time::timeout(WAIT, self.task)
            .await
            .context("host did not stop")??
    }
}
