//! Client implementation.
//!
//! The client maintains:
//! - A reliable control stream to the host (handshake + notifications)
//! - A reader task that queues host frames, so polling never tears a frame
//! - A read-only [`SessionView`] of the session

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use arena_shared::{
    config::SessionConfig,
    net::{FrameWriter, NetMsg, ReliableConn, PROTOCOL_VERSION},
    participant::{display_name_or_generated, ParticipantId},
};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::view::SessionView;

/// Host frames buffered before the reader task waits.
const INBOX_QUEUE: usize = 256;

/// Client connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Admitted and receiving updates.
    Joined,
    /// Host closed the connection or we left.
    Disconnected { reason: String },
}

/// A participant's connection to a session host.
pub struct SessionClient {
    pub participant_id: ParticipantId,
    pub name: String,
    pub state: ClientState,
    pub view: SessionView,

    writer: FrameWriter,
    inbox: mpsc::Receiver<NetMsg>,
    reader_task: JoinHandle<()>,
}

impl SessionClient {
    /// Connects to the host and joins its session.
    pub async fn connect(cfg: &SessionConfig) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let name = display_name_or_generated(&cfg.player_name);

        info!(server = %server_addr, session = %cfg.session_name, name = %name, "Joining session");

        let mut conn = ReliableConn::connect(server_addr).await?;
        conn.send(&NetMsg::Hello {
            protocol: PROTOCOL_VERSION,
            session: cfg.session_name.clone(),
        })
        .await?;
        conn.send(&NetMsg::Join { name: name.clone() }).await?;

        let (participant_id, view) = match conn.recv().await? {
            NetMsg::Welcome {
                participant_id,
                snapshot,
                avatars,
            } => (participant_id, SessionView::new(participant_id, snapshot, avatars)),
            NetMsg::Rejected { reason } => anyhow::bail!("rejected by host: {reason}"),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };

        info!(participant = %participant_id, state = %view.state(), "Joined session");

        let (mut reader, writer) = conn.into_split();
        let (inbox_tx, inbox) = mpsc::channel(INBOX_QUEUE);
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(msg) => {
                        if inbox_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Host stream ended");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            participant_id,
            name,
            state: ClientState::Joined,
            view,
            writer,
            inbox,
            reader_task,
        })
    }

    pub fn is_joined(&self) -> bool {
        self.state == ClientState::Joined
    }

    /// Applies every queued host message to the view. Returns how many were applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.inbox.try_recv() {
                Ok(msg) => {
                    self.handle(msg);
                    applied += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.mark_disconnected("connection closed");
                    break;
                }
            }
        }
        applied
    }

    /// Waits until `done` holds for the view, applying messages as they arrive.
    pub async fn wait_until<F>(&mut self, timeout: Duration, mut done: F) -> anyhow::Result<()>
    where
        F: FnMut(&SessionView) -> bool,
    {
        let deadline = Instant::now() + timeout;
        self.poll();
        while !done(&self.view) {
            anyhow::ensure!(self.is_joined(), "disconnected: {:?}", self.state);
            match tokio::time::timeout_at(deadline, self.inbox.recv()).await {
                Ok(Some(msg)) => self.handle(msg),
                Ok(None) => self.mark_disconnected("connection closed"),
                Err(_) => anyhow::bail!("condition not met within {timeout:?}"),
            }
        }
        Ok(())
    }

    fn handle(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::Disconnect { reason } => {
                info!(reason = %reason, "Disconnected by host");
                self.mark_disconnected(&reason);
            }
            msg => {
                if self.view.apply(&msg) {
                    debug!(status = %self.view.status_line(), "Session updated");
                }
            }
        }
    }

    fn mark_disconnected(&mut self, reason: &str) {
        if self.is_joined() {
            self.state = ClientState::Disconnected {
                reason: reason.to_string(),
            };
        }
    }

    /// Tells the host this participant reached the goal.
    pub async fn claim_win(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(self.is_joined(), "not joined");
        self.writer.send(&NetMsg::ClaimWin).await?;
        info!(participant = %self.participant_id, "Claimed win");
        Ok(())
    }

    /// Leaves the session and closes the connection.
    pub async fn leave(&mut self) -> anyhow::Result<()> {
        if !self.is_joined() {
            return Ok(());
        }
        self.writer.send(&NetMsg::Leave).await?;
        if let Err(e) = self.writer.shutdown().await {
            warn!(error = %e, "Shutdown after leave failed");
        }
        self.mark_disconnected("left");
        Ok(())
    }

    /// Executes a console command.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        match tokens[0] {
            "status" => {
                let mut out = Vec::new();
                out.push(format!("State: {:?}", self.state));
                out.push(format!("Me: {} {}", self.participant_id, self.name));
                out.push(self.view.status_line());
                for p in &self.view.snapshot.participants {
                    let avatar = self
                        .view
                        .avatars
                        .get(&p.id)
                        .map(|a| a.position.to_string())
                        .unwrap_or_else(|| "not spawned".to_string());
                    out.push(format!("  {} {} avatar={}", p.id, p.name, avatar));
                }
                Ok(out)
            }
            "win" => {
                self.claim_win().await?;
                Ok(vec!["Win claimed".to_string()])
            }
            "leave" | "quit" | "exit" => {
                self.leave().await?;
                Ok(vec!["Left session".to_string()])
            }
            other => Ok(vec![format!("Unknown command: {other}")]),
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
