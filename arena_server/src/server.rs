//! Session host implementation.
//!
//! The host is the single authoritative owner of a session. It:
//! - accepts participant connections and runs the join handshake
//! - feeds join/leave events into the admission controller
//! - gates avatar spawning on the participant threshold
//! - checks the start condition once per step
//! - forwards every controller notification to all participants
//! - runs console commands (status, start, conclude, reset, kick, quit)
//!
//! Connection I/O runs in per-connection tasks; all session mutation happens
//! in [`SessionHost::step`], so the controller never sees concurrent writers.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use arena_shared::{
    admission::{SessionAdmissionController, SessionState},
    authority::AuthorityToken,
    config::SessionConfig,
    error::AdmissionError,
    event::{drain_ready, SessionEvent},
    net::{FrameReader, FrameWriter, NetMsg, ReliableConn, ReliableListener, PROTOCOL_VERSION},
    participant::{display_name_or_generated, ParticipantId},
    spawn::SpawnGate,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

/// Frames buffered per participant before new ones are dropped.
const OUTBOUND_QUEUE: usize = 64;
/// Connection events buffered between connection tasks and the host.
const INBOUND_QUEUE: usize = 256;
/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// What connection tasks report to the host.
#[derive(Debug)]
enum PeerEvent {
    /// Handshake finished; the participant asks to be admitted.
    Connected {
        id: ParticipantId,
        name: String,
        addr: SocketAddr,
        outbound: mpsc::Sender<NetMsg>,
    },
    ClaimWin { id: ParticipantId },
    /// Participant left or its connection dropped.
    Left { id: ParticipantId },
}

/// An admitted participant's connection.
struct Peer {
    addr: SocketAddr,
    outbound: mpsc::Sender<NetMsg>,
}

/// Authoritative session host.
pub struct SessionHost {
    pub cfg: SessionConfig,
    authority: AuthorityToken,
    controller: SessionAdmissionController,
    events: broadcast::Receiver<SessionEvent>,
    spawner: SpawnGate,
    peers: HashMap<ParticipantId, Peer>,

    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
    inbound_rx: mpsc::Receiver<PeerEvent>,

    tick: u64,
    running: bool,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl SessionHost {
    /// Binds the listener and starts accepting participants.
    pub async fn bind(cfg: SessionConfig) -> anyhow::Result<Self> {
        cfg.validate().context("invalid session config")?;
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            cfg.session_name.clone(),
            cfg.handshake_timeout(),
            inbound_tx,
        ));

        let authority = AuthorityToken::elect();
        let controller = SessionAdmissionController::new(cfg.admission_rules(), &authority);
        let events = controller.subscribe();
        let spawner = SpawnGate::new(cfg.min_participants, cfg.spawn_points.clone());

        info!(
            %local_addr,
            session = %cfg.session_name,
            key = %controller.session(),
            "Session host listening"
        );

        Ok(Self {
            cfg,
            authority,
            controller,
            events,
            spawner,
            peers: HashMap::new(),
            local_addr,
            accept_task,
            inbound_rx,
            tick: 0,
            running: true,
            console_rx: None,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn controller(&self) -> &SessionAdmissionController {
        &self.controller
    }

    pub fn spawner(&self) -> &SpawnGate {
        &self.spawner
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Connected and admitted participants.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Runs the host for a number of steps at the configured tick rate.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = self.cfg.tick_interval();
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step()?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Runs until a `quit` console command or [`SessionHost::shutdown`].
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let dt = self.cfg.tick_interval();
        let mut next = Instant::now();

        while self.running {
            next += dt;
            self.step()?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one host step.
    ///
    /// Roster snapshots go out before the notifications of the same step, so
    /// a participant that sees the match start already knows who is in it.
    pub fn step(&mut self) -> anyhow::Result<()> {
        self.process_console_commands()?;
        if !self.running {
            return Ok(());
        }

        if self.process_peer_events() {
            self.broadcast(NetMsg::Snapshot(self.controller.snapshot()));
        }

        let started = self.controller.try_start(&self.authority)?;
        if self.forward_events() > 0 || started {
            self.broadcast(NetMsg::Snapshot(self.controller.snapshot()));
        }

        self.tick += 1;
        Ok(())
    }

    /// Tells every participant the session is over and stops the run loop.
    pub fn shutdown(&mut self, reason: &str) {
        info!(reason = %reason, peers = self.peers.len(), "Session host shutting down");
        self.broadcast(NetMsg::Disconnect {
            reason: reason.to_string(),
        });
        self.peers.clear();
        self.running = false;

        // Connections that finished the handshake but were never admitted.
        self.inbound_rx.close();
        while let Ok(event) = self.inbound_rx.try_recv() {
            if let PeerEvent::Connected { id, outbound, .. } = event {
                debug!(participant = %id, "Turning away pending join");
                let _ = outbound.try_send(NetMsg::Disconnect {
                    reason: reason.to_string(),
                });
            }
        }
    }

    fn process_console_commands(&mut self) -> anyhow::Result<()> {
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
            for out in self.exec_console(&line)? {
                println!("{out}");
            }
        }
        Ok(())
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        match tokens[0] {
            "status" => {
                let snap = self.controller.snapshot();
                let mut out = Vec::new();
                out.push(format!("Session: {} ({})", self.cfg.session_name, snap.session));
                out.push(format!("State: {}", snap.state));
                out.push(format!("Tick: {}", self.tick));
                out.push(format!(
                    "Participants: {}/{} (start at {})",
                    snap.participant_count(),
                    self.cfg.max_participants,
                    snap.threshold
                ));
                for p in &snap.participants {
                    let addr = self
                        .peers
                        .get(&p.id)
                        .map(|peer| peer.addr.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let avatar = self
                        .spawner
                        .avatar(p.id)
                        .map(|a| a.position.to_string())
                        .unwrap_or_else(|| "not spawned".to_string());
                    out.push(format!("  {} {} addr={} avatar={}", p.id, p.name, addr, avatar));
                }
                if let Some(winner) = &snap.winner {
                    out.push(format!("Winner: {winner}"));
                }
                Ok(out)
            }
            "start" => {
                if self.controller.try_start(&self.authority)? {
                    Ok(vec!["Game started".to_string()])
                } else {
                    Ok(vec![format!(
                        "Cannot start: state={} participants={}/{}",
                        self.controller.state(),
                        self.controller.participant_count(),
                        self.controller.threshold()
                    )])
                }
            }
            "conclude" => {
                if tokens.len() < 2 {
                    return Ok(vec!["Usage: conclude <winner>".to_string()]);
                }
                let winner = tokens[1..].join(" ");
                match self.controller.conclude(&self.authority, &winner) {
                    Ok(()) => Ok(vec![format!("Winner: {winner}")]),
                    Err(e) => Ok(vec![format!("Cannot conclude: {e}")]),
                }
            }
            "reset" => {
                self.controller.reset(&self.authority)?;
                Ok(vec!["Session reset".to_string()])
            }
            "kick" => {
                let Some(id) = tokens.get(1).and_then(|t| t.trim_start_matches('#').parse::<u64>().ok())
                else {
                    return Ok(vec!["Usage: kick <participant-id>".to_string()]);
                };
                let id = ParticipantId(id);
                if self.kick(id, "kicked by host") {
                    Ok(vec![format!("Kicked {id}")])
                } else {
                    Ok(vec![format!("No participant {id}")])
                }
            }
            "quit" | "exit" => {
                self.shutdown("host quit");
                Ok(vec!["Bye".to_string()])
            }
            other => Ok(vec![format!("Unknown command: {other}")]),
        }
    }

    /// Disconnects and removes a participant. Returns whether it was present.
    pub fn kick(&mut self, id: ParticipantId, reason: &str) -> bool {
        if let Some(peer) = self.peers.remove(&id) {
            let _ = peer.outbound.try_send(NetMsg::Disconnect {
                reason: reason.to_string(),
            });
        }
        let present = self.remove_participant(id);
        if present {
            self.broadcast(NetMsg::Snapshot(self.controller.snapshot()));
        }
        present
    }

    /// Applies queued connection events; returns whether the roster changed.
    fn process_peer_events(&mut self) -> bool {
        let mut roster_changed = false;
        while let Ok(event) = self.inbound_rx.try_recv() {
            match event {
                PeerEvent::Connected {
                    id,
                    name,
                    addr,
                    outbound,
                } => {
                    roster_changed |= self.admit(id, &name, addr, outbound);
                }
                PeerEvent::ClaimWin { id } => self.on_claim_win(id),
                PeerEvent::Left { id } => {
                    self.peers.remove(&id);
                    roster_changed |= self.remove_participant(id);
                }
            }
        }
        roster_changed
    }

    fn admit(
        &mut self,
        id: ParticipantId,
        name: &str,
        addr: SocketAddr,
        outbound: mpsc::Sender<NetMsg>,
    ) -> bool {
        let name = display_name_or_generated(name);
        if let Err(e) = self.controller.add_participant(id, &name) {
            info!(participant = %id, %addr, error = %e, "Participant rejected");
            let _ = outbound.try_send(NetMsg::Rejected {
                reason: e.to_string(),
            });
            return false;
        }

        let welcome = NetMsg::Welcome {
            participant_id: id,
            snapshot: self.controller.snapshot(),
            avatars: self.spawner.avatars().copied().collect(),
        };
        if outbound.try_send(welcome).is_err() {
            warn!(participant = %id, "Could not queue welcome");
        }
        self.peers.insert(id, Peer { addr, outbound });

        let active: Vec<ParticipantId> = self.controller.participants().map(|p| p.id).collect();
        for avatar in self.spawner.update(&active) {
            self.broadcast(NetMsg::AvatarSpawned(avatar));
        }
        true
    }

    fn remove_participant(&mut self, id: ParticipantId) -> bool {
        if self.controller.remove_participant(id).is_none() {
            return false;
        }
        if let Some(avatar) = self.spawner.despawn(id) {
            self.broadcast(NetMsg::AvatarDespawned {
                owner: avatar.owner,
            });
        }
        true
    }

    fn on_claim_win(&mut self, id: ParticipantId) {
        let Some(name) = self.controller.participant(id).map(|p| p.name.clone()) else {
            debug!(participant = %id, "Win claim from unknown participant");
            return;
        };
        match self.controller.conclude(&self.authority, &name) {
            Ok(()) => info!(participant = %id, winner = %name, "Participant reached the goal"),
            Err(AdmissionError::InvalidStateTransition { from, .. }) => {
                debug!(participant = %id, state = %from, "Win claim ignored");
            }
            Err(e) => warn!(participant = %id, error = %e, "Win claim failed"),
        }
    }

    /// Forwards pending controller notifications; returns how many were sent.
    fn forward_events(&mut self) -> usize {
        let events = drain_ready(&mut self.events);
        for event in &events {
            match event {
                SessionEvent::StateChanged { state } => {
                    debug!(state = %state, "Forwarding state change")
                }
                SessionEvent::GameStarted => info!("Game started"),
                SessionEvent::GameConcluded { winner } => info!(winner = %winner, "Game over"),
            }
            self.broadcast(NetMsg::Event(event.clone()));
        }
        events.len()
    }

    fn broadcast(&self, msg: NetMsg) {
        for (id, peer) in &self.peers {
            if let Err(e) = peer.outbound.try_send(msg.clone()) {
                debug!(participant = %id, error = %e, "Dropped outbound frame");
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.controller.state()
    }
}

impl Drop for SessionHost {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: ReliableListener,
    session: String,
    handshake_timeout: Duration,
    inbound: mpsc::Sender<PeerEvent>,
) {
    loop {
        let (conn, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        debug!(%addr, "Connection accepted");
        let session = session.clone();
        let inbound = inbound.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(conn, addr, session, handshake_timeout, inbound).await {
                debug!(%addr, error = %e, "Connection closed");
            }
        });
    }
}

/// Runs the handshake, then relays the participant's frames to the host.
async fn serve_connection(
    mut conn: ReliableConn,
    addr: SocketAddr,
    session: String,
    handshake_timeout: Duration,
    inbound: mpsc::Sender<PeerEvent>,
) -> anyhow::Result<()> {
    let name = tokio::time::timeout(handshake_timeout, handshake(&mut conn, &session))
        .await
        .context("handshake timed out")??;

    let id = ParticipantId::new_unique();
    let (reader, writer) = conn.into_split();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
    tokio::spawn(write_loop(id, writer, out_rx));

    inbound
        .send(PeerEvent::Connected {
            id,
            name,
            addr,
            outbound: out_tx,
        })
        .await
        .context("host gone")?;

    read_loop(id, reader, inbound).await;
    Ok(())
}

/// Reads `Hello` then `Join`; returns the requested name.
async fn handshake(conn: &mut ReliableConn, session: &str) -> anyhow::Result<String> {
    match conn.recv().await? {
        NetMsg::Hello {
            protocol,
            session: requested,
        } => {
            if protocol != PROTOCOL_VERSION || requested != session {
                let reason = format!(
                    "expected protocol {PROTOCOL_VERSION} session '{session}', got protocol {protocol} session '{requested}'"
                );
                conn.send(&NetMsg::Rejected {
                    reason: reason.clone(),
                })
                .await?;
                anyhow::bail!(reason);
            }
        }
        other => anyhow::bail!("expected Hello, got {other:?}"),
    }
    match conn.recv().await? {
        NetMsg::Join { name } => Ok(name),
        other => anyhow::bail!("expected Join, got {other:?}"),
    }
}

async fn read_loop(id: ParticipantId, mut reader: FrameReader, inbound: mpsc::Sender<PeerEvent>) {
    loop {
        let event = match reader.recv().await {
            Ok(NetMsg::ClaimWin) => PeerEvent::ClaimWin { id },
            Ok(NetMsg::Leave) => {
                debug!(participant = %id, "Participant leaving");
                break;
            }
            Ok(other) => {
                debug!(participant = %id, ?other, "Unexpected message from participant");
                continue;
            }
            Err(e) => {
                debug!(participant = %id, error = %e, "Participant connection lost");
                break;
            }
        };
        if inbound.send(event).await.is_err() {
            return;
        }
    }
    let _ = inbound.send(PeerEvent::Left { id }).await;
}

async fn write_loop(id: ParticipantId, mut writer: FrameWriter, mut outbound: mpsc::Receiver<NetMsg>) {
    while let Some(msg) = outbound.recv().await {
        let closing = matches!(msg, NetMsg::Rejected { .. } | NetMsg::Disconnect { .. });
        if let Err(e) = writer.send(&msg).await {
            debug!(participant = %id, error = %e, "Write failed");
            break;
        }
        if closing {
            let _ = writer.shutdown().await;
            break;
        }
    }
}

/// Helper for tests: bind to an ephemeral localhost port.
///
/// Returns the host and a copy of `cfg` whose `server_addr` points at it.
pub async fn bind_ephemeral(cfg: SessionConfig) -> anyhow::Result<(SessionHost, SessionConfig)> {
    let cfg = SessionConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        ..cfg
    };
    let host = SessionHost::bind(cfg).await?;
    let mut cfg = host.cfg.clone();
    cfg.server_addr = host.local_addr().to_string();
    Ok((host, cfg))
}

/// Steps `host` until `done` holds or `timeout` elapses.
pub async fn step_until<F>(host: &mut SessionHost, timeout: Duration, mut done: F) -> anyhow::Result<()>
where
    F: FnMut(&SessionHost) -> bool,
{
    let deadline = Instant::now() + timeout;
    while !done(&*host) {
        anyhow::ensure!(Instant::now() < deadline, "host condition not met within {timeout:?}");
        host.step()?;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SessionConfig {
        SessionConfig {
            tick_hz: 200,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn console_reports_waiting_session() -> anyhow::Result<()> {
        let (mut host, _cfg) = bind_ephemeral(test_config()).await?;
        let out = host.exec_console("status")?;
        assert!(out.iter().any(|l| l == "State: waiting-for-participants"));
        assert!(out.iter().any(|l| l.starts_with("Participants: 0/4")));
        Ok(())
    }

    #[tokio::test]
    async fn console_start_needs_participants() -> anyhow::Result<()> {
        let (mut host, _cfg) = bind_ephemeral(test_config()).await?;
        let out = host.exec_console("start")?;
        assert!(out[0].starts_with("Cannot start"));
        assert_eq!(host.state(), SessionState::WaitingForParticipants);
        Ok(())
    }

    #[tokio::test]
    async fn console_conclude_outside_active_is_reported() -> anyhow::Result<()> {
        let (mut host, _cfg) = bind_ephemeral(test_config()).await?;
        let out = host.exec_console("conclude alice")?;
        assert!(out[0].starts_with("Cannot conclude"));
        Ok(())
    }

    #[tokio::test]
    async fn console_usage_and_unknown_commands() -> anyhow::Result<()> {
        let (mut host, _cfg) = bind_ephemeral(test_config()).await?;
        assert_eq!(host.exec_console("kick")?, vec!["Usage: kick <participant-id>"]);
        assert_eq!(host.exec_console("kick #42")?, vec!["No participant #42"]);
        assert_eq!(host.exec_console("dance")?, vec!["Unknown command: dance"]);
        assert!(host.exec_console("   ")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn quit_stops_the_run_loop() -> anyhow::Result<()> {
        let (mut host, _cfg) = bind_ephemeral(test_config()).await?;
        host.exec_console("quit")?;
        assert!(!host.is_running());
        host.run().await?;
        Ok(())
    }

    #[tokio::test]
    async fn invalid_config_is_refused() {
        let cfg = SessionConfig {
            min_participants: 0,
            ..test_config()
        };
        assert!(bind_ephemeral(cfg).await.is_err());
    }

    #[tokio::test]
    async fn handshake_admits_and_welcomes() -> anyhow::Result<()> {
        let (mut host, cfg) = bind_ephemeral(test_config()).await?;
        let mut conn = ReliableConn::connect(host.local_addr()).await?;
        conn.send(&NetMsg::Hello {
            protocol: PROTOCOL_VERSION,
            session: cfg.session_name.clone(),
        })
        .await?;
        conn.send(&NetMsg::Join {
            name: "alice".to_string(),
        })
        .await?;

        step_until(&mut host, Duration::from_secs(5), |h| h.peer_count() == 1).await?;
        match conn.recv().await? {
            NetMsg::Welcome {
                participant_id,
                snapshot,
                avatars,
            } => {
                assert!(snapshot.is_member(participant_id));
                assert!(avatars.is_empty());
            }
            other => panic!("expected Welcome, got {other:?}"),
        }
        assert_eq!(host.state(), SessionState::WaitingForParticipants);
        Ok(())
    }

    #[tokio::test]
    async fn protocol_mismatch_is_rejected() -> anyhow::Result<()> {
        let (host, cfg) = bind_ephemeral(test_config()).await?;
        let mut conn = ReliableConn::connect(host.local_addr()).await?;
        conn.send(&NetMsg::Hello {
            protocol: PROTOCOL_VERSION + 1,
            session: cfg.session_name.clone(),
        })
        .await?;
        assert!(matches!(conn.recv().await?, NetMsg::Rejected { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn quit_turns_away_pending_joins() -> anyhow::Result<()> {
        let (mut host, cfg) = bind_ephemeral(test_config()).await?;
        let mut conn = ReliableConn::connect(host.local_addr()).await?;
        conn.send(&NetMsg::Hello {
            protocol: PROTOCOL_VERSION,
            session: cfg.session_name.clone(),
        })
        .await?;
        conn.send(&NetMsg::Join {
            name: "late".to_string(),
        })
        .await?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let (console_tx, console_rx) = mpsc::channel(1);
        host.set_console_input(console_rx);
        console_tx.send("quit".to_string()).await?;
        host.step()?;

        assert!(!host.is_running());
        assert_eq!(host.peer_count(), 0);
        assert_eq!(host.controller().participant_count(), 0);
        match conn.recv().await {
            Ok(NetMsg::Disconnect { .. }) | Err(_) => {}
            Ok(other) => panic!("expected Disconnect, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn silent_connection_is_dropped_after_handshake_timeout() -> anyhow::Result<()> {
        let cfg = SessionConfig {
            handshake_timeout_ms: 50,
            ..test_config()
        };
        let (host, _cfg) = bind_ephemeral(cfg).await?;
        let mut conn = ReliableConn::connect(host.local_addr()).await?;

        let closed = tokio::time::timeout(Duration::from_secs(5), conn.recv()).await?;
        assert!(closed.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn steps_advance_the_tick() -> anyhow::Result<()> {
        let (mut host, _cfg) = bind_ephemeral(test_config()).await?;
        host.run_for_ticks(3).await?;
        assert_eq!(host.tick(), 3);
        Ok(())
    }
}
