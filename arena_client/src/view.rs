//! Read-only mirror of the host's session.
//!
//! Participants never mutate session state; they only fold the host's
//! notifications and snapshots into a [`SessionView`]. Notifications may
//! arrive more than once, so applying the same message twice leaves the view
//! unchanged.

use std::collections::BTreeMap;

use arena_shared::{
    admission::{SessionSnapshot, SessionState},
    event::SessionEvent,
    net::NetMsg,
    participant::ParticipantId,
    spawn::Avatar,
};

/// The session as seen by one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    /// This participant.
    pub me: ParticipantId,
    pub snapshot: SessionSnapshot,
    pub avatars: BTreeMap<ParticipantId, Avatar>,
    /// Matches started since joining.
    pub games_started: u32,
}

impl SessionView {
    pub fn new(me: ParticipantId, snapshot: SessionSnapshot, avatars: Vec<Avatar>) -> Self {
        SessionView {
            me,
            snapshot,
            avatars: avatars.into_iter().map(|a| (a.owner, a)).collect(),
            games_started: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.state
    }

    pub fn winner(&self) -> Option<&str> {
        self.snapshot.winner.as_deref()
    }

    pub fn participant_count(&self) -> usize {
        self.snapshot.participant_count()
    }

    pub fn my_avatar(&self) -> Option<&Avatar> {
        self.avatars.get(&self.me)
    }

    /// Folds one host message into the view. Returns whether anything changed.
    pub fn apply(&mut self, msg: &NetMsg) -> bool {
        let before = self.clone();
        match msg {
            NetMsg::Event(event) => self.apply_event(event),
            NetMsg::Snapshot(snapshot) if snapshot.session == self.snapshot.session => {
                let previous = self.snapshot.state;
                self.snapshot = snapshot.clone();
                self.snapshot.state = previous;
                self.enter(snapshot.state);
            }
            NetMsg::AvatarSpawned(avatar) => {
                self.avatars.insert(avatar.owner, *avatar);
            }
            NetMsg::AvatarDespawned { owner } => {
                self.avatars.remove(owner);
            }
            _ => {}
        }
        *self != before
    }

    fn apply_event(&mut self, event: &SessionEvent) {
        match event {
            // The winner arrives with `GameConcluded` or a snapshot.
            SessionEvent::StateChanged {
                state: SessionState::Concluded,
            } => {}
            SessionEvent::StateChanged { state } => self.enter(*state),
            SessionEvent::GameStarted => self.enter(SessionState::Active),
            SessionEvent::GameConcluded { winner } => {
                self.snapshot.winner = Some(winner.clone());
                self.enter(SessionState::Concluded);
            }
        }
    }

    /// Moves the view to `state`, counting every entry into `Active`.
    fn enter(&mut self, state: SessionState) {
        if state == SessionState::Active && self.snapshot.state != SessionState::Active {
            self.games_started += 1;
        }
        if state == SessionState::WaitingForParticipants {
            self.snapshot.winner = None;
        }
        self.snapshot.state = state;
    }

    /// One-line status for display.
    pub fn status_line(&self) -> String {
        match self.state() {
            SessionState::WaitingForParticipants => format!(
                "Waiting for players... ({}/{})",
                self.participant_count(),
                self.snapshot.threshold
            ),
            SessionState::Active => {
                format!("Game in progress - players: {}", self.participant_count())
            }
            SessionState::Concluded => match self.winner() {
                Some(winner) => format!("{winner} wins!"),
                None => "Game over".to_string(),
            },
        }
    }
}
