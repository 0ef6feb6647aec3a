//! Session admission controller.
//!
//! # Lifecycle
//! ```text
//! WaitingForParticipants --[count >= threshold]--> Active
//! Active                 --[conclude(winner)]----> Concluded
//! any state              --[reset]---------------> WaitingForParticipants
//! ```
//!
//! The controller tracks admitted participants, gates the start of a match on
//! a minimum participant count and records the winner. Membership changes come
//! from the transport ([`InboundEvent`]); lifecycle transitions require the
//! session's [`AuthorityToken`]. Every transition is announced through the
//! [`Notifier`].
//!
//! When every participant leaves an `Active` session nothing happens: the
//! caller decides whether to conclude or reset.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::authority::{AuthorityToken, SessionKey};
use crate::error::{AdmissionError, AdmissionResult};
use crate::event::{InboundEvent, Notifier, SessionEvent};
use crate::participant::{bound_name, Participant, ParticipantId};

/// Participants required before a match starts, unless configured otherwise.
pub const DEFAULT_THRESHOLD: usize = 2;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SessionState {
    #[default]
    WaitingForParticipants,
    Active,
    Concluded,
}

impl SessionState {
    /// Position in the forward order; only increases between resets.
    fn rank(self) -> u8 {
        match self {
            SessionState::WaitingForParticipants => 0,
            SessionState::Active => 1,
            SessionState::Concluded => 2,
        }
    }

    /// Whether `next` is the single forward step from `self`.
    pub fn advances_to(self, next: SessionState) -> bool {
        next.rank() == self.rank() + 1
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::WaitingForParticipants => "waiting-for-participants",
            SessionState::Active => "active",
            SessionState::Concluded => "concluded",
        };
        f.write_str(s)
    }
}

/// Admission limits fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionRules {
    /// Participants required to start. Never below 1.
    pub threshold: usize,
    /// Maximum participants, if bounded.
    pub capacity: Option<usize>,
}

impl Default for AdmissionRules {
    fn default() -> Self {
        AdmissionRules {
            threshold: DEFAULT_THRESHOLD,
            capacity: None,
        }
    }
}

impl AdmissionRules {
    pub fn with_threshold(threshold: usize) -> Self {
        AdmissionRules {
            threshold,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Read-only copy of the session, sent to non-authoritative participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: SessionKey,
    pub state: SessionState,
    pub threshold: usize,
    /// Participants in join order.
    pub participants: Vec<Participant>,
    pub winner: Option<String>,
}

impl SessionSnapshot {
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_member(&self, id: ParticipantId) -> bool {
        self.participants.iter().any(|p| p.id == id)
    }
}

/// Authoritative admission state machine for one session.
#[derive(Debug)]
pub struct SessionAdmissionController {
    session: SessionKey,
    rules: AdmissionRules,
    participants: BTreeMap<ParticipantId, Participant>,
    /// Admission order, for stable snapshots.
    join_order: Vec<ParticipantId>,
    state: SessionState,
    winner: Option<String>,
    /// Start condition as of the last membership change.
    ready: bool,
    notifier: Notifier,
}

impl SessionAdmissionController {
    /// Creates a controller governed by `authority`.
    pub fn new(rules: AdmissionRules, authority: &AuthorityToken) -> Self {
        let rules = AdmissionRules {
            threshold: rules.threshold.max(1),
            ..rules
        };
        info!(
            session = %authority.session(),
            threshold = rules.threshold,
            capacity = ?rules.capacity,
            "Session created, waiting for participants"
        );
        SessionAdmissionController {
            session: authority.session(),
            rules,
            participants: BTreeMap::new(),
            join_order: Vec::new(),
            state: SessionState::WaitingForParticipants,
            winner: None,
            ready: false,
            notifier: Notifier::default(),
        }
    }

    pub fn session(&self) -> SessionKey {
        self.session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn threshold(&self) -> usize {
        self.rules.threshold
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.participants.contains_key(&id)
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    /// Participants in join order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.join_order
            .iter()
            .filter_map(|id| self.participants.get(id))
    }

    /// Whether the start condition held at the last membership change.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Subscribes to outbound session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.notifier.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session,
            state: self.state,
            threshold: self.rules.threshold,
            participants: self.participants().cloned().collect(),
            winner: self.winner.clone(),
        }
    }

    /// Applies a transport event.
    pub fn apply(&mut self, event: InboundEvent) -> AdmissionResult<()> {
        match event {
            InboundEvent::ParticipantJoined { id, name } => self.add_participant(id, &name),
            InboundEvent::ParticipantLeft { id } => {
                self.remove_participant(id);
                Ok(())
            }
        }
    }

    /// Admits a participant and re-evaluates the start condition.
    pub fn add_participant(&mut self, id: ParticipantId, name: &str) -> AdmissionResult<()> {
        if self.contains(id) {
            debug!(session = %self.session, participant = %id, "Duplicate join rejected");
            return Err(AdmissionError::Duplicate(id));
        }
        if let Some(capacity) = self.rules.capacity {
            if self.participant_count() >= capacity {
                debug!(session = %self.session, participant = %id, capacity, "Join rejected, session full");
                return Err(AdmissionError::SessionFull { capacity });
            }
        }

        let participant = Participant::new(id, name);
        info!(
            session = %self.session,
            participant = %id,
            name = %participant.name,
            count = self.participant_count() + 1,
            threshold = self.rules.threshold,
            "Participant joined"
        );
        self.participants.insert(id, participant);
        self.join_order.push(id);
        self.evaluate_start_condition();
        Ok(())
    }

    /// Removes a participant. Absent ids are ignored.
    pub fn remove_participant(&mut self, id: ParticipantId) -> Option<Participant> {
        let removed = self.participants.remove(&id)?;
        self.join_order.retain(|p| *p != id);
        info!(
            session = %self.session,
            participant = %id,
            count = self.participant_count(),
            "Participant left"
        );

        if self.state == SessionState::Active && self.participants.is_empty() {
            warn!(session = %self.session, "Active session has no participants left");
        }
        self.evaluate_start_condition();
        Some(removed)
    }

    /// Starts the match if enough participants are present.
    ///
    /// Returns `Ok(true)` when the session moved to `Active`; outside
    /// `WaitingForParticipants` or below the threshold this is a no-op.
    pub fn try_start(&mut self, authority: &AuthorityToken) -> AdmissionResult<bool> {
        self.check_authority(authority)?;
        self.evaluate_start_condition();
        if self.state != SessionState::WaitingForParticipants || !self.ready {
            return Ok(false);
        }

        info!(
            session = %self.session,
            participants = self.participant_count(),
            "Enough participants, starting game"
        );
        self.transition(SessionState::Active);
        self.notifier.emit(SessionEvent::GameStarted);
        Ok(true)
    }

    /// Ends an `Active` match with `winner_name` as the winner.
    pub fn conclude(&mut self, authority: &AuthorityToken, winner_name: &str) -> AdmissionResult<()> {
        self.check_authority(authority)?;
        if self.state != SessionState::Active {
            return Err(AdmissionError::InvalidStateTransition {
                from: self.state,
                to: SessionState::Concluded,
            });
        }

        let winner = bound_name(winner_name);
        info!(session = %self.session, winner = %winner, "Game concluded");
        self.winner = Some(winner.clone());
        self.transition(SessionState::Concluded);
        self.notifier.emit(SessionEvent::GameConcluded { winner });
        Ok(())
    }

    /// Forces the session back to `WaitingForParticipants`, keeping participants.
    pub fn reset(&mut self, authority: &AuthorityToken) -> AdmissionResult<()> {
        self.check_authority(authority)?;
        info!(session = %self.session, from = %self.state, "Session reset");

        self.state = SessionState::WaitingForParticipants;
        self.winner = None;
        self.ready = false;
        self.notifier.emit(SessionEvent::StateChanged {
            state: self.state,
        });
        Ok(())
    }

    fn check_authority(&self, authority: &AuthorityToken) -> AdmissionResult<()> {
        if authority.governs(self.session) {
            Ok(())
        } else {
            warn!(session = %self.session, caller = %authority.session(), "Rejected call without authority");
            Err(AdmissionError::NotAuthority)
        }
    }

    fn evaluate_start_condition(&mut self) {
        self.ready = self.state == SessionState::WaitingForParticipants
            && self.participant_count() >= self.rules.threshold;
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(self.state.advances_to(next), "{} -> {}", self.state, next);
        debug!(session = %self.session, from = %self.state, to = %next, "State transition");
        self.state = next;
        self.ready = false;
        self.notifier.emit(SessionEvent::StateChanged { state: next });
    }
}
