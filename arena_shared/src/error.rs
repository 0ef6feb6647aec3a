//! Error types for session admission and configuration.

use thiserror::Error;

use crate::admission::SessionState;
use crate::participant::ParticipantId;

/// Result type alias using [`AdmissionError`].
pub type AdmissionResult<T> = std::result::Result<T, AdmissionError>;

/// Errors reported by the admission controller.
///
/// All of these are local and non-fatal: the controller is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The participant id is already admitted.
    #[error("participant {0} is already in the session")]
    Duplicate(ParticipantId),

    /// The requested transition is not allowed from the current state.
    #[error("cannot move session from {from} to {to}")]
    InvalidStateTransition {
        /// State the session was in.
        from: SessionState,
        /// State that was requested.
        to: SessionState,
    },

    /// The presented token does not hold authority over this session.
    #[error("caller does not hold authority over this session")]
    NotAuthority,

    /// The session already holds its maximum number of participants.
    #[error("session is full ({capacity} participants)")]
    SessionFull {
        /// Configured capacity.
        capacity: usize,
    },
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("min_participants must be at least 1")]
    ZeroThreshold,

    #[error("max_participants ({max}) is below min_participants ({min})")]
    CapacityBelowThreshold { min: usize, max: usize },

    #[error("tick_hz must be non-zero")]
    ZeroTickRate,

    #[error("connect.max_attempts must be at least 1")]
    NoConnectAttempts,
}
