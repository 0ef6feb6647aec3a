//! Configuration system.
//!
//! Loads session configuration from JSON strings (file IO left to app).
//! Every field has a default, so a partial document such as
//! `{"min_participants": 3}` is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::admission::{AdmissionRules, DEFAULT_THRESHOLD};
use crate::error::ConfigError;
use crate::math::Vec3;

/// Root configuration shared by host and client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Host listen/connect address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Session name; clients must match the host's.
    pub session_name: String,
    /// Host step rate.
    pub tick_hz: u32,
    /// Participants required to start a match.
    pub min_participants: usize,
    /// Participants admitted at most.
    pub max_participants: usize,
    /// Player name (client only). Blank means generated.
    pub player_name: String,
    /// Avatar spawn points (host only).
    pub spawn_points: Vec<Vec3>,
    /// Time a new connection gets to send `Hello` and `Join` (host only).
    pub handshake_timeout_ms: u64,
    /// Join retry policy (client only).
    pub connect: ConnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            session_name: "MainGameRoom".to_string(),
            tick_hz: 64,
            min_participants: DEFAULT_THRESHOLD,
            max_participants: 4,
            player_name: String::new(),
            spawn_points: Vec::new(),
            handshake_timeout_ms: 10_000,
            connect: ConnectPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_participants == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.max_participants < self.min_participants {
            return Err(ConfigError::CapacityBelowThreshold {
                min: self.min_participants,
                max: self.max_participants,
            });
        }
        if self.tick_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.connect.max_attempts == 0 {
            return Err(ConfigError::NoConnectAttempts);
        }
        Ok(())
    }

    pub fn admission_rules(&self) -> AdmissionRules {
        AdmissionRules::with_threshold(self.min_participants).with_capacity(self.max_participants)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }
}

/// How a client retries joining before hosting the session itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectPolicy {
    /// Wait before the first attempt, giving a host time to come up.
    pub initial_delay_ms: u64,
    pub max_attempts: u32,
    /// Wait between failed attempts.
    pub retry_delay_ms: u64,
    /// Wait after the last failure before falling back to hosting.
    pub fallback_delay_ms: u64,
    /// Upper bound for a single attempt.
    pub attempt_timeout_ms: u64,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 3000,
            max_attempts: 3,
            retry_delay_ms: 2000,
            fallback_delay_ms: 1000,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl ConnectPolicy {
    /// A policy with no waiting, for tests and local tools.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay_ms: 0,
            max_attempts,
            retry_delay_ms: 0,
            fallback_delay_ms: 0,
            attempt_timeout_ms: 1000,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay to wait before attempt `attempt` (0-based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            self.initial_delay()
        } else {
            self.retry_delay()
        }
    }
}
