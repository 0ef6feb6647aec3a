//! `arena_client`
//!
//! Participant-side systems:
//! - Joining a session (handshake, retry with backoff, hosting fallback)
//! - A read-only view of the host's session state
//! - Console commands (status, win, leave)

pub mod client;
pub mod connect;
pub mod view;

pub use client::SessionClient;
pub use connect::{join_or_host, join_with_retry, JoinOutcome};
pub use view::SessionView;
