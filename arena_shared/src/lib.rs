//! `arena_shared`
//!
//! Shared libraries used by both host and participants.
//!
//! Design goals:
//! - One authoritative writer per session; everyone else gets snapshots.
//! - Session logic is transport-agnostic: it consumes and emits events only.
//! - Clear separation of concerns (admission, authority, events, net, config).
//! - No `unsafe`.

pub mod admission;
pub mod authority;
pub mod config;
pub mod error;
pub mod event;
pub mod math;
pub mod net;
pub mod participant;
pub mod spawn;
