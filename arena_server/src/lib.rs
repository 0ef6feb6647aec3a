//! `arena_server`
//!
//! Session host:
//! - Owns the session's admission controller and its authority token
//! - Accepts participants over TCP and runs the join handshake
//! - Gates avatar spawning on the participant threshold
//! - Forwards controller notifications and snapshots to every participant
//!
//! Networking model:
//! - TCP only, length-prefixed JSON frames (see `arena_shared::net`)
//! - One task per connection; session mutation stays on the host step

pub mod server;

pub use server::SessionHost;
