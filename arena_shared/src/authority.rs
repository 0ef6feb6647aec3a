//! Single-writer authority over a session.
//!
//! Exactly one [`AuthorityToken`] exists per session. The controller is built
//! with a reference to it and remembers its [`SessionKey`]; every mutating
//! lifecycle call must present the same token. The token is not `Clone`:
//! authority moves between owners, it is never shared.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_SESSION_KEY: AtomicU64 = AtomicU64::new(1);

/// Identifies one session lifecycle instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(u64);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Proof of authority over one session.
#[derive(Debug)]
pub struct AuthorityToken {
    key: SessionKey,
}

impl AuthorityToken {
    /// Elects a new authoritative owner for a fresh session.
    pub fn elect() -> Self {
        AuthorityToken {
            key: SessionKey(NEXT_SESSION_KEY.fetch_add(1, Ordering::Relaxed)),
        }
    }

    /// The session this token governs.
    pub fn session(&self) -> SessionKey {
        self.key
    }

    /// Whether this token governs `key`.
    pub fn governs(&self, key: SessionKey) -> bool {
        self.key == key
    }
}
