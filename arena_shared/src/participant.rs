//! Participant identity and display names.
//!
//! # Names
//! Display names are replicated to every peer, so they are bounded to
//! [`MAX_NAME_LEN`] characters. A participant that joins without a name gets a
//! generated `Player<NNN>` name.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maximum display name length, in characters.
pub const MAX_NAME_LEN: usize = 16;

/// Prefix used for generated names.
pub const GENERATED_NAME_PREFIX: &str = "Player";

static NEXT_PARTICIPANT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque participant identifier, unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub u64);

impl ParticipantId {
    /// Allocates a process-unique id. Used by the host when admitting connections.
    pub fn new_unique() -> Self {
        ParticipantId(NEXT_PARTICIPANT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A participant admitted into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Bounded display name.
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Creates a participant joining now. The name is normalized with [`bound_name`].
    pub fn new(id: ParticipantId, name: &str) -> Self {
        Participant {
            id,
            name: bound_name(name),
            joined_at: Utc::now(),
        }
    }
}

/// Trims and truncates `raw` to at most [`MAX_NAME_LEN`] characters.
///
/// Returns an empty string when `raw` is blank; see [`display_name_or_generated`]
/// for the variant that never returns an empty name.
pub fn bound_name(raw: &str) -> String {
    raw.trim().chars().take(MAX_NAME_LEN).collect::<String>().trim_end().to_string()
}

/// Like [`bound_name`], but substitutes a generated name for blank input.
pub fn display_name_or_generated(raw: &str) -> String {
    let name = bound_name(raw);
    if name.is_empty() {
        generated_name(&mut rand::thread_rng())
    } else {
        name
    }
}

/// Generates a `Player<NNN>` name with NNN in `100..999`.
pub fn generated_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{}{}", GENERATED_NAME_PREFIX, rng.gen_range(100..999))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn bound_name_trims_whitespace() {
        assert_eq!(bound_name("  alice \n"), "alice");
    }

    #[test]
    fn bound_name_truncates_on_char_boundary() {
        let long = "ñ".repeat(MAX_NAME_LEN + 4);
        let bounded = bound_name(&long);
        assert_eq!(bounded.chars().count(), MAX_NAME_LEN);
        assert!(bounded.chars().all(|c| c == 'ñ'));
    }

    #[test]
    fn bound_name_blank_is_empty() {
        assert_eq!(bound_name("   "), "");
    }

    #[test]
    fn generated_names_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let name = generated_name(&mut rng);
            let digits: u32 = name
                .strip_prefix(GENERATED_NAME_PREFIX)
                .and_then(|d| d.parse().ok())
                .unwrap();
            assert!((100..999).contains(&digits), "{name}");
            assert!(name.chars().count() <= MAX_NAME_LEN);
        }
    }

    #[test]
    fn blank_name_gets_generated() {
        let name = display_name_or_generated("");
        assert!(name.starts_with(GENERATED_NAME_PREFIX));
    }

    #[test]
    fn participant_ids_are_unique() {
        let a = ParticipantId::new_unique();
        let b = ParticipantId::new_unique();
        assert_ne!(a, b);
    }

    #[test]
    fn participant_name_is_bounded() {
        let p = Participant::new(ParticipantId(3), "a-very-long-name-indeed");
        assert_eq!(p.name, "a-very-long-name");
    }
}
