//! Threshold-gated avatar spawning.
//!
//! The host spawns no avatars until enough participants are present. Once the
//! threshold holds, every active participant without an avatar gets one, and
//! later joiners are spawned as they arrive. Leaving participants are
//! despawned.
//!
//! Spawn points are used round-robin by the number of avatars already alive.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::math::Vec3;
use crate::participant::ParticipantId;

/// A spawned avatar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Avatar {
    pub owner: ParticipantId,
    pub position: Vec3,
}

/// Decides when and where avatars are spawned.
#[derive(Debug, Clone)]
pub struct SpawnGate {
    min_to_spawn: usize,
    spawn_points: Vec<Vec3>,
    spawned: BTreeMap<ParticipantId, Avatar>,
}

impl SpawnGate {
    pub fn new(min_to_spawn: usize, spawn_points: Vec<Vec3>) -> Self {
        SpawnGate {
            min_to_spawn: min_to_spawn.max(1),
            spawn_points,
            spawned: BTreeMap::new(),
        }
    }

    pub fn avatar(&self, owner: ParticipantId) -> Option<&Avatar> {
        self.spawned.get(&owner)
    }

    pub fn avatars(&self) -> impl Iterator<Item = &Avatar> {
        self.spawned.values()
    }

    pub fn spawned_count(&self) -> usize {
        self.spawned.len()
    }

    /// Re-evaluates the gate against the current active population.
    ///
    /// `active` must be in join order; returns the avatars spawned by this call.
    pub fn update(&mut self, active: &[ParticipantId]) -> Vec<Avatar> {
        let count = active.len();
        if count < self.min_to_spawn {
            debug!(active = count, required = self.min_to_spawn, "Not enough participants to spawn");
            return Vec::new();
        }

        let mut fresh = Vec::new();
        for &owner in active {
            if self.spawned.contains_key(&owner) {
                continue;
            }
            let avatar = Avatar {
                owner,
                position: self.next_position(),
            };
            info!(participant = %owner, position = %avatar.position, "Avatar spawned");
            self.spawned.insert(owner, avatar);
            fresh.push(avatar);
        }
        fresh
    }

    /// Despawns the avatar of a participant that left.
    pub fn despawn(&mut self, owner: ParticipantId) -> Option<Avatar> {
        let avatar = self.spawned.remove(&owner)?;
        info!(participant = %owner, "Avatar despawned");
        Some(avatar)
    }

    fn next_position(&self) -> Vec3 {
        if self.spawn_points.is_empty() {
            return Vec3::ZERO;
        }
        self.spawn_points[self.spawned.len() % self.spawn_points.len()]
    }
}
