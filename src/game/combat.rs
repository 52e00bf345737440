//! Combat system - hit resolution, blast falloff, damage

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::ws::protocol::Position;

use super::weapons::{Weapon, HEADSHOT_CHANCE};
use super::SessionId;

/// Health every player spawns with
pub const MAX_HEALTH: i32 = 100;

/// Placeholder shot distance until positions are tracked server side
pub const DEFAULT_SHOT_DISTANCE: f64 = 10.0;
/// Placeholder distance from a blast to every player
pub const DEFAULT_BLAST_DISTANCE: f64 = 5.0;

/// Supplies distances between combatants.
///
/// The server does not track positions, so hit and blast resolution ask this
/// model instead of measuring.
pub trait DistanceModel: Send + Sync {
    /// Distance between shooter and target for a shot
    fn shot_distance(&self, shooter: SessionId, target: SessionId) -> f64;

    /// Distance between a blast and a potential victim
    fn blast_distance(&self, blast: &Blast, victim: SessionId) -> f64;
}

/// Constant distances for every query
#[derive(Debug, Clone, Copy)]
pub struct FixedDistances {
    pub shot: f64,
    pub blast: f64,
}

impl Default for FixedDistances {
    fn default() -> Self {
        Self {
            shot: DEFAULT_SHOT_DISTANCE,
            blast: DEFAULT_BLAST_DISTANCE,
        }
    }
}

impl DistanceModel for FixedDistances {
    fn shot_distance(&self, _shooter: SessionId, _target: SessionId) -> f64 {
        self.shot
    }

    fn blast_distance(&self, _blast: &Blast, _victim: SessionId) -> f64 {
        self.blast
    }
}

/// Area-damage event, kept for the current round only
#[derive(Debug, Clone)]
pub struct Blast {
    pub position: Position,
    pub radius: f64,
    pub damage: i32,
    pub at: DateTime<Utc>,
    pub owner: SessionId,
}

impl Blast {
    /// Damage at the given distance, `None` if outside the radius
    pub fn damage_at(&self, distance: f64) -> Option<i32> {
        if self.radius <= 0.0 || distance > self.radius {
            return None;
        }
        let multiplier = (1.0 - distance / self.radius).max(0.1);
        Some((self.damage as f64 * multiplier) as i32)
    }
}

/// Result of rolling a single shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotOutcome {
    Miss,
    Hit { damage: i32, headshot: bool },
}

/// Roll hit and headshot for a shot at `distance`
pub fn resolve_shot<R: Rng + ?Sized>(rng: &mut R, weapon: &Weapon, distance: f64) -> ShotOutcome {
    let chance = weapon.hit_chance(distance);
    if rng.gen::<f64>() > chance {
        return ShotOutcome::Miss;
    }

    let headshot = rng.gen::<f64>() < HEADSHOT_CHANCE;
    ShotOutcome::Hit {
        damage: weapon.damage_at(distance, headshot),
        headshot,
    }
}

/// Apply damage to health, returns (new_health, is_dead)
pub fn apply_damage(current_health: i32, damage: i32) -> (i32, bool) {
    let new_health = current_health - damage.max(0);
    (new_health, new_health <= 0)
}
