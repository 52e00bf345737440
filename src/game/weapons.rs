//! Weapon catalog - static stats, hit/damage formulas, reward tables

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Weapons a player can carry. On the wire a weapon is its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WeaponType {
    /// Sidearm, free, always carried
    Revolver = 0,
    /// Devastating up close, useless at range
    Shotgun = 1,
    /// Long range precision
    Rifle = 2,
    /// Thrown explosive
    Dynamite = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown weapon code {0}")]
pub struct UnknownWeapon(pub u8);

impl TryFrom<u8> for WeaponType {
    type Error = UnknownWeapon;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(WeaponType::Revolver),
            1 => Ok(WeaponType::Shotgun),
            2 => Ok(WeaponType::Rifle),
            3 => Ok(WeaponType::Dynamite),
            other => Err(UnknownWeapon(other)),
        }
    }
}

impl From<WeaponType> for u8 {
    fn from(kind: WeaponType) -> u8 {
        kind as u8
    }
}

impl WeaponType {
    pub const ALL: [WeaponType; 4] = [
        WeaponType::Revolver,
        WeaponType::Shotgun,
        WeaponType::Rifle,
        WeaponType::Dynamite,
    ];

    /// Catalog entry for this weapon
    pub fn stats(self) -> &'static Weapon {
        match self {
            WeaponType::Revolver => &REVOLVER,
            WeaponType::Shotgun => &SHOTGUN,
            WeaponType::Rifle => &RIFLE,
            WeaponType::Dynamite => &DYNAMITE,
        }
    }

    /// The sidearm goes in the secondary slot, everything else in the primary
    pub fn is_sidearm(self) -> bool {
        self == WeaponType::Revolver
    }

    /// Money credited to the shooter on a hit with this weapon
    pub fn kill_reward(self) -> u32 {
        match self {
            WeaponType::Revolver => 300,
            WeaponType::Shotgun => 900,
            WeaponType::Rifle => 300,
            WeaponType::Dynamite => 500,
        }
    }
}

/// Immutable weapon stats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weapon {
    pub kind: WeaponType,
    /// Damage per hit before falloff and multipliers
    pub damage: i32,
    /// Effective range, damage and accuracy fall off beyond it
    pub range: f64,
    pub ammo_capacity: u32,
    pub reload_time: Duration,
    /// Shot dispersion, higher is less accurate
    pub spread: f64,
    pub price: u32,
    /// Hit chance at or inside effective range, before spread
    pub base_hit_chance: f64,
}

const REVOLVER: Weapon = Weapon {
    kind: WeaponType::Revolver,
    damage: 35,
    range: 30.0,
    ammo_capacity: 6,
    reload_time: Duration::from_secs(2),
    spread: 2.0,
    price: 0,
    base_hit_chance: 0.75,
};

const SHOTGUN: Weapon = Weapon {
    kind: WeaponType::Shotgun,
    damage: 80,
    range: 15.0,
    ammo_capacity: 2,
    reload_time: Duration::from_secs(3),
    spread: 8.0,
    price: 1200,
    base_hit_chance: 0.90,
};

const RIFLE: Weapon = Weapon {
    kind: WeaponType::Rifle,
    damage: 60,
    range: 50.0,
    ammo_capacity: 8,
    reload_time: Duration::from_secs(3),
    spread: 1.0,
    price: 2700,
    base_hit_chance: 0.85,
};

const DYNAMITE: Weapon = Weapon {
    kind: WeaponType::Dynamite,
    damage: 150,
    range: 25.0,
    ammo_capacity: 1,
    reload_time: Duration::from_secs(4),
    spread: 0.0,
    price: 600,
    base_hit_chance: 1.0,
};

/// Headshot probability for any landed shot
pub const HEADSHOT_CHANCE: f64 = 0.15;
/// Headshot damage multiplier
pub const HEADSHOT_MULTIPLIER: f64 = 2.5;

/// Round reward components
pub const ROUND_BASE_REWARD: u32 = 1400;
pub const ROUND_WIN_BONUS: u32 = 3250;
pub const ROUND_LOSS_BONUS: u32 = 1400;
pub const DEFUSE_BONUS: u32 = 250;
pub const PLANT_BONUS: u32 = 300;

impl Weapon {
    /// Fraction of the weapon's range the target is beyond it (0 when inside)
    fn overshoot(&self, distance: f64) -> f64 {
        if distance > self.range {
            (distance - self.range) / self.range
        } else {
            0.0
        }
    }

    /// Probability of landing a shot at the given distance, in [0.1, 1.0]
    pub fn hit_chance(&self, distance: f64) -> f64 {
        let mut chance = self.base_hit_chance;

        if distance > self.range {
            chance *= (1.0 - self.overshoot(distance)).max(0.1);
        }

        chance *= (1.0 - self.spread / 10.0).max(0.3);

        chance.clamp(0.1, 1.0)
    }

    /// Damage dealt by a landed shot at the given distance
    pub fn damage_at(&self, distance: f64, headshot: bool) -> i32 {
        let mut damage = self.damage;

        if distance > self.range {
            let falloff = (1.0 - self.overshoot(distance)).max(0.3);
            damage = (damage as f64 * falloff) as i32;
        }

        if headshot {
            damage = (damage as f64 * HEADSHOT_MULTIPLIER) as i32;
        }

        // Shotgun: fewer pellets connect the further away the target is
        if self.kind == WeaponType::Shotgun {
            damage = (damage as f64 * shotgun_pellets(distance) as f64 / 8.0) as i32;
        }

        damage
    }
}

/// Pellets that connect out of eight
fn shotgun_pellets(distance: f64) -> u32 {
    3 + (5.0 - distance / 3.0).max(0.0) as u32
}

/// Money a team member receives at round end
pub fn round_reward(won: bool) -> u32 {
    if won {
        ROUND_BASE_REWARD + ROUND_WIN_BONUS
    } else {
        ROUND_BASE_REWARD + ROUND_LOSS_BONUS
    }
}
