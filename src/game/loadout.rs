//! Per-player weapons, ammo and money

use super::weapons::{Weapon, WeaponType};

/// Money every player starts a match with
pub const STARTING_MONEY: u32 = 800;

/// Why a purchase was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BuyError {
    #[error("insufficient funds: need {price}, have {money}")]
    InsufficientFunds { price: u32, money: u32 },
}

impl BuyError {
    /// Reason code sent to the client
    pub fn reason(&self) -> &'static str {
        match self {
            BuyError::InsufficientFunds { .. } => "insufficient_funds",
        }
    }
}

/// Weapon slot in hand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Slot {
    #[default]
    Primary,
    Secondary,
}

impl Slot {
    fn other(self) -> Slot {
        match self {
            Slot::Primary => Slot::Secondary,
            Slot::Secondary => Slot::Primary,
        }
    }
}

/// A player's weapons and wallet. Owned and mutated only by its match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loadout {
    pub primary: WeaponType,
    pub secondary: WeaponType,
    /// Slot in hand, tracked apart from the weapon so two identical
    /// weapons still keep separate magazines
    pub slot: Slot,
    pub primary_ammo: u32,
    pub secondary_ammo: u32,
    pub money: u32,
}

impl Default for Loadout {
    fn default() -> Self {
        let capacity = WeaponType::Revolver.stats().ammo_capacity;
        Self {
            primary: WeaponType::Revolver,
            secondary: WeaponType::Revolver,
            slot: Slot::Primary,
            primary_ammo: capacity,
            secondary_ammo: capacity,
            money: STARTING_MONEY,
        }
    }
}

impl Loadout {
    /// Weapon in hand
    pub fn current(&self) -> WeaponType {
        match self.slot {
            Slot::Primary => self.primary,
            Slot::Secondary => self.secondary,
        }
    }

    pub fn current_weapon(&self) -> &'static Weapon {
        self.current().stats()
    }

    pub fn current_ammo(&self) -> u32 {
        match self.slot {
            Slot::Primary => self.primary_ammo,
            Slot::Secondary => self.secondary_ammo,
        }
    }

    fn current_ammo_mut(&mut self) -> &mut u32 {
        match self.slot {
            Slot::Primary => &mut self.primary_ammo,
            Slot::Secondary => &mut self.secondary_ammo,
        }
    }

    pub fn can_shoot(&self) -> bool {
        self.current_ammo() > 0
    }

    /// Spend one round from the slot in hand. Returns the weapon fired,
    /// or `None` when the slot is empty.
    pub fn shoot(&mut self) -> Option<WeaponType> {
        if !self.can_shoot() {
            return None;
        }
        *self.current_ammo_mut() -= 1;
        Some(self.current())
    }

    /// Refill the slot in hand to capacity
    pub fn reload(&mut self) -> u32 {
        let capacity = self.current_weapon().ammo_capacity;
        *self.current_ammo_mut() = capacity;
        capacity
    }

    /// Toggle between primary and secondary
    pub fn switch_weapon(&mut self) -> WeaponType {
        self.slot = self.slot.other();
        self.current()
    }

    /// Buy a weapon into its slot with a full magazine. The slot in hand is
    /// unchanged. Returns money left.
    pub fn buy_weapon(&mut self, kind: WeaponType) -> Result<u32, BuyError> {
        let weapon = kind.stats();
        if self.money < weapon.price {
            return Err(BuyError::InsufficientFunds {
                price: weapon.price,
                money: self.money,
            });
        }

        self.money -= weapon.price;

        if kind.is_sidearm() {
            self.secondary = kind;
            self.secondary_ammo = weapon.ammo_capacity;
        } else {
            self.primary = kind;
            self.primary_ammo = weapon.ammo_capacity;
        }

        Ok(self.money)
    }

    pub fn credit(&mut self, amount: u32) -> u32 {
        self.money = self.money.saturating_add(amount);
        self.money
    }
}
