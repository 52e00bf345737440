//! Round rules - teams, phases, scores, timings and round-end payouts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::weapons::{round_reward, DEFUSE_BONUS, PLANT_BONUS};

/// Score a team needs to win the match
pub const WIN_SCORE: u32 = 9;
/// Rounds played before the match is called on score
pub const MAX_ROUNDS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    /// Defends, defuses the bomb
    Lawmen,
    /// Attacks, plants the bomb
    Outlaws,
}

impl Team {
    pub fn opponent(self) -> Team {
        match self {
            Team::Lawmen => Team::Outlaws,
            Team::Outlaws => Team::Lawmen,
        }
    }

    /// Display name for a player on this team
    pub fn player_title(self) -> &'static str {
        match self {
            Team::Lawmen => "Sheriff",
            Team::Outlaws => "Outlaw",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::Lawmen => write!(f, "lawmen"),
            Team::Outlaws => write!(f, "outlaws"),
        }
    }
}

/// Stage of the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Before the first round
    Warmup,
    /// Purchases allowed, no combat
    BuyTime,
    /// Combat and bomb actions allowed
    Active,
    /// Round decided, waiting for the next one
    End,
}

/// Durations driving the round state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimings {
    pub warmup: Duration,
    pub buy_time: Duration,
    pub round_time: Duration,
    pub bomb_fuse: Duration,
    pub restart_delay: Duration,
}

impl Default for RoundTimings {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(5),
            buy_time: Duration::from_secs(15),
            round_time: Duration::from_secs(120),
            bomb_fuse: Duration::from_secs(45),
            restart_delay: Duration::from_secs(5),
        }
    }
}

/// Per-team round wins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoreboard {
    pub lawmen: u32,
    pub outlaws: u32,
}

impl Scoreboard {
    pub fn award(&mut self, team: Team) {
        match team {
            Team::Lawmen => self.lawmen += 1,
            Team::Outlaws => self.outlaws += 1,
        }
    }

    /// Team that reached the winning score, if any
    pub fn champion(&self) -> Option<Team> {
        if self.lawmen >= WIN_SCORE {
            Some(Team::Lawmen)
        } else if self.outlaws >= WIN_SCORE {
            Some(Team::Outlaws)
        } else {
            None
        }
    }

    /// Leader on points, `None` on a tie
    pub fn leader(&self) -> Option<Team> {
        match self.lawmen.cmp(&self.outlaws) {
            std::cmp::Ordering::Greater => Some(Team::Lawmen),
            std::cmp::Ordering::Less => Some(Team::Outlaws),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Bomb status for the current round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BombState {
    pub planted: bool,
    pub defused: bool,
}

impl BombState {
    pub fn is_ticking(&self) -> bool {
        self.planted && !self.defused
    }
}

/// Money a member of `team` receives when the round ends. Bomb bonuses
/// go to the winning side only.
pub fn round_end_payout(team: Team, winner: Team, bomb: BombState) -> u32 {
    if team != winner {
        return round_reward(false);
    }

    let mut payout = round_reward(true);
    if bomb.defused {
        payout += DEFUSE_BONUS;
    }
    if bomb.planted {
        payout += PLANT_BONUS;
    }
    payout
}
