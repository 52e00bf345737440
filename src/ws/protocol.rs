//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::game::round::{RoundPhase, Scoreboard, Team};
use crate::game::weapons::WeaponType;
use crate::game::MatchId;

/// Point or direction in world space
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Origin and direction of a fired shot, in the client's flat field layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotVector {
    #[serde(rename = "originX")]
    pub origin_x: f64,
    #[serde(rename = "originY")]
    pub origin_y: f64,
    #[serde(rename = "originZ")]
    pub origin_z: f64,
    #[serde(rename = "dirX")]
    pub dir_x: f64,
    #[serde(rename = "dirY")]
    pub dir_y: f64,
    #[serde(rename = "dirZ")]
    pub dir_z: f64,
}

/// Actions the session understands. Anything else is dropped.
pub const KNOWN_ACTIONS: [&str; 9] = [
    "login",
    "shoot",
    "move",
    "buy_weapon",
    "plant_bomb",
    "defuse_bomb",
    "explosion_damage",
    "switch_weapon",
    "reload",
];

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    Login {
        #[serde(default)]
        name: Option<String>,
    },

    /// Fire the current weapon
    Shoot {
        #[serde(flatten)]
        shot: ShotVector,
    },

    /// Movement update, relayed to the opponent untouched
    Move {
        #[serde(flatten)]
        data: Map<String, Value>,
    },

    BuyWeapon {
        weapon_type: WeaponType,
    },

    PlantBomb {},

    DefuseBomb {},

    /// Client-reported explosion
    ExplosionDamage {
        #[serde(flatten)]
        position: Position,
        radius: f64,
        damage: f64,
    },

    /// Toggle primary/secondary
    SwitchWeapon {},

    /// Refill the current weapon
    Reload {},
}

impl ClientAction {
    /// Wire name of the action
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::Login { .. } => "login",
            ClientAction::Shoot { .. } => "shoot",
            ClientAction::Move { .. } => "move",
            ClientAction::BuyWeapon { .. } => "buy_weapon",
            ClientAction::PlantBomb {} => "plant_bomb",
            ClientAction::DefuseBomb {} => "defuse_bomb",
            ClientAction::ExplosionDamage { .. } => "explosion_damage",
            ClientAction::SwitchWeapon {} => "switch_weapon",
            ClientAction::Reload {} => "reload",
        }
    }
}

/// Game mode advertised on join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    #[serde(rename = "search_destroy")]
    SearchAndDestroy,
}

/// Why a round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundEndReason {
    #[serde(rename = "Bomb exploded")]
    BombExploded,
    #[serde(rename = "Bomb defused")]
    BombDefused,
    #[serde(rename = "All lawmen eliminated")]
    LawmenEliminated,
    #[serde(rename = "All outlaws eliminated")]
    OutlawsEliminated,
    #[serde(rename = "Time expired")]
    TimeExpired,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Paired into a match
    MatchJoined {
        match_id: MatchId,
        team: Team,
        mode: GameMode,
    },

    /// New round, buy time open
    RoundStart {
        round: u32,
        phase: RoundPhase,
        /// Seconds of buy time
        buy_time: u64,
        /// Seconds of combat after buy time
        time_limit: u64,
        lawmen_score: u32,
        outlaws_score: u32,
        /// Recipient's money
        money: u32,
    },

    BuyTimeEnd {
        phase: RoundPhase,
    },

    BuySuccess {
        weapon_type: WeaponType,
        money: u32,
    },

    BuyFailed {
        reason: String,
    },

    /// Opponent fired, for presentation only
    EnemyShoot {
        #[serde(flatten)]
        shot: ShotVector,
        weapon_type: WeaponType,
    },

    /// Your shot landed
    HitConfirmed {
        damage: i32,
        headshot: bool,
    },

    /// You were shot
    Hit {
        damage: i32,
        health: i32,
        headshot: bool,
    },

    PlayerDied {},

    EnemyKilled {
        money: u32,
    },

    /// You were caught in a blast
    ExplosionDamage {
        damage: i32,
        health: i32,
    },

    BombPlanted {
        planted_by: String,
    },

    BombDefused {
        defused_by: String,
    },

    RoundEnd {
        round: u32,
        winner: Team,
        reason: RoundEndReason,
        lawmen_score: u32,
        outlaws_score: u32,
        /// Recipient's money after payouts
        money: u32,
    },

    /// Match over, `winner` is null on a draw
    MatchEnd {
        winner: Option<Team>,
        final_score: Scoreboard,
    },

    /// Opponent movement, relayed verbatim
    EnemyMove {
        #[serde(flatten)]
        data: Map<String, Value>,
    },

    WeaponSwitched {
        weapon_type: WeaponType,
        ammo: u32,
    },

    Reloaded {
        weapon_type: WeaponType,
        ammo: u32,
        reload_time_ms: u64,
    },
}

impl ServerEvent {
    /// Encode as a text frame
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Action(ClientAction),
    /// Well-formed frame with an action we do not handle
    Unrecognized(String),
}

/// Frames that cannot be trusted
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("frame has no action field")]
    MissingAction,

    #[error("invalid {action} payload: {source}")]
    InvalidPayload {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode one text frame from a client
pub fn decode_client_frame(text: &str) -> Result<Inbound, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingAction)?
        .to_owned();

    if !KNOWN_ACTIONS.contains(&action.as_str()) {
        return Ok(Inbound::Unrecognized(action));
    }

    serde_json::from_value(value)
        .map(Inbound::Action)
        .map_err(|source| ProtocolError::InvalidPayload { action, source })
}
