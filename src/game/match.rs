//! Match actor - authoritative round state machine for one two-player game

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ws::protocol::{ClientAction, GameMode, Position, RoundEndReason, ServerEvent, ShotVector};
use crate::ws::session::SessionHandle;

use super::combat::{
    apply_damage, resolve_shot, Blast, DistanceModel, FixedDistances, ShotOutcome, MAX_HEALTH,
};
use super::loadout::Loadout;
use super::round::{round_end_payout, BombState, RoundPhase, RoundTimings, Scoreboard, Team, MAX_ROUNDS};
use super::weapons::WeaponType;
use super::{MatchId, SessionId};

/// Tunables every match is spawned with
#[derive(Clone)]
pub struct MatchSettings {
    pub timings: RoundTimings,
    pub distances: Arc<dyn DistanceModel>,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            timings: RoundTimings::default(),
            distances: Arc::new(FixedDistances::default()),
        }
    }
}

/// Deferred self-addressed signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    StartRound,
    EndBuyTime,
    RoundTimer,
    BombExploded,
}

/// A timer stamped with the round and phase it was scheduled in.
/// Delivered signals whose stamp no longer matches are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSignal {
    pub kind: TimerKind,
    pub round: u32,
    pub phase: RoundPhase,
}

/// Match mailbox messages
#[derive(Debug)]
pub enum MatchMsg {
    /// Action forwarded by a player's session
    Action { from: SessionId, action: ClientAction },
    Timer(TimerSignal),
}

/// Address of a running match
#[derive(Clone, Debug)]
pub struct MatchHandle {
    pub id: MatchId,
    tx: mpsc::UnboundedSender<MatchMsg>,
}

impl MatchHandle {
    pub(crate) fn new(id: MatchId, tx: mpsc::UnboundedSender<MatchMsg>) -> Self {
        Self { id, tx }
    }

    /// Forward a player action. Returns false if the match is gone.
    pub fn submit(&self, from: SessionId, action: ClientAction) -> bool {
        self.tx.send(MatchMsg::Action { from, action }).is_ok()
    }
}

impl PartialEq for MatchHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MatchHandle {}

impl Hash for MatchHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Metadata about a spawned match
#[derive(Debug, Clone)]
pub struct MatchInfo {
    pub id: MatchId,
    pub lawman: SessionId,
    pub outlaw: SessionId,
    pub created_at: DateTime<Utc>,
}

/// Registry of all live matches
pub struct MatchRegistry {
    matches: DashMap<MatchId, MatchInfo>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: &MatchId) -> Option<MatchInfo> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, info: MatchInfo) {
        self.matches.insert(info.id, info);
    }

    pub fn remove(&self, id: &MatchId) -> Option<MatchInfo> {
        self.matches.remove(id).map(|(_, info)| info)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Player state in a match (authoritative)
#[derive(Debug)]
pub struct PlayerState {
    pub session: SessionHandle,
    pub team: Team,
    pub alive: bool,
    /// May dip below zero on the killing blow, never reported negative
    pub health: i32,
    pub loadout: Loadout,
}

impl PlayerState {
    fn new(session: SessionHandle, team: Team) -> Self {
        Self {
            session,
            team,
            alive: true,
            health: MAX_HEALTH,
            loadout: Loadout::default(),
        }
    }
}

/// Outcome of damaging a living player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Wound {
    health: i32,
    died: bool,
}

/// Match state (owned by match task)
pub struct MatchState {
    pub id: MatchId,
    pub phase: RoundPhase,
    /// 1-based
    pub round: u32,
    pub score: Scoreboard,
    pub round_started_at: Option<DateTime<Utc>>,
    pub bomb: BombState,
    pub bomb_planted_at: Option<DateTime<Utc>>,
    /// Area-damage events of the current round
    pub blasts: Vec<Blast>,
    /// Set once match_end has been sent
    pub finished: bool,
    pub players: HashMap<SessionId, PlayerState>,
    /// Lawman first, outlaw second
    pub seats: [SessionId; 2],
}

impl MatchState {
    pub fn new(id: MatchId, lawman: SessionHandle, outlaw: SessionHandle) -> Self {
        let seats = [lawman.id, outlaw.id];
        let mut players = HashMap::with_capacity(2);
        players.insert(lawman.id, PlayerState::new(lawman, Team::Lawmen));
        players.insert(outlaw.id, PlayerState::new(outlaw, Team::Outlaws));

        Self {
            id,
            phase: RoundPhase::Warmup,
            round: 1,
            score: Scoreboard::default(),
            round_started_at: None,
            bomb: BombState::default(),
            bomb_planted_at: None,
            blasts: Vec::new(),
            finished: false,
            players,
            seats,
        }
    }

    pub fn opponent_of(&self, id: SessionId) -> Option<SessionId> {
        match self.seats {
            [a, b] if a == id => Some(b),
            [a, b] if b == id => Some(a),
            _ => None,
        }
    }

    pub fn alive_count(&self, team: Team) -> usize {
        self.players
            .values()
            .filter(|p| p.team == team && p.alive)
            .count()
    }
}

/// The authoritative game match
pub struct GameMatch {
    state: MatchState,
    settings: MatchSettings,
    rng: ChaCha8Rng,
    mailbox: mpsc::UnboundedReceiver<MatchMsg>,
    /// Weak so that pending timers never keep the match alive
    self_tx: mpsc::WeakUnboundedSender<MatchMsg>,
}

impl GameMatch {
    /// Create a new match between two sessions. The first seat plays Lawmen.
    pub fn new(
        id: MatchId,
        seed: u64,
        lawman: SessionHandle,
        outlaw: SessionHandle,
        settings: MatchSettings,
    ) -> (Self, MatchHandle) {
        let (tx, mailbox) = mpsc::unbounded_channel();
        let self_tx = tx.downgrade();

        let game_match = Self {
            state: MatchState::new(id, lawman, outlaw),
            settings,
            rng: ChaCha8Rng::seed_from_u64(seed),
            mailbox,
            self_tx,
        };

        (game_match, MatchHandle::new(id, tx))
    }

    /// Run the match until no session can reach it anymore.
    ///
    /// `handle` is handed to both players and then dropped, so the mailbox
    /// closes once both sessions let go of it.
    pub async fn run(mut self, handle: MatchHandle) {
        self.start(handle);

        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                MatchMsg::Action { from, action } => self.handle_action(from, action),
                MatchMsg::Timer(signal) => self.handle_timer(signal),
            }
        }

        info!(match_id = %self.state.id, "Match mailbox closed");
    }

    fn start(&mut self, handle: MatchHandle) {
        info!(
            match_id = %self.state.id,
            lawman = %self.state.seats[0],
            outlaw = %self.state.seats[1],
            "Showdown started"
        );

        for seat in self.state.seats {
            let player = &self.state.players[&seat];
            player.session.assign_match(handle.clone());
            player.session.send_event(ServerEvent::MatchJoined {
                match_id: self.state.id,
                team: player.team,
                mode: GameMode::SearchAndDestroy,
            });
        }

        self.schedule(self.settings.timings.warmup, TimerKind::StartRound);
    }

    /// Post a signal to ourselves after `delay`, stamped with the current
    /// round and phase
    fn schedule(&self, delay: Duration, kind: TimerKind) {
        let signal = TimerSignal {
            kind,
            round: self.state.round,
            phase: self.state.phase,
        };
        let tx = self.self_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(MatchMsg::Timer(signal));
            }
        });
    }

    fn handle_timer(&mut self, signal: TimerSignal) {
        if self.state.finished
            || signal.round != self.state.round
            || signal.phase != self.state.phase
        {
            debug!(match_id = %self.state.id, ?signal, "Ignoring stale timer");
            return;
        }

        match signal.kind {
            TimerKind::StartRound => self.start_round(),
            TimerKind::EndBuyTime => self.end_buy_time(),
            TimerKind::RoundTimer => self.check_round_timer(),
            TimerKind::BombExploded => {
                if self.state.bomb.is_ticking() {
                    self.end_round(Team::Outlaws, RoundEndReason::BombExploded);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Round lifecycle
    // ------------------------------------------------------------------

    fn start_round(&mut self) {
        self.state.phase = RoundPhase::BuyTime;
        self.state.round_started_at = Some(Utc::now());
        self.state.bomb = BombState::default();
        self.state.bomb_planted_at = None;
        self.state.blasts.clear();

        for player in self.state.players.values_mut() {
            player.alive = true;
            player.health = MAX_HEALTH;
        }

        let timings = self.settings.timings;
        for seat in self.state.seats {
            let player = &self.state.players[&seat];
            player.session.send_event(ServerEvent::RoundStart {
                round: self.state.round,
                phase: RoundPhase::BuyTime,
                buy_time: timings.buy_time.as_secs(),
                time_limit: timings.round_time.as_secs(),
                lawmen_score: self.state.score.lawmen,
                outlaws_score: self.state.score.outlaws,
                money: player.loadout.money,
            });
        }

        info!(
            match_id = %self.state.id,
            round = self.state.round,
            lawmen = self.state.score.lawmen,
            outlaws = self.state.score.outlaws,
            "Round started, buy time open"
        );

        self.schedule(timings.buy_time, TimerKind::EndBuyTime);
    }

    fn end_buy_time(&mut self) {
        self.state.phase = RoundPhase::Active;
        self.broadcast(ServerEvent::BuyTimeEnd {
            phase: RoundPhase::Active,
        });
        self.schedule(self.settings.timings.round_time, TimerKind::RoundTimer);
    }

    fn check_round_timer(&mut self) {
        if self.state.bomb.is_ticking() {
            self.end_round(Team::Outlaws, RoundEndReason::BombExploded);
        } else {
            self.end_round(Team::Lawmen, RoundEndReason::TimeExpired);
        }
    }

    fn check_round_end(&mut self) {
        for team in [Team::Lawmen, Team::Outlaws] {
            if self.state.alive_count(team) == 0 {
                let reason = match team {
                    Team::Lawmen => RoundEndReason::LawmenEliminated,
                    Team::Outlaws => RoundEndReason::OutlawsEliminated,
                };
                self.end_round(team.opponent(), reason);
                return;
            }
        }
    }

    fn end_round(&mut self, winner: Team, reason: RoundEndReason) {
        if self.state.phase != RoundPhase::Active {
            return;
        }
        self.state.phase = RoundPhase::End;

        let bomb = self.state.bomb;
        for player in self.state.players.values_mut() {
            player
                .loadout
                .credit(round_end_payout(player.team, winner, bomb));
        }
        self.state.score.award(winner);

        for seat in self.state.seats {
            let player = &self.state.players[&seat];
            player.session.send_event(ServerEvent::RoundEnd {
                round: self.state.round,
                winner,
                reason,
                lawmen_score: self.state.score.lawmen,
                outlaws_score: self.state.score.outlaws,
                money: player.loadout.money,
            });
        }

        info!(
            match_id = %self.state.id,
            round = self.state.round,
            winner = %winner,
            ?reason,
            "Round ended"
        );

        if let Some(champion) = self.state.score.champion() {
            self.end_match(Some(champion));
        } else if self.state.round >= MAX_ROUNDS {
            self.end_match(self.state.score.leader());
        } else {
            self.state.round += 1;
            self.schedule(self.settings.timings.restart_delay, TimerKind::StartRound);
        }
    }

    fn end_match(&mut self, winner: Option<Team>) {
        self.state.finished = true;
        self.broadcast(ServerEvent::MatchEnd {
            winner,
            final_score: self.state.score,
        });

        info!(
            match_id = %self.state.id,
            winner = ?winner,
            lawmen = self.state.score.lawmen,
            outlaws = self.state.score.outlaws,
            "Match finished"
        );
    }

    // ------------------------------------------------------------------
    // Player actions
    // ------------------------------------------------------------------

    fn handle_action(&mut self, from: SessionId, action: ClientAction) {
        if !self.state.players.contains_key(&from) {
            warn!(match_id = %self.state.id, session_id = %from, "Action from outside the match");
            return;
        }

        match action {
            ClientAction::Login { name } => {
                debug!(match_id = %self.state.id, session_id = %from, ?name, "Login");
            }
            ClientAction::Move { data } => self.relay_move(from, data),
            ClientAction::BuyWeapon { weapon_type } => self.handle_buy(from, weapon_type),
            ClientAction::SwitchWeapon {} => self.handle_switch(from),
            ClientAction::Reload {} => self.handle_reload(from),
            ClientAction::Shoot { shot } => self.handle_shoot(from, shot),
            ClientAction::ExplosionDamage {
                position,
                radius,
                damage,
            } => self.handle_explosion(from, position, radius, damage),
            ClientAction::PlantBomb {} => self.handle_plant(from),
            ClientAction::DefuseBomb {} => self.handle_defuse(from),
        }
    }

    fn relay_move(&self, from: SessionId, data: Map<String, Value>) {
        if let Some(opponent) = self.state.opponent_of(from) {
            self.send_to(opponent, ServerEvent::EnemyMove { data });
        }
    }

    fn handle_buy(&mut self, buyer: SessionId, weapon_type: WeaponType) {
        if self.state.phase != RoundPhase::BuyTime {
            self.send_to(
                buyer,
                ServerEvent::BuyFailed {
                    reason: "not_buy_time".to_string(),
                },
            );
            return;
        }

        let Some(player) = self.state.players.get_mut(&buyer) else {
            return;
        };

        let reply = match player.loadout.buy_weapon(weapon_type) {
            Ok(money) => {
                info!(
                    match_id = %self.state.id,
                    session_id = %buyer,
                    ?weapon_type,
                    money,
                    "Weapon bought"
                );
                ServerEvent::BuySuccess { weapon_type, money }
            }
            Err(e) => {
                debug!(match_id = %self.state.id, session_id = %buyer, error = %e, "Purchase refused");
                ServerEvent::BuyFailed {
                    reason: e.reason().to_string(),
                }
            }
        };

        self.send_to(buyer, reply);
    }

    fn handle_switch(&mut self, from: SessionId) {
        let Some(player) = self.state.players.get_mut(&from) else {
            return;
        };
        if !player.alive {
            return;
        }

        let weapon_type = player.loadout.switch_weapon();
        let ammo = player.loadout.current_ammo();
        self.send_to(from, ServerEvent::WeaponSwitched { weapon_type, ammo });
    }

    fn handle_reload(&mut self, from: SessionId) {
        let Some(player) = self.state.players.get_mut(&from) else {
            return;
        };
        if !player.alive {
            return;
        }

        let ammo = player.loadout.reload();
        let weapon = player.loadout.current_weapon();
        self.send_to(
            from,
            ServerEvent::Reloaded {
                weapon_type: weapon.kind,
                ammo,
                reload_time_ms: weapon.reload_time.as_millis() as u64,
            },
        );
    }

    fn handle_shoot(&mut self, shooter: SessionId, shot: ShotVector) {
        if self.state.phase != RoundPhase::Active {
            return;
        }
        let Some(target) = self.state.opponent_of(shooter) else {
            return;
        };

        let fired = match self.state.players.get_mut(&shooter) {
            Some(player) if player.alive => player.loadout.shoot(),
            _ => return,
        };
        let Some(weapon_type) = fired else {
            debug!(match_id = %self.state.id, session_id = %shooter, "Dry fire");
            return;
        };

        // Presentation only, independent of the outcome
        self.send_to(target, ServerEvent::EnemyShoot { shot, weapon_type });

        if !self.state.players[&target].alive {
            return;
        }

        let distance = self.settings.distances.shot_distance(shooter, target);
        let ShotOutcome::Hit { damage, headshot } =
            resolve_shot(&mut self.rng, weapon_type.stats(), distance)
        else {
            return;
        };

        let money = self.credit(shooter, weapon_type.kill_reward());
        self.send_to(shooter, ServerEvent::HitConfirmed { damage, headshot });

        let Some(wound) = self.wound(target, damage) else {
            return;
        };
        self.send_to(
            target,
            ServerEvent::Hit {
                damage,
                health: wound.health.max(0),
                headshot,
            },
        );

        if wound.died {
            self.send_to(target, ServerEvent::PlayerDied {});
            self.send_to(shooter, ServerEvent::EnemyKilled { money });
            info!(match_id = %self.state.id, killer = %shooter, victim = %target, ?weapon_type, "Player killed");
            self.check_round_end();
        }
    }

    fn handle_explosion(&mut self, exploder: SessionId, position: Position, radius: f64, damage: f64) {
        if self.state.phase != RoundPhase::Active {
            return;
        }

        let blast = Blast {
            position,
            radius,
            damage: damage.max(0.0) as i32,
            at: Utc::now(),
            owner: exploder,
        };

        let distances = &self.settings.distances;
        let victims: Vec<(SessionId, i32)> = self
            .state
            .seats
            .iter()
            .filter(|id| self.state.players[*id].alive)
            .filter_map(|id| {
                blast
                    .damage_at(distances.blast_distance(&blast, *id))
                    .map(|amount| (*id, amount))
            })
            .collect();

        self.state.blasts.push(blast);

        for (victim, amount) in victims {
            let Some(wound) = self.wound(victim, amount) else {
                continue;
            };
            self.send_to(
                victim,
                ServerEvent::ExplosionDamage {
                    damage: amount,
                    health: wound.health.max(0),
                },
            );

            if wound.died {
                self.send_to(victim, ServerEvent::PlayerDied {});
                if victim != exploder {
                    let money = self.credit(exploder, WeaponType::Dynamite.kill_reward());
                    self.send_to(exploder, ServerEvent::EnemyKilled { money });
                }
                info!(match_id = %self.state.id, killer = %exploder, victim = %victim, "Player blown up");
            }
        }

        self.check_round_end();
    }

    fn handle_plant(&mut self, planter: SessionId) {
        if self.state.phase != RoundPhase::Active || self.state.bomb.planted {
            return;
        }
        match self.state.players.get(&planter) {
            Some(player) if player.alive && player.team == Team::Outlaws => {}
            _ => return,
        }

        self.state.bomb.planted = true;
        self.state.bomb_planted_at = Some(Utc::now());
        self.broadcast(ServerEvent::BombPlanted {
            planted_by: Team::Outlaws.player_title().to_string(),
        });

        info!(match_id = %self.state.id, session_id = %planter, "Bomb planted");

        self.schedule(self.settings.timings.bomb_fuse, TimerKind::BombExploded);
    }

    fn handle_defuse(&mut self, defuser: SessionId) {
        if self.state.phase != RoundPhase::Active || !self.state.bomb.is_ticking() {
            return;
        }
        match self.state.players.get(&defuser) {
            Some(player) if player.alive && player.team == Team::Lawmen => {}
            _ => return,
        }

        self.state.bomb.defused = true;
        self.broadcast(ServerEvent::BombDefused {
            defused_by: Team::Lawmen.player_title().to_string(),
        });

        info!(match_id = %self.state.id, session_id = %defuser, "Bomb defused");

        self.end_round(Team::Lawmen, RoundEndReason::BombDefused);
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Damage a living player. `None` if the player was already dead.
    fn wound(&mut self, victim: SessionId, damage: i32) -> Option<Wound> {
        let player = self.state.players.get_mut(&victim)?;
        if !player.alive {
            return None;
        }

        let (health, died) = apply_damage(player.health, damage);
        player.health = health;
        if died {
            player.alive = false;
        }
        Some(Wound { health, died })
    }

    fn credit(&mut self, id: SessionId, amount: u32) -> u32 {
        self.state
            .players
            .get_mut(&id)
            .map(|p| p.loadout.credit(amount))
            .unwrap_or_default()
    }

    fn send_to(&self, id: SessionId, event: ServerEvent) {
        if let Some(player) = self.state.players.get(&id) {
            if !player.session.send_event(event) {
                debug!(match_id = %self.state.id, session_id = %id, "Session gone, event dropped");
            }
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        for seat in self.state.seats {
            self.send_to(seat, event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::session::SessionMsg;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::Instant;

    struct Fixture {
        game: GameMatch,
        handle: MatchHandle,
        lawman: SessionId,
        outlaw: SessionId,
        lawman_rx: UnboundedReceiver<SessionMsg>,
        outlaw_rx: UnboundedReceiver<SessionMsg>,
    }

    /// Blasts reach everyone except the player who threw them
    struct SparesOwner;

    impl DistanceModel for SparesOwner {
        fn shot_distance(&self, _: SessionId, _: SessionId) -> f64 {
            10.0
        }

        fn blast_distance(&self, blast: &Blast, victim: SessionId) -> f64 {
            if blast.owner == victim {
                f64::INFINITY
            } else {
                0.0
            }
        }
    }

    fn session() -> (SessionHandle, UnboundedReceiver<SessionMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionHandle::new(SessionId::new(), tx), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<SessionMsg>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let SessionMsg::Event(event) = msg {
                events.push(event);
            }
        }
        events
    }

    impl Fixture {
        fn with_settings(settings: MatchSettings) -> Self {
            let (lawman, lawman_rx) = session();
            let (outlaw, outlaw_rx) = session();
            let (lawman_id, outlaw_id) = (lawman.id, outlaw.id);
            let (game, handle) = GameMatch::new(MatchId::new(), 7, lawman, outlaw, settings);
            Self {
                game,
                handle,
                lawman: lawman_id,
                outlaw: outlaw_id,
                lawman_rx,
                outlaw_rx,
            }
        }

        fn new() -> Self {
            Self::with_settings(MatchSettings::default())
        }

        fn state(&self) -> &MatchState {
            &self.game.state
        }

        fn player(&mut self, id: SessionId) -> &mut PlayerState {
            self.game.state.players.get_mut(&id).unwrap()
        }

        fn fire(&mut self, kind: TimerKind) {
            let signal = TimerSignal {
                kind,
                round: self.game.state.round,
                phase: self.game.state.phase,
            };
            self.game.handle_timer(signal);
        }

        fn act(&mut self, from: SessionId, action: ClientAction) {
            self.game.handle_action(from, action);
        }

        fn lawman_events(&mut self) -> Vec<ServerEvent> {
            drain(&mut self.lawman_rx)
        }

        fn outlaw_events(&mut self) -> Vec<ServerEvent> {
            drain(&mut self.outlaw_rx)
        }

        fn clear(&mut self) {
            self.lawman_events();
            self.outlaw_events();
        }

        /// Warm up and open buy time
        fn to_buy_time(&mut self) {
            self.game.start(self.handle.clone());
            self.fire(TimerKind::StartRound);
            self.clear();
        }

        fn to_active(&mut self) {
            self.to_buy_time();
            self.fire(TimerKind::EndBuyTime);
            self.clear();
        }
    }

    fn reason_of(events: &[ServerEvent]) -> Option<(Team, RoundEndReason)> {
        events.iter().find_map(|e| match e {
            ServerEvent::RoundEnd { winner, reason, .. } => Some((*winner, *reason)),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_start_assigns_both_players() {
        let mut fx = Fixture::new();
        fx.game.start(fx.handle.clone());

        for (rx, team) in [
            (&mut fx.lawman_rx, Team::Lawmen),
            (&mut fx.outlaw_rx, Team::Outlaws),
        ] {
            let Ok(SessionMsg::MatchAssigned(assigned)) = rx.try_recv() else {
                panic!("expected assignment first");
            };
            assert_eq!(assigned, fx.handle);
            assert_eq!(
                drain(rx),
                vec![ServerEvent::MatchJoined {
                    match_id: fx.handle.id,
                    team,
                    mode: GameMode::SearchAndDestroy,
                }]
            );
        }
        assert_eq!(fx.state().phase, RoundPhase::Warmup);
    }

    #[tokio::test]
    async fn test_round_phases_and_stale_timers() {
        let mut fx = Fixture::new();
        fx.game.start(fx.handle.clone());
        fx.clear();

        fx.fire(TimerKind::StartRound);
        assert_eq!(fx.state().phase, RoundPhase::BuyTime);
        assert_eq!(
            fx.lawman_events(),
            vec![ServerEvent::RoundStart {
                round: 1,
                phase: RoundPhase::BuyTime,
                buy_time: 15,
                time_limit: 120,
                lawmen_score: 0,
                outlaws_score: 0,
                money: 800,
            }]
        );

        let buy_end = TimerSignal {
            kind: TimerKind::EndBuyTime,
            round: 1,
            phase: RoundPhase::BuyTime,
        };
        fx.game.handle_timer(buy_end);
        assert_eq!(fx.state().phase, RoundPhase::Active);

        fx.fire(TimerKind::RoundTimer);
        assert_eq!(fx.state().phase, RoundPhase::End);
        assert_eq!(fx.state().round, 2);
        assert_eq!(
            reason_of(&fx.outlaw_events()),
            Some((Team::Lawmen, RoundEndReason::TimeExpired))
        );
        fx.clear();

        // Round 1 timers delivered late change nothing
        fx.game.handle_timer(buy_end);
        fx.game.handle_timer(TimerSignal {
            kind: TimerKind::RoundTimer,
            round: 1,
            phase: RoundPhase::Active,
        });
        assert_eq!(fx.state().phase, RoundPhase::End);
        assert_eq!(fx.state().score, Scoreboard { lawmen: 1, outlaws: 0 });
        assert!(fx.lawman_events().is_empty());
        assert!(fx.outlaw_events().is_empty());

        fx.fire(TimerKind::StartRound);
        assert_eq!(fx.state().phase, RoundPhase::BuyTime);
        assert_eq!(fx.state().round, 2);
    }

    #[tokio::test]
    async fn test_rounds_advance_until_nine() {
        let mut fx = Fixture::new();
        fx.game.start(fx.handle.clone());

        for expected_round in 1..=9 {
            fx.fire(TimerKind::StartRound);
            assert_eq!(fx.state().round, expected_round);
            fx.fire(TimerKind::EndBuyTime);
            fx.fire(TimerKind::RoundTimer);
            assert_eq!(fx.state().phase, RoundPhase::End);
        }

        assert!(fx.state().finished);
        assert_eq!(fx.state().score.lawmen, 9);
        let events = fx.outlaw_events();
        assert_eq!(
            events.last(),
            Some(&ServerEvent::MatchEnd {
                winner: Some(Team::Lawmen),
                final_score: Scoreboard { lawmen: 9, outlaws: 0 },
            })
        );

        // No tenth round
        fx.fire(TimerKind::StartRound);
        assert_eq!(fx.state().phase, RoundPhase::End);
        assert_eq!(fx.state().round, 9);
        assert!(fx.outlaw_events().is_empty());
    }

    #[tokio::test]
    async fn test_round_cap_draw() {
        let mut fx = Fixture::new();
        fx.to_active();
        fx.game.state.round = MAX_ROUNDS;
        fx.game.state.score = Scoreboard { lawmen: 7, outlaws: 8 };

        fx.fire(TimerKind::RoundTimer);
        assert!(fx.state().finished);
        assert_eq!(
            fx.lawman_events().last(),
            Some(&ServerEvent::MatchEnd {
                winner: None,
                final_score: Scoreboard { lawmen: 8, outlaws: 8 },
            })
        );
    }

    #[tokio::test]
    async fn test_buy_with_insufficient_funds() {
        let mut fx = Fixture::new();
        fx.to_buy_time();
        let lawman = fx.lawman;

        fx.act(lawman, ClientAction::BuyWeapon { weapon_type: WeaponType::Shotgun });
        assert_eq!(
            fx.lawman_events(),
            vec![ServerEvent::BuyFailed {
                reason: "insufficient_funds".to_string()
            }]
        );
        let player = fx.player(lawman);
        assert_eq!(player.loadout.money, 800);
        assert_eq!(player.loadout.primary, WeaponType::Revolver);
    }

    #[tokio::test]
    async fn test_buy_success_and_phase_gate() {
        let mut fx = Fixture::new();
        fx.to_buy_time();
        let outlaw = fx.outlaw;

        fx.act(outlaw, ClientAction::BuyWeapon { weapon_type: WeaponType::Dynamite });
        assert_eq!(
            fx.outlaw_events(),
            vec![ServerEvent::BuySuccess {
                weapon_type: WeaponType::Dynamite,
                money: 200
            }]
        );

        fx.fire(TimerKind::EndBuyTime);
        fx.clear();
        fx.act(outlaw, ClientAction::BuyWeapon { weapon_type: WeaponType::Revolver });
        assert_eq!(
            fx.outlaw_events(),
            vec![ServerEvent::BuyFailed {
                reason: "not_buy_time".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_dry_fire_sends_nothing() {
        let mut fx = Fixture::new();
        fx.to_active();
        let lawman = fx.lawman;
        fx.player(lawman).loadout.primary_ammo = 0;
        fx.player(lawman).loadout.secondary_ammo = 0;
        let rng_before = fx.game.rng.clone();

        fx.act(lawman, ClientAction::Shoot { shot: ShotVector::default() });

        assert!(fx.outlaw_events().is_empty());
        assert!(fx.lawman_events().is_empty());
        // No roll consumed
        assert_eq!(fx.game.rng.get_word_pos(), rng_before.get_word_pos());
    }

    #[tokio::test]
    async fn test_shot_forwarded_and_ammo_spent() {
        let mut fx = Fixture::new();
        fx.to_active();
        let lawman = fx.lawman;
        let shot = ShotVector {
            origin_x: 1.0,
            dir_z: 1.0,
            ..Default::default()
        };

        fx.act(lawman, ClientAction::Shoot { shot });
        assert_eq!(fx.player(lawman).loadout.current_ammo(), 5);
        assert_eq!(
            fx.outlaw_events().first(),
            Some(&ServerEvent::EnemyShoot {
                shot,
                weapon_type: WeaponType::Revolver
            })
        );
    }

    #[tokio::test]
    async fn test_dynamite_shot_kills_and_ends_round() {
        let mut fx = Fixture::new();
        fx.to_buy_time();
        let (lawman, outlaw) = (fx.lawman, fx.outlaw);
        fx.act(lawman, ClientAction::BuyWeapon { weapon_type: WeaponType::Dynamite });
        fx.fire(TimerKind::EndBuyTime);
        fx.clear();

        fx.act(lawman, ClientAction::Shoot { shot: ShotVector::default() });

        let outlaw_events = fx.outlaw_events();
        assert!(matches!(outlaw_events[0], ServerEvent::EnemyShoot { .. }));
        assert!(matches!(outlaw_events[1], ServerEvent::Hit { health: 0, .. }));
        assert_eq!(outlaw_events[2], ServerEvent::PlayerDied {});
        assert_eq!(
            reason_of(&outlaw_events),
            Some((Team::Lawmen, RoundEndReason::OutlawsEliminated))
        );

        let lawman_events = fx.lawman_events();
        assert!(matches!(lawman_events[0], ServerEvent::HitConfirmed { .. }));
        assert_eq!(lawman_events[1], ServerEvent::EnemyKilled { money: 700 });

        assert_eq!(fx.player(lawman).loadout.money, 700 + 4650);
        assert_eq!(fx.player(outlaw).loadout.money, 800 + 2800);
        assert!(!fx.player(outlaw).alive);
        assert_eq!(fx.state().phase, RoundPhase::End);
    }

    #[tokio::test]
    async fn test_last_lawman_eliminated_by_blast() {
        let mut fx = Fixture::with_settings(MatchSettings {
            distances: Arc::new(SparesOwner),
            ..Default::default()
        });
        fx.to_active();
        let outlaw = fx.outlaw;

        fx.act(
            outlaw,
            ClientAction::ExplosionDamage {
                position: Position::default(),
                radius: 10.0,
                damage: 150.0,
            },
        );

        assert_eq!(
            fx.lawman_events(),
            vec![
                ServerEvent::ExplosionDamage { damage: 150, health: 0 },
                ServerEvent::PlayerDied {},
                ServerEvent::RoundEnd {
                    round: 1,
                    winner: Team::Outlaws,
                    reason: RoundEndReason::LawmenEliminated,
                    lawmen_score: 0,
                    outlaws_score: 1,
                    money: 800 + 2800,
                },
            ]
        );
        assert_eq!(fx.outlaw_events()[0], ServerEvent::EnemyKilled { money: 1300 });
        assert!(fx.player(outlaw).alive);
        assert_eq!(fx.state().blasts.len(), 1);
    }

    #[tokio::test]
    async fn test_round_timers_after_early_elimination_are_ignored() {
        let mut fx = Fixture::with_settings(MatchSettings {
            distances: Arc::new(SparesOwner),
            ..Default::default()
        });
        fx.to_active();
        let outlaw = fx.outlaw;

        fx.act(
            outlaw,
            ClientAction::ExplosionDamage {
                position: Position::default(),
                radius: 10.0,
                damage: 150.0,
            },
        );
        assert_eq!(fx.state().phase, RoundPhase::End);
        assert_eq!(fx.state().round, 2);
        fx.clear();

        // Timers scheduled for round 1 still fire after it ended early
        for (kind, phase) in [
            (TimerKind::RoundTimer, RoundPhase::Active),
            (TimerKind::EndBuyTime, RoundPhase::BuyTime),
            (TimerKind::BombExploded, RoundPhase::Active),
        ] {
            fx.game.handle_timer(TimerSignal { kind, round: 1, phase });
        }

        assert_eq!(fx.state().score, Scoreboard { lawmen: 0, outlaws: 1 });
        assert_eq!(fx.state().round, 2);
        assert_eq!(fx.state().phase, RoundPhase::End);
        assert!(fx.lawman_events().is_empty());
        assert!(fx.outlaw_events().is_empty());
    }

    #[tokio::test]
    async fn test_health_only_falls_within_a_life() {
        let mut fx = Fixture::new();
        fx.to_active();
        let lawman = fx.lawman;

        assert_eq!(fx.game.wound(lawman, 40), Some(Wound { health: 60, died: false }));
        assert_eq!(fx.game.wound(lawman, 70), Some(Wound { health: -10, died: true }));
        assert_eq!(fx.game.wound(lawman, 10), None);
        assert!(!fx.player(lawman).alive);
        assert_eq!(fx.player(lawman).health, -10);
    }

    #[tokio::test]
    async fn test_bomb_rules() {
        let mut fx = Fixture::new();
        fx.to_active();
        let (lawman, outlaw) = (fx.lawman, fx.outlaw);

        // Defuse before plant, plant by the wrong team
        fx.act(lawman, ClientAction::DefuseBomb {});
        fx.act(lawman, ClientAction::PlantBomb {});
        assert!(!fx.state().bomb.planted);
        assert!(fx.lawman_events().is_empty());

        fx.act(outlaw, ClientAction::PlantBomb {});
        let planted = ServerEvent::BombPlanted {
            planted_by: "Outlaw".to_string(),
        };
        assert_eq!(fx.lawman_events(), vec![planted.clone()]);
        assert_eq!(fx.outlaw_events(), vec![planted]);
        assert!(fx.state().bomb_planted_at.is_some());

        // Second plant and outlaw defuse are no-ops
        fx.act(outlaw, ClientAction::PlantBomb {});
        fx.act(outlaw, ClientAction::DefuseBomb {});
        assert!(fx.outlaw_events().is_empty());
        assert!(!fx.state().bomb.defused);

        fx.act(lawman, ClientAction::DefuseBomb {});
        let events = fx.lawman_events();
        assert_eq!(
            events[0],
            ServerEvent::BombDefused {
                defused_by: "Sheriff".to_string()
            }
        );
        assert_eq!(reason_of(&events), Some((Team::Lawmen, RoundEndReason::BombDefused)));
        assert_eq!(fx.player(lawman).loadout.money, 800 + 4650 + 250 + 300);
        assert_eq!(fx.player(outlaw).loadout.money, 800 + 2800);

        // Already defused
        fx.act(lawman, ClientAction::DefuseBomb {});
        assert!(fx.lawman_events().is_empty());
    }

    #[tokio::test]
    async fn test_fuse_from_previous_round_is_ignored() {
        let mut fx = Fixture::new();
        fx.to_active();
        let outlaw = fx.outlaw;
        fx.act(outlaw, ClientAction::PlantBomb {});
        let fuse = TimerSignal {
            kind: TimerKind::BombExploded,
            round: 1,
            phase: RoundPhase::Active,
        };

        fx.fire(TimerKind::RoundTimer);
        fx.fire(TimerKind::StartRound);
        fx.fire(TimerKind::EndBuyTime);
        fx.act(outlaw, ClientAction::PlantBomb {});
        fx.clear();

        fx.game.handle_timer(fuse);
        assert_eq!(fx.state().phase, RoundPhase::Active);
        assert_eq!(fx.state().round, 2);
        assert!(fx.lawman_events().is_empty());
    }

    #[tokio::test]
    async fn test_move_relayed_in_any_phase() {
        let mut fx = Fixture::new();
        let lawman = fx.lawman;
        let mut data = Map::new();
        data.insert("x".to_string(), Value::from(3.5));

        fx.act(lawman, ClientAction::Move { data: data.clone() });
        assert_eq!(fx.outlaw_events(), vec![ServerEvent::EnemyMove { data }]);
        assert!(fx.lawman_events().is_empty());
    }

    #[tokio::test]
    async fn test_switch_and_reload() {
        let mut fx = Fixture::new();
        fx.to_buy_time();
        let lawman = fx.lawman;
        fx.act(lawman, ClientAction::BuyWeapon { weapon_type: WeaponType::Dynamite });
        fx.clear();

        fx.act(lawman, ClientAction::SwitchWeapon {});
        assert_eq!(
            fx.lawman_events(),
            vec![ServerEvent::WeaponSwitched {
                weapon_type: WeaponType::Revolver,
                ammo: 6
            }]
        );

        fx.player(lawman).loadout.secondary_ammo = 1;
        fx.act(lawman, ClientAction::Reload {});
        assert_eq!(
            fx.lawman_events(),
            vec![ServerEvent::Reloaded {
                weapon_type: WeaponType::Revolver,
                ammo: 6,
                reload_time_ms: 2000
            }]
        );
    }

    #[tokio::test]
    async fn test_combat_ignored_outside_active() {
        let mut fx = Fixture::new();
        fx.to_buy_time();
        let (lawman, outlaw) = (fx.lawman, fx.outlaw);

        fx.act(lawman, ClientAction::Shoot { shot: ShotVector::default() });
        fx.act(outlaw, ClientAction::PlantBomb {});
        assert_eq!(fx.player(lawman).loadout.current_ammo(), 6);
        assert!(!fx.state().bomb.planted);
        assert!(fx.outlaw_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bomb_explodes_after_fuse() {
        let fx = Fixture::new();
        let Fixture {
            game,
            handle,
            outlaw,
            mut lawman_rx,
            outlaw_rx: _outlaw_rx,
            ..
        } = fx;
        let submit = handle.clone();
        tokio::spawn(game.run(handle));

        let mut plant_at = None;
        loop {
            let Some(msg) = lawman_rx.recv().await else {
                panic!("match dropped the session");
            };
            let SessionMsg::Event(event) = msg else {
                continue;
            };
            match event {
                ServerEvent::BuyTimeEnd { .. } => {
                    submit.submit(outlaw, ClientAction::PlantBomb {});
                }
                ServerEvent::BombPlanted { .. } => plant_at = Some(Instant::now()),
                ServerEvent::RoundEnd { winner, reason, .. } => {
                    assert_eq!(winner, Team::Outlaws);
                    assert_eq!(reason, RoundEndReason::BombExploded);
                    let planted = plant_at.expect("bomb was planted");
                    assert!(planted.elapsed() >= Duration::from_secs(45));
                    break;
                }
                _ => {}
            }
        }
    }
}
