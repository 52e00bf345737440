//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::game::SessionId;
use crate::ws::session::SessionHandle;

/// A connected session known to matchmaking
#[derive(Debug, Clone)]
pub struct PlayerStatus {
    pub handle: SessionHandle,
    /// False once paired into a match
    pub free: bool,
    pub queued_at: Instant,
}

impl PlayerStatus {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            free: true,
            queued_at: Instant::now(),
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// Registered sessions in arrival order
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    players: VecDeque<PlayerStatus>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Returns false if it was already registered.
    pub fn register(&mut self, handle: SessionHandle) -> bool {
        if self.contains(&handle.id) {
            return false;
        }
        self.players.push_back(PlayerStatus::new(handle));
        true
    }

    /// Remove a session
    pub fn unregister(&mut self, id: SessionId) -> Option<PlayerStatus> {
        let pos = self.players.iter().position(|p| p.handle.id == id)?;
        self.players.remove(pos)
    }

    /// Drop sessions whose mailbox is gone. Returns how many were removed.
    pub fn prune_closed(&mut self) -> usize {
        let before = self.players.len();
        self.players.retain(|p| !p.handle.is_closed());
        before - self.players.len()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.players.iter().any(|p| &p.handle.id == id)
    }

    /// Registered sessions, free or paired
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Players waiting for a match
    pub fn waiting(&self) -> usize {
        self.players.iter().filter(|p| p.free).count()
    }

    /// Players already paired
    pub fn in_match(&self) -> usize {
        self.players.len() - self.waiting()
    }

    /// Take the two longest-waiting free players and mark them paired.
    /// Returns `None` (and changes nothing) with fewer than two free.
    pub fn try_pair(&mut self) -> Option<(PlayerStatus, PlayerStatus)> {
        let mut free = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.free)
            .map(|(i, _)| i);
        let (first, second) = (free.next()?, free.next()?);

        self.players[first].free = false;
        self.players[second].free = false;

        Some((self.players[first].clone(), self.players[second].clone()))
    }
}
