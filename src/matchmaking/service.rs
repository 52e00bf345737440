//! Matchmaking service - pairs free sessions and spawns matches

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::game::{GameMatch, MatchId, MatchInfo, MatchRegistry, MatchSettings, SessionId};
use crate::ws::session::SessionHandle;

use super::queue::MatchmakingQueue;

/// Matchmaking mailbox messages
#[derive(Debug)]
pub enum MatchmakingMsg {
    Register(SessionHandle),
    Unregister(SessionId),
    /// Attempt a pairing
    Tick,
    Stats(oneshot::Sender<MatchmakingStats>),
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchmakingStats {
    pub waiting: usize,
    pub in_match: usize,
}

/// Address of the matchmaking actor
#[derive(Clone, Debug)]
pub struct MatchmakingHandle {
    tx: mpsc::UnboundedSender<MatchmakingMsg>,
}

impl MatchmakingHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<MatchmakingMsg>) -> Self {
        Self { tx }
    }

    pub fn register(&self, session: SessionHandle) {
        let _ = self.tx.send(MatchmakingMsg::Register(session));
    }

    pub fn unregister(&self, id: SessionId) {
        let _ = self.tx.send(MatchmakingMsg::Unregister(id));
    }

    /// `None` if matchmaking has stopped
    pub async fn stats(&self) -> Option<MatchmakingStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(MatchmakingMsg::Stats(reply)).ok()?;
        rx.await.ok()
    }
}

/// Matchmaking service
pub struct MatchmakingService {
    queue: MatchmakingQueue,
    registry: Arc<MatchRegistry>,
    settings: MatchSettings,
    mailbox: mpsc::UnboundedReceiver<MatchmakingMsg>,
    /// Weak so the ticker never keeps the service alive
    self_tx: mpsc::WeakUnboundedSender<MatchmakingMsg>,
}

impl MatchmakingService {
    pub fn new(registry: Arc<MatchRegistry>, settings: MatchSettings) -> (Self, MatchmakingHandle) {
        let (tx, mailbox) = mpsc::unbounded_channel();
        let service = Self {
            queue: MatchmakingQueue::new(),
            registry,
            settings,
            mailbox,
            self_tx: tx.downgrade(),
        };
        (service, MatchmakingHandle::new(tx))
    }

    /// Spawn the service plus a ticker posting `Tick` every `interval`
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(tx) = tx.upgrade() else { break };
                if tx.send(MatchmakingMsg::Tick).is_err() {
                    break;
                }
            }
        });

        tokio::spawn(self.run())
    }

    /// Process messages until every handle is dropped
    pub async fn run(mut self) {
        info!("Matchmaking service started");

        while let Some(msg) = self.mailbox.recv().await {
            self.handle(msg);
        }

        info!("Matchmaking service stopped");
    }

    fn handle(&mut self, msg: MatchmakingMsg) {
        match msg {
            MatchmakingMsg::Register(session) => {
                let id = session.id;
                if self.queue.register(session) {
                    info!(
                        session_id = %id,
                        registered = self.queue.len(),
                        waiting = self.queue.waiting(),
                        "Player registered"
                    );
                }
            }
            MatchmakingMsg::Unregister(id) => {
                if self.queue.unregister(id).is_some() {
                    info!(session_id = %id, "Player unregistered from matchmaking");
                }
            }
            MatchmakingMsg::Tick => self.pair(),
            MatchmakingMsg::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn stats(&self) -> MatchmakingStats {
        MatchmakingStats {
            waiting: self.queue.waiting(),
            in_match: self.queue.in_match(),
        }
    }

    fn pair(&mut self) {
        let pruned = self.queue.prune_closed();
        if pruned > 0 {
            debug!(pruned, "Dropped closed sessions");
        }

        if let Some((lawman, outlaw)) = self.queue.try_pair() {
            debug!(
                lawman_wait_ms = lawman.wait_time().as_millis() as u64,
                outlaw_wait_ms = outlaw.wait_time().as_millis() as u64,
                "Paired players"
            );
            self.create_match(lawman.handle, outlaw.handle);
        }
    }

    /// Spawn a match for two paired sessions
    fn create_match(&self, lawman: SessionHandle, outlaw: SessionHandle) {
        let match_id = MatchId::new();
        let seed = rand::random::<u64>();

        self.registry.insert(MatchInfo {
            id: match_id,
            lawman: lawman.id,
            outlaw: outlaw.id,
            created_at: Utc::now(),
        });

        info!(
            match_id = %match_id,
            lawman = %lawman.id,
            outlaw = %outlaw.id,
            "Created new match"
        );

        let (game_match, handle) =
            GameMatch::new(match_id, seed, lawman, outlaw, self.settings.clone());
        let registry = self.registry.clone();

        tokio::spawn(async move {
            game_match.run(handle).await;

            if let Some(info) = registry.remove(&match_id) {
                let lasted = Utc::now() - info.created_at;
                info!(
                    match_id = %match_id,
                    duration_secs = lasted.num_seconds(),
                    "Match removed from registry"
                );
            }
        });
    }
}
