//! Session actor - one per connected client
//!
//! Bridges a text-frame transport and the actor mesh. A reader task decodes
//! inbound frames into the session mailbox; the session loop forwards actions
//! to its match and writes match events back out.

use futures::{Sink, SinkExt, Stream, StreamExt};
use std::hash::{Hash, Hasher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::game::{MatchHandle, SessionId};
use crate::matchmaking::MatchmakingHandle;
use crate::util::rate_limit::PlayerRateLimiter;

use super::protocol::{decode_client_frame, ClientAction, Inbound, ProtocolError, ServerEvent};

/// Transport-level failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),

    #[error("connection closed")]
    Closed,
}

/// Why a session ended
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("client disconnected")]
    Disconnected,
}

/// Session mailbox messages
#[derive(Debug)]
pub enum SessionMsg {
    /// Matchmaking placed us in a match
    MatchAssigned(MatchHandle),
    /// Event to write to the client
    Event(ServerEvent),
    /// Decoded client action, posted by the reader
    Inbound(ClientAction),
    /// Reader finished, queued messages ahead of this are still handled
    Terminate(SessionError),
}

/// Address of a session
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    tx: mpsc::UnboundedSender<SessionMsg>,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, tx: mpsc::UnboundedSender<SessionMsg>) -> Self {
        Self { id, tx }
    }

    /// Returns false if the session is gone
    pub fn send(&self, msg: SessionMsg) -> bool {
        self.tx.send(msg).is_ok()
    }

    pub fn send_event(&self, event: ServerEvent) -> bool {
        self.send(SessionMsg::Event(event))
    }

    pub fn assign_match(&self, handle: MatchHandle) -> bool {
        self.send(SessionMsg::MatchAssigned(handle))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionHandle {}

impl Hash for SessionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A connected client
pub struct Session<St, Si> {
    handle: SessionHandle,
    mailbox: mpsc::UnboundedReceiver<SessionMsg>,
    matchmaking: MatchmakingHandle,
    current_match: Option<MatchHandle>,
    stream: Option<St>,
    sink: Si,
}

impl<St, Si> Session<St, Si>
where
    St: Stream<Item = Result<String, TransportError>> + Send + Unpin + 'static,
    Si: Sink<String, Error = TransportError> + Unpin,
{
    pub fn new(matchmaking: MatchmakingHandle, stream: St, sink: Si) -> Self {
        let (tx, mailbox) = mpsc::unbounded_channel();
        Self {
            handle: SessionHandle::new(SessionId::new(), tx),
            mailbox,
            matchmaking,
            current_match: None,
            stream: Some(stream),
            sink,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Run until the client goes away or breaks the protocol
    pub async fn run(mut self) -> Result<(), SessionError> {
        let id = self.handle.id;
        info!(session_id = %id, "Session started");

        self.matchmaking.register(self.handle.clone());

        let reader = self.stream.take().map(|stream| {
            tokio::spawn(read_frames(stream, self.handle.clone(), PlayerRateLimiter::new()))
        });

        let result = self.serve().await;

        self.matchmaking.unregister(id);
        if let Some(reader) = reader {
            reader.abort();
        }
        if let Err(e) = self.sink.close().await {
            debug!(session_id = %id, error = %e, "Sink close failed");
        }

        match &result {
            Ok(()) => info!(session_id = %id, "Session closed"),
            Err(e) => warn!(session_id = %id, error = %e, "Session terminated"),
        }
        result
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                SessionMsg::MatchAssigned(handle) => {
                    info!(session_id = %self.handle.id, match_id = %handle.id, "Joined match");
                    self.current_match = Some(handle);
                }
                SessionMsg::Event(event) => self.write(&event).await?,
                SessionMsg::Inbound(action) => self.forward(action),
                SessionMsg::Terminate(SessionError::Disconnected) => return Ok(()),
                SessionMsg::Terminate(reason) => return Err(reason),
            }
        }
        Ok(())
    }

    fn forward(&self, action: ClientAction) {
        let Some(current) = &self.current_match else {
            debug!(session_id = %self.handle.id, action = action.name(), "No match yet, action dropped");
            return;
        };

        if !current.submit(self.handle.id, action) {
            debug!(session_id = %self.handle.id, match_id = %current.id, "Match gone, action dropped");
        }
    }

    async fn write(&mut self, event: &ServerEvent) -> Result<(), SessionError> {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(session_id = %self.handle.id, error = %e, "Failed to encode event");
                return Ok(());
            }
        };

        self.sink.send(frame).await.map_err(SessionError::Transport)
    }
}

/// Reader task: frames in, mailbox messages out
async fn read_frames<St>(mut stream: St, session: SessionHandle, limiter: PlayerRateLimiter)
where
    St: Stream<Item = Result<String, TransportError>> + Unpin,
{
    let reason = loop {
        let text = match stream.next().await {
            Some(Ok(text)) => text,
            Some(Err(e)) => break SessionError::Transport(e),
            None => break SessionError::Disconnected,
        };

        // Every frame is decoded so a violation always ends the session.
        // Only movement is throttled, game actions always go through.
        match decode_client_frame(&text) {
            Ok(Inbound::Action(ClientAction::Move { .. })) if !limiter.check_input() => {
                debug!(session_id = %session.id, "Rate limited move");
            }
            Ok(Inbound::Action(action)) => {
                if !session.send(SessionMsg::Inbound(action)) {
                    return;
                }
            }
            Ok(Inbound::Unrecognized(action)) => {
                warn!(session_id = %session.id, %action, "Unknown action");
            }
            Err(e) => break SessionError::Protocol(e),
        }
    };

    session.send(SessionMsg::Terminate(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MatchId, MatchMsg};
    use crate::matchmaking::MatchmakingMsg;
    use crate::util::rate_limit::INPUT_RATE_LIMIT;
    use crate::ws::protocol::ShotVector;
    use futures::channel::mpsc as fmpsc;

    type Inbox = fmpsc::UnboundedSender<Result<String, TransportError>>;

    struct Harness {
        session: Session<
            fmpsc::UnboundedReceiver<Result<String, TransportError>>,
            futures::sink::SinkMapErr<
                fmpsc::UnboundedSender<String>,
                fn(fmpsc::SendError) -> TransportError,
            >,
        >,
        inbox: Inbox,
        outbox: fmpsc::UnboundedReceiver<String>,
        matchmaking_rx: mpsc::UnboundedReceiver<MatchmakingMsg>,
    }

    fn closed(_: fmpsc::SendError) -> TransportError {
        TransportError::Closed
    }

    fn harness() -> Harness {
        let (inbox, stream) = fmpsc::unbounded();
        let (sink, outbox) = fmpsc::unbounded::<String>();
        let (mm_tx, matchmaking_rx) = mpsc::unbounded_channel();
        let sink = sink.sink_map_err(closed as fn(fmpsc::SendError) -> TransportError);

        Harness {
            session: Session::new(MatchmakingHandle::new(mm_tx), stream, sink),
            inbox,
            outbox,
            matchmaking_rx,
        }
    }

    fn push(inbox: &Inbox, frame: &str) {
        inbox.unbounded_send(Ok(frame.to_string())).unwrap();
    }

    fn fake_match() -> (MatchHandle, mpsc::UnboundedReceiver<MatchMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MatchHandle::new(MatchId::new(), tx), rx)
    }

    #[tokio::test]
    async fn test_registers_and_unregisters() {
        let Harness {
            session,
            inbox,
            matchmaking_rx: mut mm_rx,
            ..
        } = harness();
        let id = session.handle().id;

        drop(inbox);
        tokio_test::assert_ok!(session.run().await);

        let Some(MatchmakingMsg::Register(handle)) = mm_rx.recv().await else {
            panic!("expected register");
        };
        assert_eq!(handle.id, id);
        assert!(matches!(mm_rx.recv().await, Some(MatchmakingMsg::Unregister(left)) if left == id));
    }

    #[tokio::test]
    async fn test_forwards_actions_to_assigned_match() {
        let Harness { session, inbox, .. } = harness();
        let handle = session.handle();
        let (game, mut match_rx) = fake_match();

        handle.assign_match(game);
        push(&inbox, r#"{"action":"shoot","originX":1}"#);
        push(&inbox, r#"{"action":"plant_bomb"}"#);
        drop(inbox);
        tokio_test::assert_ok!(session.run().await);

        let Some(MatchMsg::Action { from, action }) = match_rx.recv().await else {
            panic!("expected shoot");
        };
        assert_eq!(from, handle.id);
        assert_eq!(
            action,
            ClientAction::Shoot {
                shot: ShotVector {
                    origin_x: 1.0,
                    ..Default::default()
                }
            }
        );
        assert!(matches!(
            match_rx.recv().await,
            Some(MatchMsg::Action { action: ClientAction::PlantBomb {}, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_action_is_skipped() {
        let Harness { session, inbox, .. } = harness();
        let (game, mut match_rx) = fake_match();

        session.handle().assign_match(game);
        push(&inbox, r#"{"action":"dance","style":"jig"}"#);
        push(&inbox, r#"{"action":"reload"}"#);
        drop(inbox);
        tokio_test::assert_ok!(session.run().await);

        assert!(matches!(
            match_rx.recv().await,
            Some(MatchMsg::Action { action: ClientAction::Reload {}, .. })
        ));
    }

    #[tokio::test]
    async fn test_action_without_match_is_dropped() {
        let Harness { session, inbox, .. } = harness();

        push(&inbox, r#"{"action":"defuse_bomb"}"#);
        drop(inbox);
        tokio_test::assert_ok!(session.run().await);
    }

    #[tokio::test]
    async fn test_events_written_as_text_frames() {
        let Harness {
            session,
            inbox,
            mut outbox,
            ..
        } = harness();

        session.handle().send_event(ServerEvent::PlayerDied {});
        session
            .handle()
            .send_event(ServerEvent::EnemyKilled { money: 1100 });
        drop(inbox);
        tokio_test::assert_ok!(session.run().await);

        assert_eq!(outbox.next().await.as_deref(), Some(r#"{"action":"player_died"}"#));
        assert_eq!(
            outbox.next().await.as_deref(),
            Some(r#"{"action":"enemy_killed","money":1100}"#)
        );
        // Sink closed on exit
        assert_eq!(outbox.next().await, None);
    }

    #[tokio::test]
    async fn test_malformed_frame_terminates() {
        let Harness {
            session,
            inbox,
            matchmaking_rx: mut mm_rx,
            ..
        } = harness();

        push(&inbox, "{not json");
        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::Malformed(_)))
        ));

        assert!(matches!(mm_rx.recv().await, Some(MatchmakingMsg::Register(_))));
        assert!(matches!(mm_rx.recv().await, Some(MatchmakingMsg::Unregister(_))));
        drop(inbox);
    }

    #[tokio::test]
    async fn test_move_flood_never_drops_actions_or_hides_violations() {
        let Harness { session, inbox, .. } = harness();
        let (game, mut match_rx) = fake_match();

        session.handle().assign_match(game);
        for i in 0..40 {
            push(&inbox, &format!(r#"{{"action":"move","x":{i}}}"#));
        }
        push(&inbox, r#"{"action":"defuse_bomb"}"#);
        push(&inbox, "{not json");

        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::Malformed(_)))
        ));

        let mut moves = 0;
        let mut defused = false;
        while let Ok(MatchMsg::Action { action, .. }) = match_rx.try_recv() {
            match action {
                ClientAction::Move { .. } => moves += 1,
                ClientAction::DefuseBomb {} => defused = true,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(defused);
        assert!((INPUT_RATE_LIMIT as usize..40).contains(&moves), "{moves} moves");
        drop(inbox);
    }

    #[tokio::test]
    async fn test_bad_payload_terminates() {
        let Harness { session, inbox, .. } = harness();

        push(&inbox, r#"{"action":"buy_weapon","weapon_type":9}"#);
        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::InvalidPayload { .. }))
        ));
        drop(inbox);
    }

    #[tokio::test]
    async fn test_transport_error_terminates() {
        let Harness { session, inbox, .. } = harness();

        inbox.unbounded_send(Err(TransportError::Closed)).unwrap();
        let result = session.run().await;
        assert!(matches!(
            result,
            Err(SessionError::Transport(TransportError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_write_failure_ends_session() {
        let Harness {
            session,
            inbox,
            outbox,
            ..
        } = harness();
        drop(outbox);

        session.handle().send_event(ServerEvent::PlayerDied {});
        let result = session.run().await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
        // Reader still had an open stream
        drop(inbox);
    }

    #[tokio::test]
    async fn test_handle_identity() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = SessionId::new();
        let a = SessionHandle::new(id, tx.clone());
        let b = SessionHandle::new(id, tx);
        assert_eq!(a, b);
        assert!(!a.is_closed());
    }
}
