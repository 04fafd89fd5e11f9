//! Match directory - owns every session and routes intents to running matches

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::{
    MatchInput, MatchOutcome, MatchSession, PeerTx, SessionError, SessionSummary,
};
use crate::ws::protocol::{PlayerId, ServerMsg};

/// Registry of sessions plus the outbound queue of every connection
pub struct MatchDirectory {
    /// Single writer for session membership and lifecycle
    sessions: Mutex<HashMap<String, MatchSession>>,
    /// Connected peers
    peers: DashMap<PlayerId, PeerTx>,
    /// Map of player -> current room
    memberships: DashMap<PlayerId, String>,
    game: GameConfig,
    max_room_size: usize,
}

impl MatchDirectory {
    pub fn new(game: GameConfig, max_room_size: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            peers: DashMap::new(),
            memberships: DashMap::new(),
            game,
            max_room_size,
        }
    }

    /// Register a connection's outbound queue (called when WebSocket connects)
    pub fn register_connection(&self, id: PlayerId, tx: PeerTx) {
        self.peers.insert(id, tx);
        debug!(player_id = %id, "Connection registered");
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    #[cfg(test)]
    pub fn room_of(&self, id: &PlayerId) -> Option<String> {
        self.memberships.get(id).map(|r| r.value().clone())
    }

    pub fn create_session(
        &self,
        creator: PlayerId,
        room_id: String,
        target_size: usize,
    ) -> Result<(), SessionError> {
        if !(2..=self.max_room_size).contains(&target_size) {
            return Err(SessionError::InvalidSize {
                size: target_size,
                max: self.max_room_size,
            });
        }
        if self.memberships.contains_key(&creator) {
            return Err(SessionError::AlreadyInSession);
        }

        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&room_id) {
            return Err(SessionError::RoomExists(room_id));
        }

        sessions.insert(
            room_id.clone(),
            MatchSession::new(room_id.clone(), target_size, creator),
        );
        self.memberships.insert(creator, room_id.clone());

        info!(room_id = %room_id, player_id = %creator, target_size, "Session created");
        Ok(())
    }

    pub fn join_session(&self, player: PlayerId, room_id: &str) -> Result<(), SessionError> {
        if self.memberships.contains_key(&player) {
            return Err(SessionError::AlreadyInSession);
        }

        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(room_id)
            .ok_or_else(|| SessionError::RoomNotFound(room_id.to_string()))?;
        session.add_participant(player)?;
        self.memberships.insert(player, room_id.to_string());

        info!(
            room_id = %room_id,
            player_id = %player,
            players = session.participants().len(),
            "Player joined session"
        );
        Ok(())
    }

    /// Leave the current session. A lobby that empties is dropped; a running
    /// match kills the player and carries on.
    pub fn leave_session(&self, player: PlayerId) -> Result<(), SessionError> {
        let (_, room_id) = self
            .memberships
            .remove(&player)
            .ok_or(SessionError::NotInSession)?;

        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(&room_id) else {
            return Ok(());
        };
        session.remove_participant(player);

        info!(room_id = %room_id, player_id = %player, "Player left session");

        if session.is_empty() && !session.is_started() {
            sessions.remove(&room_id);
            info!(room_id = %room_id, "Empty session removed");
        }
        Ok(())
    }

    /// Start the match of `room_id` and spawn its task
    pub fn start_match(
        self: &Arc<Self>,
        requester: PlayerId,
        room_id: &str,
    ) -> Result<(), SessionError> {
        let game = {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get_mut(room_id)
                .ok_or_else(|| SessionError::RoomNotFound(room_id.to_string()))?;
            session.check_start(requester)?;

            let peers: Vec<(PlayerId, PeerTx)> = session
                .participants()
                .iter()
                .filter_map(|id| self.peers.get(id).map(|tx| (*id, tx.value().clone())))
                .collect();

            session.start(requester, peers, self.game.clone(), rand::random())?
        };

        let directory = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = game.run().await;
            directory.finish_match(outcome);
        });

        info!(room_id = %room_id, player_id = %requester, "Match starting");
        Ok(())
    }

    /// Forward an in-match intent from connection `from`. Intents naming
    /// another room or another player are dropped.
    pub fn route(&self, from: PlayerId, room_id: &str, input: MatchInput) -> bool {
        let claimed = match &input {
            MatchInput::Move { player_id, .. }
            | MatchInput::UseItem { player_id }
            | MatchInput::Shoot { player_id, .. }
            | MatchInput::Disconnect { player_id } => *player_id,
        };
        if claimed != from {
            debug!(player_id = %from, claimed = %claimed, "Dropped intent for another player");
            return false;
        }

        let in_room = self
            .memberships
            .get(&from)
            .is_some_and(|r| r.value() == room_id);
        if !in_room {
            debug!(player_id = %from, room_id = %room_id, "Dropped intent for another room");
            return false;
        }

        self.sessions
            .lock()
            .get(room_id)
            .is_some_and(|session| session.route(input))
    }

    /// Remove a session and stop its match if one runs
    pub fn destroy_session(&self, room_id: &str) -> bool {
        let Some(session) = self.sessions.lock().remove(room_id) else {
            return false;
        };
        session.shutdown();
        for id in session.participants() {
            self.memberships.remove_if(id, |_, room| room == room_id);
        }
        info!(room_id = %room_id, "Session destroyed");
        true
    }

    /// Called by the match task once it returns
    fn finish_match(&self, outcome: MatchOutcome) {
        let current = self
            .sessions
            .lock()
            .get(&outcome.room_id)
            .and_then(|s| s.handle().map(|h| h.id));

        // The room may have been destroyed and recreated meanwhile
        if current != Some(outcome.match_id) {
            return;
        }

        match outcome.result {
            Some(result) => info!(
                room_id = %outcome.room_id,
                winner = ?result.winner,
                reason = ?result.reason,
                ticks = result.ticks,
                "Match finished"
            ),
            None => warn!(room_id = %outcome.room_id, "Match finished without a result"),
        }

        self.destroy_session(&outcome.room_id);
    }

    /// Sessions still waiting for players
    pub fn open_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.lock();
        let mut open: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| !s.is_started() && !s.is_full())
            .map(MatchSession::summary)
            .collect();
        open.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        open
    }

    pub fn active_matches(&self) -> usize {
        self.sessions.lock().values().filter(|s| s.is_started()).count()
    }

    /// Connection closed: drop the outbound queue and leave any session
    pub fn disconnect(&self, id: PlayerId) {
        self.peers.remove(&id);
        if self.leave_session(id).is_ok() {
            debug!(player_id = %id, "Disconnected player left their session");
        }
    }

    /// Direct message to one connection, dropped if its queue is full
    pub fn send_to(&self, id: &PlayerId, msg: ServerMsg) -> bool {
        self.peers
            .get(id)
            .is_some_and(|tx| tx.value().try_send(msg).is_ok())
    }

    /// Stop every running match (server shutdown)
    pub fn shutdown_all(&self) {
        let sessions = self.sessions.lock();
        for session in sessions.values() {
            session.shutdown();
        }
        info!(sessions = sessions.len(), "Shutting down all sessions");
    }
}

/// Connection ids are player ids
pub fn new_connection_id() -> PlayerId {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::MoveInput;
    use crate::ws::protocol::Movement;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    fn directory() -> Arc<MatchDirectory> {
        let game = GameConfig {
            countdown_secs: 0,
            ..GameConfig::default()
        };
        Arc::new(MatchDirectory::new(game, 8))
    }

    fn connect(dir: &MatchDirectory) -> (PlayerId, mpsc::Receiver<ServerMsg>) {
        let id = new_connection_id();
        let (tx, rx) = mpsc::channel(4096);
        dir.register_connection(id, tx);
        (id, rx)
    }

    #[tokio::test]
    async fn create_join_and_list() {
        let dir = directory();
        let (a, _ra) = connect(&dir);
        let (b, _rb) = connect(&dir);
        let (c, _rc) = connect(&dir);

        assert_ok!(dir.create_session(a, "alpha".into(), 3));
        assert_eq!(
            dir.create_session(b, "alpha".into(), 2),
            Err(SessionError::RoomExists("alpha".into()))
        );
        assert_err!(dir.create_session(b, "beta".into(), 1));
        assert_err!(dir.create_session(b, "beta".into(), 9));

        assert_ok!(dir.join_session(b, "alpha"));
        assert_eq!(dir.join_session(b, "alpha"), Err(SessionError::AlreadyInSession));
        assert_eq!(
            dir.join_session(c, "nope"),
            Err(SessionError::RoomNotFound("nope".into()))
        );

        let open = dir.open_sessions();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].players, 2);
        assert_eq!(open[0].target_size, 3);

        assert_ok!(dir.join_session(c, "alpha"));
        assert!(dir.open_sessions().is_empty());
    }

    #[tokio::test]
    async fn last_leaver_removes_lobby() {
        let dir = directory();
        let (a, _ra) = connect(&dir);
        let (b, _rb) = connect(&dir);

        assert_ok!(dir.create_session(a, "r".into(), 2));
        assert_ok!(dir.join_session(b, "r"));
        assert_ok!(dir.leave_session(a));
        assert_eq!(dir.leave_session(a), Err(SessionError::NotInSession));

        // b inherited the session and can still be joined
        assert_eq!(dir.open_sessions().len(), 1);
        dir.disconnect(b);
        assert!(dir.open_sessions().is_empty());
        assert_eq!(dir.connection_count(), 1);
    }

    #[tokio::test]
    async fn start_is_gated_on_quorum_and_initiator() {
        let dir = directory();
        let (a, _ra) = connect(&dir);
        let (b, _rb) = connect(&dir);

        assert_ok!(dir.create_session(a, "r".into(), 2));
        assert!(matches!(
            dir.start_match(a, "r"),
            Err(SessionError::NotEnoughPlayers { .. })
        ));
        assert_ok!(dir.join_session(b, "r"));
        assert_eq!(dir.start_match(b, "r"), Err(SessionError::NotInitiator));
        assert_ok!(dir.start_match(a, "r"));
        assert_eq!(dir.start_match(a, "r"), Err(SessionError::AlreadyStarted));
        assert_eq!(dir.active_matches(), 1);

        dir.shutdown_all();
    }

    #[tokio::test]
    async fn intents_are_checked_against_sender_and_room() {
        let dir = directory();
        let (a, _ra) = connect(&dir);
        let (b, _rb) = connect(&dir);
        assert_ok!(dir.create_session(a, "r".into(), 2));
        assert_ok!(dir.join_session(b, "r"));

        let input = |player_id| MatchInput::Move {
            player_id,
            input: MoveInput {
                press_time: 0.016,
                movement: Movement::default(),
                ts: 1,
            },
        };

        // Not started yet
        assert!(!dir.route(a, "r", input(a)));

        assert_ok!(dir.start_match(a, "r"));
        assert!(dir.route(a, "r", input(a)));
        assert!(!dir.route(a, "r", input(b)));
        assert!(!dir.route(a, "other", input(a)));

        dir.shutdown_all();
    }

    #[tokio::test]
    async fn finished_match_tears_down_its_session() {
        let dir = directory();
        let (a, mut ra) = connect(&dir);
        let (b, _rb) = connect(&dir);
        assert_ok!(dir.create_session(a, "r".into(), 2));
        assert_ok!(dir.join_session(b, "r"));
        assert_ok!(dir.start_match(a, "r"));

        // b walks out mid-match, a wins
        assert_ok!(dir.leave_session(b));

        let winner = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match ra.recv().await {
                    Some(ServerMsg::Winner { player_id }) => break player_id,
                    Some(_) => continue,
                    None => break None,
                }
            }
        })
        .await;
        assert_eq!(assert_ok!(winner), Some(a));

        tokio::time::timeout(Duration::from_secs(5), async {
            while dir.room_of(&a).is_some() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(dir.active_matches(), 0);

        // Room name is free again
        assert_ok!(dir.create_session(a, "r".into(), 2));
    }
}
