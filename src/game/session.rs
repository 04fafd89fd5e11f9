//! Match session: the lobby around one match

use serde::Serialize;
use thiserror::Error;

use crate::config::GameConfig;
use crate::ws::protocol::PlayerId;

use super::engine::MatchInput;
use super::r#match::{GameMatch, MatchHandle, PeerTx};

/// Session protocol misuse
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Room already exists: {0}")]
    RoomExists(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Room is full")]
    RoomFull,

    #[error("Match already started")]
    AlreadyStarted,

    #[error("Player is already in this room")]
    AlreadyJoined,

    #[error("Player is already in a session")]
    AlreadyInSession,

    #[error("Player is not in a session")]
    NotInSession,

    #[error("Only the session initiator can start the match")]
    NotInitiator,

    #[error("Waiting for players: {have}/{need}")]
    NotEnoughPlayers { have: usize, need: usize },

    #[error("Invalid session size {size}, expected 2..={max}")]
    InvalidSize { size: usize, max: usize },
}

/// Public listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub room_id: String,
    pub players: usize,
    pub target_size: usize,
}

pub struct MatchSession {
    room_id: String,
    target_size: usize,
    initiator: PlayerId,
    participants: Vec<PlayerId>,
    handle: Option<MatchHandle>,
}

impl MatchSession {
    pub fn new(room_id: String, target_size: usize, creator: PlayerId) -> Self {
        Self {
            room_id,
            target_size,
            initiator: creator,
            participants: vec![creator],
            handle: None,
        }
    }

    pub fn initiator(&self) -> PlayerId {
        self.initiator
    }

    pub fn participants(&self) -> &[PlayerId] {
        &self.participants
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.target_size
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&MatchHandle> {
        self.handle.as_ref()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            room_id: self.room_id.clone(),
            players: self.participants.len(),
            target_size: self.target_size,
        }
    }

    pub fn add_participant(&mut self, id: PlayerId) -> Result<(), SessionError> {
        if self.is_started() {
            return Err(SessionError::AlreadyStarted);
        }
        if self.participants.contains(&id) {
            return Err(SessionError::AlreadyJoined);
        }
        if self.is_full() {
            return Err(SessionError::RoomFull);
        }
        self.participants.push(id);
        Ok(())
    }

    /// Returns false if `id` was not a participant. Once the match runs the
    /// player is killed in-match instead.
    pub fn remove_participant(&mut self, id: PlayerId) -> bool {
        let Some(pos) = self.participants.iter().position(|p| *p == id) else {
            return false;
        };
        self.participants.remove(pos);

        if let Some(handle) = &self.handle {
            handle.send(MatchInput::Disconnect { player_id: id });
        }

        if self.initiator == id {
            if let Some(first) = self.participants.first() {
                self.initiator = *first;
            }
        }
        true
    }

    /// Gate and build the match; the caller spawns it
    pub fn start(
        &mut self,
        requester: PlayerId,
        peers: Vec<(PlayerId, PeerTx)>,
        config: GameConfig,
        seed: u64,
    ) -> Result<GameMatch, SessionError> {
        self.check_start(requester)?;

        let (game, handle) = GameMatch::new(self.room_id.clone(), peers, config, seed);
        self.handle = Some(handle);
        Ok(game)
    }

    pub fn check_start(&self, requester: PlayerId) -> Result<(), SessionError> {
        if self.is_started() {
            return Err(SessionError::AlreadyStarted);
        }
        if requester != self.initiator {
            return Err(SessionError::NotInitiator);
        }
        if !self.is_full() {
            return Err(SessionError::NotEnoughPlayers {
                have: self.participants.len(),
                need: self.target_size,
            });
        }
        Ok(())
    }

    /// Forward an in-match intent; dropped before the match starts
    pub fn route(&self, input: MatchInput) -> bool {
        self.handle.as_ref().is_some_and(|h| h.send(input))
    }

    pub fn shutdown(&self) {
        if let Some(handle) = &self.handle {
            handle.shutdown();
        }
    }
}
