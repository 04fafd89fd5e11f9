//! Match task: drives one [`Engine`] on a fixed timer

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::protocol::{PlayerId, ServerMsg};

use super::engine::{Engine, MatchInput, MatchResult, Outbound, Recipient};

/// Outbound queue of one connection
pub type PeerTx = mpsc::Sender<ServerMsg>;

/// Intents buffered per match between ticks
const INPUT_BUFFER: usize = 1024;

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub room_id: String,
    input_tx: mpsc::Sender<MatchInput>,
    shutdown: Arc<Notify>,
}

impl MatchHandle {
    /// Forward an intent without waiting; returns false when the buffer is
    /// full or the match is gone
    pub fn send(&self, input: MatchInput) -> bool {
        match self.input_tx.try_send(input) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(room_id = %self.room_id, "Match input buffer full, dropping intent");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the match to stop at its next wake-up
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.input_tx.is_closed()
    }
}

/// What a finished match reports back to the directory
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub match_id: Uuid,
    pub room_id: String,
    pub result: Option<MatchResult>,
}

/// The authoritative game match
pub struct GameMatch {
    id: Uuid,
    room_id: String,
    engine: Engine,
    peers: HashMap<PlayerId, PeerTx>,
    input_rx: mpsc::Receiver<MatchInput>,
    shutdown: Arc<Notify>,
    tick_duration: Duration,
    countdown: Duration,
}

impl GameMatch {
    /// Create a match for a fixed set of participants
    pub fn new(
        room_id: String,
        peers: Vec<(PlayerId, PeerTx)>,
        config: GameConfig,
        seed: u64,
    ) -> (Self, MatchHandle) {
        let id = Uuid::new_v4();
        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let shutdown = Arc::new(Notify::new());

        let handle = MatchHandle {
            id,
            room_id: room_id.clone(),
            input_tx,
            shutdown: shutdown.clone(),
        };

        let participants: Vec<PlayerId> = peers.iter().map(|(id, _)| *id).collect();
        let tick_duration = Duration::from_secs_f64(1.0 / f64::from(config.tick_rate.max(1)));
        let countdown = Duration::from_secs(config.countdown_secs);

        let game_match = Self {
            id,
            engine: Engine::new(room_id.clone(), &participants, config, seed),
            room_id,
            peers: peers.into_iter().collect(),
            input_rx,
            shutdown,
            tick_duration,
            countdown,
        };

        (game_match, handle)
    }

    /// Countdown, then the authoritative tick loop until the match ends or
    /// is shut down
    pub async fn run(mut self) -> MatchOutcome {
        info!(match_id = %self.id, room_id = %self.room_id, players = self.peers.len(), "Match created");

        let out = self.engine.initialize();
        self.dispatch(out);

        let shutdown = self.shutdown.clone();

        if !self.run_countdown(&shutdown).await {
            self.engine.shutdown();
            return self.outcome();
        }

        let out = self.engine.start();
        self.dispatch(out);

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    self.engine.shutdown();
                    break;
                }
                _ = tick_interval.tick() => {
                    // Drain input queue
                    while let Ok(input) = self.input_rx.try_recv() {
                        self.engine.enqueue(input);
                    }

                    let out = self.engine.tick();
                    self.dispatch(out);

                    if self.engine.is_ended() {
                        break;
                    }
                }
            }
        }

        self.outcome()
    }

    /// Wait out the countdown, buffering intents. Returns false on shutdown.
    async fn run_countdown(&mut self, shutdown: &Notify) -> bool {
        let deadline = sleep(self.countdown);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => return false,
                _ = &mut deadline => return true,
                Some(input) = self.input_rx.recv() => self.engine.enqueue(input),
            }
        }
    }

    /// Deliver without blocking the tick; slow or gone peers miss messages
    fn dispatch(&self, out: Vec<Outbound>) {
        for Outbound { to, msg } in out {
            match to {
                Recipient::All => {
                    for (player_id, tx) in &self.peers {
                        self.deliver(player_id, tx, msg.clone());
                    }
                }
                Recipient::Player(player_id) => {
                    if let Some(tx) = self.peers.get(&player_id) {
                        self.deliver(&player_id, tx, msg);
                    }
                }
            }
        }
    }

    fn deliver(&self, player_id: &PlayerId, tx: &PeerTx, msg: ServerMsg) {
        if let Err(TrySendError::Full(_)) = tx.try_send(msg) {
            debug!(room_id = %self.room_id, player_id = %player_id, "Peer lagging, message dropped");
        }
    }

    fn outcome(&self) -> MatchOutcome {
        MatchOutcome {
            match_id: self.id,
            room_id: self.room_id.clone(),
            result: self.engine.result(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::EndReason;

    fn fast_config() -> GameConfig {
        GameConfig {
            countdown_secs: 0,
            ..GameConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_player_hands_the_win_to_the_other() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = mpsc::channel(4096);
        let (tx_b, _rx_b) = mpsc::channel(4096);

        let (game, handle) = GameMatch::new("room".into(), vec![(a, tx_a), (b, tx_b)], fast_config(), 5);
        let task = tokio::spawn(game.run());

        assert!(handle.send(MatchInput::Disconnect { player_id: b }));
        let outcome = task.await.unwrap();

        let result = outcome.result.unwrap();
        assert_eq!(result.winner, Some(a));
        assert_eq!(result.reason, EndReason::LastStanding);
        assert_eq!(outcome.room_id, "room");

        let first = rx_a.recv().await.unwrap();
        assert!(matches!(first, ServerMsg::BoardDimensions { .. }));

        let mut saw_winner = false;
        while let Ok(msg) = rx_a.try_recv() {
            if let ServerMsg::Winner { player_id } = msg {
                assert_eq!(player_id, Some(a));
                saw_winner = true;
            }
        }
        assert!(saw_winner);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_countdown_ends_without_winner() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, _rx_a) = mpsc::channel(64);
        let (tx_b, _rx_b) = mpsc::channel(64);

        let (game, handle) = GameMatch::new("room".into(), vec![(a, tx_a), (b, tx_b)], GameConfig::default(), 5);
        handle.shutdown();
        let outcome = game.run().await;

        let result = outcome.result.unwrap();
        assert_eq!(result.reason, EndReason::Shutdown);
        assert_eq!(result.winner, None);
    }

    #[tokio::test(start_paused = true)]
    async fn full_peer_queue_does_not_stall_the_match() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, _rx_a) = mpsc::channel(1);
        let (tx_b, _rx_b) = mpsc::channel(1);
        let config = GameConfig {
            countdown_secs: 0,
            match_seconds: 1,
            ..GameConfig::default()
        };

        let (game, _handle) = GameMatch::new("room".into(), vec![(a, tx_a), (b, tx_b)], config, 5);
        let outcome = game.run().await;
        assert!(outcome.result.is_some());
    }
}
