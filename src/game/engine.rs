//! Authoritative simulation for one match
//!
//! The engine is synchronous and owns every entity of its match. The match
//! task feeds it intents and calls [`Engine::tick`] on a fixed timer; each
//! call returns the messages to deliver. Within a tick the order is fixed:
//! timed effects, item use, movement, projectiles, index rebuild, collisions,
//! state emission, spawning, field shrink, end check.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::ws::protocol::{PlayerId, ServerMsg, WeaponKind};

use super::combat::{CombatSystem, Kill, DEATH_LEFT, DEATH_STORM};
use super::entity::{
    Bomb, Bullet, Collidable, EntityId, EntityRef, ItemRules, MoveInput, Player, Positioned,
    Projectile, ProjectileKind, Tile,
};
use super::physics::{perimeter_positions, PlayingField};
use super::snapshot;
use super::spatial::{Aabb, QuadTree};

/// Lifecycle of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// Created, players not placed yet
    Lobby,
    /// Players placed, waiting for the first tick
    Countdown,
    /// Fixed-tick loop running
    Active,
    /// Terminal
    Ended,
}

/// Who a message goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Player(PlayerId),
}

#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: Recipient,
    pub msg: ServerMsg,
}

/// Player intent forwarded into the match
#[derive(Debug, Clone)]
pub enum MatchInput {
    Move {
        player_id: PlayerId,
        input: MoveInput,
    },
    UseItem {
        player_id: PlayerId,
    },
    Shoot {
        player_id: PlayerId,
        target_x: f32,
        target_y: f32,
    },
    /// Connection dropped or player left the session mid-match
    Disconnect {
        player_id: PlayerId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// One or zero players left alive
    LastStanding,
    /// Match clock ran out
    Timeout,
    /// Torn down from outside
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub winner: Option<PlayerId>,
    pub reason: EndReason,
    pub ticks: u64,
}

#[derive(Debug, Clone, Copy)]
struct ShotInput {
    player_id: PlayerId,
    target_x: f32,
    target_y: f32,
}

pub struct Engine {
    room_id: String,
    config: GameConfig,
    phase: EnginePhase,
    tick: u64,
    ticks_remaining: u32,

    /// Participant order; collision resolution iterates in this order
    order: Vec<PlayerId>,
    players: HashMap<PlayerId, Player>,
    alive_count: usize,
    /// Deaths emitted on the latest tick, used for simultaneous eliminations
    last_deaths: Vec<PlayerId>,

    board_side: f32,
    field: PlayingField,
    tiles: BTreeMap<EntityId, Tile>,
    projectiles: BTreeMap<EntityId, Projectile>,
    next_tile_id: EntityId,
    next_projectile_id: EntityId,

    pending_moves: HashMap<PlayerId, VecDeque<MoveInput>>,
    item_queue: VecDeque<PlayerId>,
    shot_queue: VecDeque<ShotInput>,

    tree: QuadTree<EntityRef>,
    rng: ChaCha8Rng,
    outbox: Vec<Outbound>,
    result: Option<MatchResult>,
}

impl Engine {
    pub fn new(room_id: String, participants: &[PlayerId], config: GameConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let rules = ItemRules::from_config(&config);
        let board_side = config.board_size(participants.len());

        let mut order = Vec::with_capacity(participants.len());
        let mut players = HashMap::with_capacity(participants.len());
        for &id in participants {
            if players.contains_key(&id) {
                continue;
            }
            order.push(id);
            players.insert(id, Player::new(id, config.player_size, rules, &mut rng));
        }

        let tree = QuadTree::new(
            Aabb::new(0.0, 0.0, board_side, board_side),
            config.tree_max_objects,
            config.tree_max_levels,
        );

        Self {
            room_id,
            phase: EnginePhase::Lobby,
            tick: 0,
            ticks_remaining: 0,
            alive_count: order.len(),
            last_deaths: Vec::new(),
            pending_moves: order.iter().map(|id| (*id, VecDeque::new())).collect(),
            order,
            players,
            board_side,
            field: PlayingField::new(board_side, config.min_field_side),
            tiles: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            next_tile_id: 0,
            next_projectile_id: 0,
            item_queue: VecDeque::new(),
            shot_queue: VecDeque::new(),
            tree,
            rng,
            outbox: Vec::new(),
            result: None,
            config,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.phase == EnginePhase::Ended
    }

    pub fn result(&self) -> Option<MatchResult> {
        self.result
    }

    /// Lobby → Countdown: size the board, place players, seed tiles
    pub fn initialize(&mut self) -> Vec<Outbound> {
        if self.phase != EnginePhase::Lobby {
            return Vec::new();
        }

        self.broadcast(ServerMsg::BoardDimensions {
            side: self.board_side,
        });

        let positions =
            perimeter_positions(self.board_side, self.config.spawn_inset, self.order.len());
        for (id, (x, y)) in self.order.iter().zip(positions) {
            if let Some(player) = self.players.get_mut(id) {
                player.x = x;
                player.y = y;
            }
        }

        for _ in 1..self.order.len() {
            self.spawn_tile();
        }

        self.phase = EnginePhase::Countdown;
        self.broadcast(ServerMsg::StartCountdown);
        self.emit_player_state();
        self.emit_tile_state();

        info!(
            room_id = %self.room_id,
            players = self.order.len(),
            board_side = self.board_side,
            tiles = self.tiles.len(),
            "Match initialized"
        );

        self.take_outbox()
    }

    /// Countdown → Active
    pub fn start(&mut self) -> Vec<Outbound> {
        if self.phase != EnginePhase::Countdown {
            return Vec::new();
        }

        self.phase = EnginePhase::Active;
        self.ticks_remaining = self.config.tick_budget();
        self.broadcast(ServerMsg::StartGame);

        info!(room_id = %self.room_id, ticks = self.ticks_remaining, "Match started");

        self.take_outbox()
    }

    /// Queue an intent for the next tick. Unknown players and malformed
    /// values are dropped.
    pub fn enqueue(&mut self, input: MatchInput) {
        if self.phase == EnginePhase::Ended {
            return;
        }

        match input {
            MatchInput::Move { player_id, input } => {
                if !self.is_alive(&player_id) || !input.press_time.is_finite() {
                    debug!(room_id = %self.room_id, player_id = %player_id, "Dropped move");
                    return;
                }
                let limit = self.config.max_pending_moves;
                let max_press = self.config.max_press_time;
                if let Some(queue) = self.pending_moves.get_mut(&player_id) {
                    if queue.len() >= limit {
                        return;
                    }
                    queue.push_back(MoveInput {
                        press_time: input.press_time.clamp(0.0, max_press),
                        ..input
                    });
                }
            }
            MatchInput::UseItem { player_id } => {
                if self.players.contains_key(&player_id) {
                    self.item_queue.push_back(player_id);
                }
            }
            MatchInput::Shoot {
                player_id,
                target_x,
                target_y,
            } => {
                if self.players.contains_key(&player_id)
                    && target_x.is_finite()
                    && target_y.is_finite()
                {
                    self.shot_queue.push_back(ShotInput {
                        player_id,
                        target_x,
                        target_y,
                    });
                }
            }
            MatchInput::Disconnect { player_id } => {
                if let Some(player) = self.players.get_mut(&player_id) {
                    if player.die(DEATH_LEFT) {
                        info!(room_id = %self.room_id, player_id = %player_id, "Player left mid-match");
                    }
                }
            }
        }
    }

    /// Run one simulation step
    pub fn tick(&mut self) -> Vec<Outbound> {
        if self.phase != EnginePhase::Active {
            return Vec::new();
        }
        self.tick += 1;

        self.expire_effects();
        self.process_item_uses();
        self.process_moves();
        self.update_projectiles();
        self.process_shots();
        self.rebuild_index();
        self.resolve_collisions();

        self.emit_player_state();
        self.emit_projectile_state();

        self.ticks_remaining = self.ticks_remaining.saturating_sub(1);
        if every(self.tick, self.config.tile_spawn_interval) {
            self.spawn_tile();
        }
        self.emit_tile_state();

        if every(self.tick, self.config.shrink_interval) && self.field.shrink(self.config.shrink_step) {
            debug!(room_id = %self.room_id, side = self.field.side, "Field shrunk");
            self.broadcast(ServerMsg::PlayingField(self.field.state()));
        }

        self.check_end();

        self.take_outbox()
    }

    /// End without a winner; queued intents are discarded
    pub fn shutdown(&mut self) {
        if self.phase == EnginePhase::Ended {
            return;
        }
        self.phase = EnginePhase::Ended;
        self.pending_moves.values_mut().for_each(VecDeque::clear);
        self.item_queue.clear();
        self.shot_queue.clear();
        self.result = Some(MatchResult {
            winner: None,
            reason: EndReason::Shutdown,
            ticks: self.tick,
        });
        info!(room_id = %self.room_id, "Match shut down");
    }

    fn is_alive(&self, id: &PlayerId) -> bool {
        self.players.get(id).is_some_and(|p| p.alive)
    }

    fn expire_effects(&mut self) {
        for id in &self.order {
            if let Some(player) = self.players.get_mut(id) {
                if player.alive {
                    player.advance_effects();
                }
            }
        }
    }

    fn process_item_uses(&mut self) {
        while let Some(id) = self.item_queue.pop_front() {
            match self.players.get_mut(&id) {
                Some(player) if player.alive => player.use_item(),
                _ => {}
            }
        }
    }

    fn process_moves(&mut self) {
        for id in &self.order {
            let Some(player) = self.players.get_mut(id) else {
                continue;
            };
            let queue = self.pending_moves.entry(*id).or_default();

            if !player.alive {
                queue.clear();
                continue;
            }

            while let Some(input) = queue.pop_front() {
                player.apply_input(&input);
            }

            if !self.field.contains(player.x, player.y) {
                player.die(DEATH_STORM);
            }
        }
    }

    fn update_projectiles(&mut self) {
        let dt = self.config.tick_delta();
        for projectile in self.projectiles.values_mut() {
            match &mut projectile.kind {
                ProjectileKind::Bullet(bullet) => {
                    bullet.advance(dt);
                    if !self.field.contains(bullet.x, bullet.y) {
                        bullet.destroyed = true;
                    }
                }
                ProjectileKind::Bomb(bomb) => bomb.advance(),
            }
        }
    }

    fn process_shots(&mut self) {
        while let Some(shot) = self.shot_queue.pop_front() {
            let Some(player) = self.players.get_mut(&shot.player_id) else {
                continue;
            };
            if !player.alive || player.ammo == 0 {
                continue;
            }
            let Some(weapon) = player.weapon else {
                continue;
            };

            let kind = match weapon {
                WeaponKind::Gun => match Bullet::aimed(
                    (player.x, player.y),
                    (shot.target_x, shot.target_y),
                    self.config.bullet_speed,
                    self.config.bullet_spawn_offset,
                    self.config.bullet_size,
                ) {
                    Some(bullet) => ProjectileKind::Bullet(bullet),
                    None => continue,
                },
                WeaponKind::Bomb => ProjectileKind::Bomb(Bomb::new(
                    shot.target_x,
                    shot.target_y,
                    self.config.bomb_size,
                    self.config.bomb_blast_size,
                    self.config.ticks(self.config.bomb_fuse_secs),
                    self.config.ticks(self.config.bomb_blast_secs),
                )),
            };

            player.consume_ammo();

            let id = self.next_projectile_id;
            self.next_projectile_id += 1;
            self.projectiles.insert(
                id,
                Projectile {
                    id,
                    owner: shot.player_id,
                    kind,
                },
            );
        }
    }

    fn rebuild_index(&mut self) {
        self.tree.clear();

        for player in self.players.values().filter(|p| p.alive) {
            self.tree.insert(player.bounds(), player.entity_ref());
        }
        for tile in self.tiles.values() {
            self.tree.insert(tile.bounds(), tile.entity_ref());
        }
        for projectile in self.projectiles.values().filter(|p| p.is_hazardous()) {
            self.tree.insert(projectile.bounds(), projectile.entity_ref());
        }
    }

    fn resolve_collisions(&mut self) {
        for index in 0..self.order.len() {
            let id = self.order[index];
            let Some(bounds) = self.players.get(&id).filter(|p| p.alive).map(|p| p.bounds()) else {
                continue;
            };

            for candidate in self.tree.query(&bounds) {
                // Killed earlier in this pass
                if !self.is_alive(&id) {
                    break;
                }

                match candidate {
                    EntityRef::Player(other) => {
                        if other == id {
                            continue;
                        }
                        let kill = match (self.players.get(&id), self.players.get(&other)) {
                            (Some(first), Some(second)) => CombatSystem::player_contact(first, second),
                            _ => None,
                        };
                        if let Some(kill) = kill {
                            self.apply_kill(kill);
                        }
                    }
                    EntityRef::Bullet(pid) | EntityRef::Bomb(pid) => {
                        let hit = match (self.players.get(&id), self.projectiles.get(&pid)) {
                            (Some(player), Some(projectile)) => {
                                CombatSystem::projectile_contact(player, projectile)
                            }
                            _ => None,
                        };
                        let Some(hit) = hit else {
                            continue;
                        };
                        if hit.consume {
                            if let Some(Projectile {
                                kind: ProjectileKind::Bullet(bullet),
                                ..
                            }) = self.projectiles.get_mut(&pid)
                            {
                                bullet.destroyed = true;
                            }
                        }
                        if let Some(kill) = hit.kill {
                            self.apply_kill(kill);
                        }
                    }
                    EntityRef::Tile(tid) => {
                        let touched = match (self.players.get(&id), self.tiles.get(&tid)) {
                            (Some(player), Some(tile)) => CombatSystem::tile_contact(player, tile),
                            _ => false,
                        };
                        if !touched {
                            continue;
                        }
                        if let Some(tile) = self.tiles.remove(&tid) {
                            debug!(room_id = %self.room_id, player_id = %id, kind = ?tile.kind, "Tile picked up");
                            if let Some(player) = self.players.get_mut(&id) {
                                player.pickup(tile.kind);
                            }
                            if self.config.replace_consumed_tiles {
                                self.spawn_tile();
                            }
                        }
                    }
                }
            }
        }
    }

    fn apply_kill(&mut self, kill: Kill) {
        let died = self
            .players
            .get_mut(&kill.victim)
            .is_some_and(|victim| victim.die(kill.reason));
        if !died {
            return;
        }

        if let Some(killer) = kill.killer.and_then(|k| self.players.get_mut(&k)) {
            killer.increment_score();
        }

        debug!(
            room_id = %self.room_id,
            victim = %kill.victim,
            killer = ?kill.killer,
            reason = kill.reason,
            "Player killed"
        );
    }

    fn spawn_tile(&mut self) {
        let inset = self.config.tile_inset.min(self.field.side / 4.0);
        let usable = (self.field.side - 2.0 * inset).max(0.0);
        let x = self.field.x + inset + (self.rng.gen::<f32>() * usable).floor();
        let y = self.field.y + inset + (self.rng.gen::<f32>() * usable).floor();
        let kind = Tile::roll_kind(&mut self.rng, self.config.tile_luck);

        let id = self.next_tile_id;
        self.next_tile_id += 1;
        self.tiles.insert(
            id,
            Tile {
                id,
                x,
                y,
                size: self.config.tile_size,
                kind,
            },
        );
    }

    /// Alive and just-died players; a death is emitted exactly once and
    /// leaves the alive count at that moment
    fn emit_player_state(&mut self) {
        self.last_deaths.clear();
        let mut entries = Vec::with_capacity(self.order.len());

        for id in &self.order {
            let Some(player) = self.players.get_mut(id) else {
                continue;
            };
            if !player.alive {
                if !player.acknowledge_death() {
                    continue;
                }
                self.alive_count = self.alive_count.saturating_sub(1);
                self.last_deaths.push(*id);
            }

            entries.push(snapshot::player_entry(player));
            self.outbox.push(Outbound {
                to: Recipient::Player(*id),
                msg: snapshot::self_state(player),
            });
        }

        self.broadcast(ServerMsg::PlayerState { players: entries });
    }

    fn emit_projectile_state(&mut self) {
        self.projectiles.retain(|_, p| !p.is_finished());
        let projectiles = self
            .projectiles
            .values()
            .map(snapshot::projectile_entry)
            .collect();
        self.broadcast(ServerMsg::ProjectileState { projectiles });
    }

    fn emit_tile_state(&mut self) {
        let msg = snapshot::tile_state(self.tiles.values());
        self.broadcast(msg);
    }

    fn check_end(&mut self) {
        let reason = if self.alive_count <= 1 {
            EndReason::LastStanding
        } else if self.ticks_remaining == 0 {
            EndReason::Timeout
        } else {
            return;
        };

        let winner = self.decide_winner(reason);
        self.phase = EnginePhase::Ended;
        self.result = Some(MatchResult {
            winner,
            reason,
            ticks: self.tick,
        });
        self.broadcast(ServerMsg::Winner { player_id: winner });

        info!(
            room_id = %self.room_id,
            winner = ?winner,
            reason = ?reason,
            ticks = self.tick,
            "Match ended"
        );
    }

    /// Last alive beats any score; when nobody survived, the unique top
    /// scorer among the final tick's casualties. On timeout the unique top
    /// scorer over every participant, dead or alive.
    fn decide_winner(&self, reason: EndReason) -> Option<PlayerId> {
        let participants = self.order.iter().filter_map(|id| self.players.get(id));

        if reason == EndReason::Timeout {
            return score_leader(participants);
        }

        let alive: Vec<&Player> = participants.filter(|p| p.alive).collect();
        match alive.as_slice() {
            [only] => Some(only.id),
            [] => score_leader(self.last_deaths.iter().filter_map(|id| self.players.get(id))),
            _ => score_leader(alive.iter().copied()),
        }
    }

    fn broadcast(&mut self, msg: ServerMsg) {
        self.outbox.push(Outbound {
            to: Recipient::All,
            msg,
        });
    }

    fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }
}

// Read-only views used by the tests
#[cfg(test)]
impl Engine {
    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn field(&self) -> &PlayingField {
        &self.field
    }

    pub fn board_side(&self) -> f32 {
        self.board_side
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }
}

/// Unique highest positive score
fn score_leader<'a>(candidates: impl Iterator<Item = &'a Player>) -> Option<PlayerId> {
    let mut best: Option<(u32, PlayerId)> = None;
    let mut tied = false;

    for player in candidates {
        match best {
            Some((score, _)) if player.score < score => {}
            Some((score, _)) if player.score == score => tied = true,
            _ => {
                best = Some((player.score, player.id));
                tied = false;
            }
        }
    }

    best.filter(|(score, _)| *score > 0 && !tied)
        .map(|(_, id)| id)
}

/// True on every `interval`-th tick, never when the interval is zero
fn every(tick: u64, interval: u32) -> bool {
    interval != 0 && tick % interval as u64 == 0
}
