//! Entity model: players, projectiles and pickup tiles
//!
//! Every timed effect is a remaining-tick counter owned by the entity and
//! advanced by the engine, so nothing outlives the match that owns it.

use rand::Rng;

use crate::config::GameConfig;
use crate::ws::protocol::{
    Buffs, Debuffs, ItemClass, ItemKind, Movement, PlayerId, PowerupKind, WeaponKind,
};

use super::spatial::Aabb;

/// Per-match id for projectiles and tiles
pub type EntityId = u32;

/// Closed set of things the broad phase can hand back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Player(PlayerId),
    Bullet(EntityId),
    Bomb(EntityId),
    Tile(EntityId),
}

/// Center-referenced position and extent
pub trait Positioned {
    fn x(&self) -> f32;
    fn y(&self) -> f32;
    fn width(&self) -> f32;
    fn height(&self) -> f32;

    fn bounds(&self) -> Aabb {
        Aabb::centered(self.x(), self.y(), self.width(), self.height())
    }
}

/// Anything that goes into the spatial index
pub trait Collidable: Positioned {
    fn entity_ref(&self) -> EntityRef;
}

/// Effect durations and ammo, resolved to ticks once per match
#[derive(Debug, Clone, Copy)]
pub struct ItemRules {
    pub powerup_ticks: u32,
    pub trap_ticks: u32,
    pub fire_ticks: u32,
    pub gun_ammo: u32,
    pub bomb_ammo: u32,
    pub base_speed: f32,
    pub boosted_speed: f32,
}

impl ItemRules {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            powerup_ticks: config.ticks(config.powerup_secs),
            trap_ticks: config.ticks(config.trap_secs),
            fire_ticks: config.ticks(config.fire_secs),
            gun_ammo: config.gun_ammo,
            bomb_ammo: config.bomb_ammo,
            base_speed: config.base_speed,
            boosted_speed: config.boosted_speed,
        }
    }
}

/// One queued movement sample
#[derive(Debug, Clone, Copy)]
pub struct MoveInput {
    pub press_time: f32,
    pub movement: Movement,
    pub ts: u64,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub alive: bool,
    /// Set on death, cleared once the death has been emitted
    pub recent_dead: bool,
    pub death_reason: Option<String>,
    pub score: u32,
    pub item: Option<ItemKind>,
    pub weapon: Option<WeaponKind>,
    pub ammo: u32,
    pub powerup: Option<PowerupKind>,
    pub buffs: Buffs,
    pub debuffs: Debuffs,
    pub last_input_ts: u64,
    pub fill_color: String,
    pub outline_color: String,

    powerup_ticks: u32,
    trap_ticks: u32,
    fire_ticks: u32,
    rules: ItemRules,
}

impl Player {
    pub fn new(id: PlayerId, size: f32, rules: ItemRules, rng: &mut impl Rng) -> Self {
        Self {
            id,
            x: 0.0,
            y: 0.0,
            size,
            alive: true,
            recent_dead: false,
            death_reason: None,
            score: 0,
            item: None,
            weapon: None,
            ammo: 0,
            powerup: None,
            buffs: Buffs::default(),
            debuffs: Debuffs::default(),
            last_input_ts: 0,
            fill_color: random_color(rng),
            outline_color: random_color(rng),
            powerup_ticks: 0,
            trap_ticks: 0,
            fire_ticks: 0,
            rules,
        }
    }

    pub fn radius(&self) -> f32 {
        self.size / 2.0
    }

    /// Speed after buffs and debuffs
    pub fn move_speed(&self) -> f32 {
        if self.debuffs.trapped {
            0.0
        } else if self.buffs.speed_boost {
            self.rules.boosted_speed
        } else {
            self.rules.base_speed
        }
    }

    pub fn apply_input(&mut self, input: &MoveInput) {
        let step = input.press_time * self.move_speed();
        if input.movement.up {
            self.y -= step;
        }
        if input.movement.down {
            self.y += step;
        }
        if input.movement.left {
            self.x -= step;
        }
        if input.movement.right {
            self.x += step;
        }
        self.last_input_ts = input.ts;
    }

    /// Kill the player, returns false if it was already dead
    pub fn die(&mut self, reason: &str) -> bool {
        if !self.alive {
            return false;
        }
        self.alive = false;
        self.recent_dead = true;
        self.death_reason = Some(reason.to_string());
        true
    }

    /// Clear the recent-death flag once clients have been told
    pub fn acknowledge_death(&mut self) -> bool {
        std::mem::replace(&mut self.recent_dead, false)
    }

    pub fn increment_score(&mut self) {
        self.score += 1;
    }

    pub fn is_invincible(&self) -> bool {
        self.buffs.invincible
    }

    pub fn is_on_fire(&self) -> bool {
        self.debuffs.on_fire
    }

    /// Touching a tile: hazards apply now, everything else is held
    pub fn pickup(&mut self, kind: ItemKind) {
        match kind {
            ItemKind::Fall => {
                self.die("you fell to your death");
            }
            ItemKind::Trap => {
                if self.buffs.speed_boost {
                    self.remove_powerup();
                }
                self.debuffs.trapped = true;
                self.trap_ticks = self.rules.trap_ticks;
            }
            ItemKind::Fire => {
                self.remove_powerup();
                self.item = None;
                self.debuffs.on_fire = true;
                self.fire_ticks = self.rules.fire_ticks;
            }
            _ => self.item = Some(kind),
        }
    }

    /// Activate the held item, no-op when the slot is empty
    pub fn use_item(&mut self) {
        let Some(kind) = self.item.take() else {
            return;
        };

        match kind.class() {
            ItemClass::Powerup(powerup) => self.apply_powerup(powerup),
            ItemClass::Weapon(weapon) => self.apply_weapon(weapon),
            ItemClass::Hazard => {}
        }
    }

    /// Start a powerup, evicting any active one first
    pub fn apply_powerup(&mut self, powerup: PowerupKind) {
        self.remove_powerup();
        set_buff(&mut self.buffs, powerup, true);
        self.powerup = Some(powerup);
        self.powerup_ticks = self.rules.powerup_ticks;
    }

    pub fn remove_powerup(&mut self) {
        if let Some(active) = self.powerup.take() {
            set_buff(&mut self.buffs, active, false);
        }
        self.powerup_ticks = 0;
    }

    /// Equip a weapon, replacing any active one
    pub fn apply_weapon(&mut self, weapon: WeaponKind) {
        self.remove_weapon();
        self.weapon = Some(weapon);
        self.ammo = match weapon {
            WeaponKind::Gun => self.rules.gun_ammo,
            WeaponKind::Bomb => self.rules.bomb_ammo,
        };
    }

    pub fn remove_weapon(&mut self) {
        self.weapon = None;
        self.ammo = 0;
    }

    /// Spend one round, returns the weapon fired
    pub fn consume_ammo(&mut self) -> Option<WeaponKind> {
        let weapon = self.weapon?;
        if self.ammo == 0 {
            return None;
        }
        self.ammo -= 1;
        if self.ammo == 0 {
            self.weapon = None;
        }
        Some(weapon)
    }

    /// Count down timed effects by one tick
    pub fn advance_effects(&mut self) {
        if self.powerup.is_some() {
            self.powerup_ticks = self.powerup_ticks.saturating_sub(1);
            if self.powerup_ticks == 0 {
                self.remove_powerup();
            }
        }

        if self.debuffs.trapped {
            self.trap_ticks = self.trap_ticks.saturating_sub(1);
            if self.trap_ticks == 0 {
                self.debuffs.trapped = false;
            }
        }

        if self.debuffs.on_fire {
            self.fire_ticks = self.fire_ticks.saturating_sub(1);
            if self.fire_ticks == 0 {
                self.debuffs.on_fire = false;
                self.die("you burned to death");
            }
        }
    }
}

fn set_buff(buffs: &mut Buffs, powerup: PowerupKind, on: bool) {
    match powerup {
        PowerupKind::Star => buffs.invincible = on,
        PowerupKind::Invis => buffs.invisible = on,
        PowerupKind::Speed => buffs.speed_boost = on,
    }
}

fn random_color(rng: &mut impl Rng) -> String {
    format!("#{:06X}", rng.gen_range(0..=0xFF_FFFFu32))
}

impl Positioned for Player {
    fn x(&self) -> f32 {
        self.x
    }
    fn y(&self) -> f32 {
        self.y
    }
    fn width(&self) -> f32 {
        self.size
    }
    fn height(&self) -> f32 {
        self.size
    }
}

impl Collidable for Player {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::Player(self.id)
    }
}

#[derive(Debug, Clone)]
pub struct Bullet {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub size: f32,
    pub destroyed: bool,
}

impl Bullet {
    /// Bullet leaving `origin` toward `target`, `None` for a zero-length aim
    pub fn aimed(
        origin: (f32, f32),
        target: (f32, f32),
        speed: f32,
        spawn_offset: f32,
        size: f32,
    ) -> Option<Self> {
        let dx = target.0 - origin.0;
        let dy = target.1 - origin.1;
        let len = (dx * dx + dy * dy).sqrt();
        if !len.is_finite() || len < f32::EPSILON {
            return None;
        }
        let (nx, ny) = (dx / len, dy / len);

        Some(Self {
            x: origin.0 + nx * spawn_offset,
            y: origin.1 + ny * spawn_offset,
            vel_x: nx * speed,
            vel_y: ny * speed,
            size,
            destroyed: false,
        })
    }

    pub fn advance(&mut self, dt: f32) {
        self.x += self.vel_x * dt;
        self.y += self.vel_y * dt;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BombState {
    /// Fuse burning, harmless
    Armed { ticks_left: u32 },
    /// Blast active, hits everything it touches
    Exploded { ticks_left: u32 },
    /// Blast over, removed on the next emission
    Spent,
}

#[derive(Debug, Clone)]
pub struct Bomb {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub blast_size: f32,
    pub blast_ticks: u32,
    pub state: BombState,
}

impl Bomb {
    pub fn new(x: f32, y: f32, size: f32, blast_size: f32, fuse_ticks: u32, blast_ticks: u32) -> Self {
        Self {
            x,
            y,
            size,
            blast_size,
            blast_ticks,
            state: BombState::Armed {
                ticks_left: fuse_ticks,
            },
        }
    }

    pub fn is_exploded(&self) -> bool {
        matches!(self.state, BombState::Exploded { .. })
    }

    pub fn current_size(&self) -> f32 {
        if self.is_exploded() {
            self.blast_size
        } else {
            self.size
        }
    }

    pub fn advance(&mut self) {
        self.state = match self.state {
            BombState::Armed { ticks_left } if ticks_left <= 1 => BombState::Exploded {
                ticks_left: self.blast_ticks,
            },
            BombState::Armed { ticks_left } => BombState::Armed {
                ticks_left: ticks_left - 1,
            },
            BombState::Exploded { ticks_left } if ticks_left <= 1 => BombState::Spent,
            BombState::Exploded { ticks_left } => BombState::Exploded {
                ticks_left: ticks_left - 1,
            },
            BombState::Spent => BombState::Spent,
        };
    }
}

#[derive(Debug, Clone)]
pub enum ProjectileKind {
    Bullet(Bullet),
    Bomb(Bomb),
}

/// Bullet or bomb plus the player credited with its kills
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: EntityId,
    pub owner: PlayerId,
    pub kind: ProjectileKind,
}

impl Projectile {
    /// Removed from the table at the next emission
    pub fn is_finished(&self) -> bool {
        match &self.kind {
            ProjectileKind::Bullet(bullet) => bullet.destroyed,
            ProjectileKind::Bomb(bomb) => bomb.state == BombState::Spent,
        }
    }

    /// Bullets always collide, bombs only while exploded
    pub fn is_hazardous(&self) -> bool {
        match &self.kind {
            ProjectileKind::Bullet(bullet) => !bullet.destroyed,
            ProjectileKind::Bomb(bomb) => bomb.is_exploded(),
        }
    }

    pub fn colors(&self) -> (&'static str, &'static str) {
        match &self.kind {
            ProjectileKind::Bullet(_) => ("black", "black"),
            ProjectileKind::Bomb(bomb) if bomb.is_exploded() => ("yellow", "red"),
            ProjectileKind::Bomb(_) => ("yellow", "black"),
        }
    }
}

impl Positioned for Projectile {
    fn x(&self) -> f32 {
        match &self.kind {
            ProjectileKind::Bullet(b) => b.x,
            ProjectileKind::Bomb(b) => b.x,
        }
    }
    fn y(&self) -> f32 {
        match &self.kind {
            ProjectileKind::Bullet(b) => b.y,
            ProjectileKind::Bomb(b) => b.y,
        }
    }
    fn width(&self) -> f32 {
        match &self.kind {
            ProjectileKind::Bullet(b) => b.size,
            ProjectileKind::Bomb(b) => b.current_size(),
        }
    }
    fn height(&self) -> f32 {
        self.width()
    }
}

impl Collidable for Projectile {
    fn entity_ref(&self) -> EntityRef {
        match self.kind {
            ProjectileKind::Bullet(_) => EntityRef::Bullet(self.id),
            ProjectileKind::Bomb(_) => EntityRef::Bomb(self.id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub kind: ItemKind,
}

impl Tile {
    /// Draw from the good pool with probability `luck`, else the bad pool
    pub fn roll_kind(rng: &mut impl Rng, luck: f64) -> ItemKind {
        let pool: &[ItemKind] = if rng.gen_bool(luck.clamp(0.0, 1.0)) {
            &ItemKind::GOOD
        } else {
            &ItemKind::BAD
        };
        pool[rng.gen_range(0..pool.len())]
    }
}

impl Positioned for Tile {
    fn x(&self) -> f32 {
        self.x
    }
    fn y(&self) -> f32 {
        self.y
    }
    fn width(&self) -> f32 {
        self.size
    }
    fn height(&self) -> f32 {
        self.size
    }
}

impl Collidable for Tile {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::Tile(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn player() -> Player {
        let rules = ItemRules::from_config(&GameConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        Player::new(Uuid::new_v4(), 60.0, rules, &mut rng)
    }

    #[test]
    fn second_powerup_evicts_the_first() {
        let mut p = player();
        p.apply_powerup(PowerupKind::Star);
        assert!(p.buffs.invincible);

        p.apply_powerup(PowerupKind::Speed);
        assert!(!p.buffs.invincible);
        assert!(p.buffs.speed_boost);
        assert_eq!(p.powerup, Some(PowerupKind::Speed));
    }

    #[test]
    fn remove_powerup_is_idempotent() {
        let mut p = player();
        p.apply_powerup(PowerupKind::Invis);
        p.remove_powerup();
        assert_eq!(p.buffs, Buffs::default());
        p.remove_powerup();
        assert_eq!(p.buffs, Buffs::default());
        assert_eq!(p.powerup, None);
    }

    #[test]
    fn second_weapon_replaces_the_first() {
        let mut p = player();
        p.apply_weapon(WeaponKind::Gun);
        assert_eq!(p.ammo, 2);
        p.apply_weapon(WeaponKind::Bomb);
        assert_eq!(p.weapon, Some(WeaponKind::Bomb));
        assert_eq!(p.ammo, 1);
    }

    #[test]
    fn emptied_weapon_is_unequipped() {
        let mut p = player();
        p.apply_weapon(WeaponKind::Gun);
        assert_eq!(p.consume_ammo(), Some(WeaponKind::Gun));
        assert_eq!(p.consume_ammo(), Some(WeaponKind::Gun));
        assert_eq!(p.weapon, None);
        assert_eq!(p.consume_ammo(), None);
    }

    #[test]
    fn held_items_apply_on_use() {
        let mut p = player();
        p.pickup(ItemKind::Star);
        assert!(!p.buffs.invincible);
        assert_eq!(p.item, Some(ItemKind::Star));

        p.use_item();
        assert!(p.buffs.invincible);
        assert_eq!(p.item, None);

        // Empty slot is a no-op
        p.use_item();
        assert!(p.buffs.invincible);
    }

    #[test]
    fn powerup_expires_after_its_duration() {
        let mut p = player();
        p.apply_powerup(PowerupKind::Speed);
        for _ in 0..899 {
            p.advance_effects();
        }
        assert!(p.buffs.speed_boost);
        p.advance_effects();
        assert!(!p.buffs.speed_boost);
        assert_eq!(p.move_speed(), 200.0);
    }

    #[test]
    fn trap_cancels_speed_boost() {
        let mut p = player();
        p.apply_powerup(PowerupKind::Speed);
        p.pickup(ItemKind::Trap);
        assert!(!p.buffs.speed_boost);
        assert_eq!(p.move_speed(), 0.0);
    }

    #[test]
    fn fire_kills_when_it_runs_out() {
        let mut p = player();
        p.pickup(ItemKind::Gun);
        p.pickup(ItemKind::Fire);
        assert_eq!(p.item, None);
        for _ in 0..300 {
            p.advance_effects();
        }
        assert!(!p.alive);
        assert_eq!(p.death_reason.as_deref(), Some("you burned to death"));
    }

    #[test]
    fn fire_does_not_overwrite_an_earlier_death() {
        let mut p = player();
        p.pickup(ItemKind::Fire);
        p.die("you were hit by a bullet");
        for _ in 0..300 {
            p.advance_effects();
        }
        assert_eq!(p.death_reason.as_deref(), Some("you were hit by a bullet"));
    }

    #[test]
    fn bomb_fuses_then_blasts_then_spends() {
        let mut bomb = Bomb::new(0.0, 0.0, 40.0, 120.0, 3, 2);
        bomb.advance();
        bomb.advance();
        assert!(!bomb.is_exploded());
        bomb.advance();
        assert!(bomb.is_exploded());
        assert_eq!(bomb.current_size(), 120.0);
        bomb.advance();
        bomb.advance();
        assert_eq!(bomb.state, BombState::Spent);
    }

    #[test]
    fn bullet_spawns_outside_shooter() {
        let bullet = Bullet::aimed((100.0, 100.0), (200.0, 100.0), 400.0, 40.0, 10.0).unwrap();
        assert_eq!(bullet.x, 140.0);
        assert_eq!(bullet.vel_x, 400.0);
        assert!(Bullet::aimed((1.0, 1.0), (1.0, 1.0), 400.0, 40.0, 10.0).is_none());
    }

    #[test]
    fn rolled_tiles_come_from_the_pools() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..200 {
            let kind = Tile::roll_kind(&mut rng, 0.7);
            assert!(ItemKind::GOOD.contains(&kind) || ItemKind::BAD.contains(&kind));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        assert!((0..50).all(|_| ItemKind::GOOD.contains(&Tile::roll_kind(&mut rng, 1.0))));
    }
}
