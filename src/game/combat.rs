//! Narrow phase: precise contact tests and the rules that follow from them

use crate::ws::protocol::PlayerId;

use super::entity::{Player, Positioned, Projectile, ProjectileKind, Tile};
use super::physics::{circle_rect_overlap, circles_overlap};

pub const DEATH_INVINCIBLE: &str = "you touched an invincible player";
pub const DEATH_FIRE_TOUCH: &str = "someone lit you on fire!";
pub const DEATH_BULLET: &str = "you were hit by a bullet";
pub const DEATH_BOMB: &str = "you were blown up";
pub const DEATH_STORM: &str = "You were caught by the storm!";
pub const DEATH_LEFT: &str = "you left the game";

/// A death produced by a contact, with the player to credit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kill {
    pub victim: PlayerId,
    pub killer: Option<PlayerId>,
    pub reason: &'static str,
}

/// Result of a player touching a projectile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectileHit {
    pub kill: Option<Kill>,
    /// Bullets are used up by any hit, bombs keep blasting
    pub consume: bool,
}

/// Combat rules
pub struct CombatSystem;

impl CombatSystem {
    /// Only `first`'s buffs deal damage; the reverse direction is handled
    /// when `second` is the iterated player
    pub fn player_contact(first: &Player, second: &Player) -> Option<Kill> {
        if first.id == second.id || !first.alive || !second.alive {
            return None;
        }
        if !circles_overlap(
            first.x,
            first.y,
            first.radius(),
            second.x,
            second.y,
            second.radius(),
        ) {
            return None;
        }

        if first.is_invincible() && !second.is_invincible() {
            return Some(Kill {
                victim: second.id,
                killer: Some(first.id),
                reason: DEATH_INVINCIBLE,
            });
        }

        if first.is_on_fire() && !second.is_invincible() && !second.is_on_fire() {
            return Some(Kill {
                victim: second.id,
                killer: Some(first.id),
                reason: DEATH_FIRE_TOUCH,
            });
        }

        None
    }

    pub fn projectile_contact(player: &Player, projectile: &Projectile) -> Option<ProjectileHit> {
        if !player.alive || !projectile.is_hazardous() {
            return None;
        }
        if !circles_overlap(
            player.x,
            player.y,
            player.radius(),
            projectile.x(),
            projectile.y(),
            projectile.width() / 2.0,
        ) {
            return None;
        }

        let (reason, consume) = match projectile.kind {
            ProjectileKind::Bullet(_) => (DEATH_BULLET, true),
            ProjectileKind::Bomb(_) => (DEATH_BOMB, false),
        };

        let kill = (!player.is_invincible()).then(|| Kill {
            victim: player.id,
            // No credit for blowing yourself up
            killer: (projectile.owner != player.id).then_some(projectile.owner),
            reason,
        });

        Some(ProjectileHit { kill, consume })
    }

    /// Whether `player` picks up `tile` this tick
    pub fn tile_contact(player: &Player, tile: &Tile) -> bool {
        if !player.alive || player.is_on_fire() {
            return false;
        }
        circle_rect_overlap(
            player.x,
            player.y,
            player.radius(),
            tile.x,
            tile.y,
            tile.size,
            tile.size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::entity::{Bomb, Bullet, ItemRules};
    use crate::ws::protocol::{ItemKind, PowerupKind};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn player_at(x: f32, y: f32) -> Player {
        let rules = ItemRules::from_config(&GameConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut p = Player::new(Uuid::new_v4(), 60.0, rules, &mut rng);
        p.x = x;
        p.y = y;
        p
    }

    #[test]
    fn invincible_first_player_kills() {
        let mut a = player_at(100.0, 100.0);
        let b = player_at(140.0, 100.0);
        a.apply_powerup(PowerupKind::Star);

        let kill = CombatSystem::player_contact(&a, &b).unwrap();
        assert_eq!(kill.victim, b.id);
        assert_eq!(kill.killer, Some(a.id));
        assert_eq!(CombatSystem::player_contact(&b, &a), None);
    }

    #[test]
    fn fire_spreads_only_to_unprotected_players() {
        let mut a = player_at(100.0, 100.0);
        let mut b = player_at(140.0, 100.0);
        a.pickup(ItemKind::Fire);
        assert_eq!(
            CombatSystem::player_contact(&a, &b).map(|k| k.reason),
            Some(DEATH_FIRE_TOUCH)
        );

        b.pickup(ItemKind::Fire);
        assert_eq!(CombatSystem::player_contact(&a, &b), None);
    }

    #[test]
    fn plain_players_bump_harmlessly() {
        let a = player_at(100.0, 100.0);
        let b = player_at(110.0, 100.0);
        assert_eq!(CombatSystem::player_contact(&a, &b), None);
    }

    #[test]
    fn bullet_hit_credits_owner_and_is_consumed() {
        let shooter = player_at(0.0, 0.0);
        let target = player_at(200.0, 200.0);
        let bullet = Projectile {
            id: 0,
            owner: shooter.id,
            kind: ProjectileKind::Bullet(
                Bullet::aimed((160.0, 200.0), (200.0, 200.0), 400.0, 40.0, 10.0).unwrap(),
            ),
        };

        let hit = CombatSystem::projectile_contact(&target, &bullet).unwrap();
        assert!(hit.consume);
        assert_eq!(hit.kill.unwrap().killer, Some(shooter.id));
    }

    #[test]
    fn invincible_player_absorbs_bullet() {
        let mut target = player_at(200.0, 200.0);
        target.apply_powerup(PowerupKind::Star);
        let bullet = Projectile {
            id: 0,
            owner: Uuid::new_v4(),
            kind: ProjectileKind::Bullet(
                Bullet::aimed((150.0, 200.0), (200.0, 200.0), 400.0, 40.0, 10.0).unwrap(),
            ),
        };

        let hit = CombatSystem::projectile_contact(&target, &bullet).unwrap();
        assert!(hit.consume);
        assert!(hit.kill.is_none());
    }

    #[test]
    fn armed_bomb_is_harmless_and_self_blast_gives_no_credit() {
        let owner = player_at(300.0, 300.0);
        let mut bomb = Projectile {
            id: 1,
            owner: owner.id,
            kind: ProjectileKind::Bomb(Bomb::new(300.0, 300.0, 40.0, 120.0, 1, 30)),
        };
        assert!(CombatSystem::projectile_contact(&owner, &bomb).is_none());

        if let ProjectileKind::Bomb(b) = &mut bomb.kind {
            b.advance();
        }
        let hit = CombatSystem::projectile_contact(&owner, &bomb).unwrap();
        assert!(!hit.consume);
        let kill = hit.kill.unwrap();
        assert_eq!(kill.reason, DEATH_BOMB);
        assert_eq!(kill.killer, None);
    }

    #[test]
    fn burning_players_cannot_pick_up() {
        let mut p = player_at(100.0, 100.0);
        let tile = Tile {
            id: 0,
            x: 120.0,
            y: 100.0,
            size: 50.0,
            kind: ItemKind::Gun,
        };
        assert!(CombatSystem::tile_contact(&p, &tile));
        p.pickup(ItemKind::Fire);
        assert!(!CombatSystem::tile_contact(&p, &tile));
    }
}
