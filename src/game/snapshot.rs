//! Per-tick state messages

use crate::ws::protocol::{
    PlayerStateEntry, ProjectileStateEntry, SelfPlayerState, ServerMsg, TileStateEntry,
};

use super::entity::{Player, Positioned, Projectile, Tile};

/// Public view of a player, shared with everyone in the match
pub fn player_entry(player: &Player) -> PlayerStateEntry {
    PlayerStateEntry {
        id: player.id,
        width: player.size,
        x: player.x,
        y: player.y,
        powerups: player.buffs,
        debuffs: player.debuffs,
        outline_color: player.outline_color.clone(),
        fill_color: player.fill_color.clone(),
    }
}

/// Private view of a player, sent only to that player
pub fn self_state(player: &Player) -> ServerMsg {
    ServerMsg::SelfPlayerState(SelfPlayerState {
        width: player.size,
        x: player.x,
        y: player.y,
        ts: player.last_input_ts,
        alive: player.alive,
        score: player.score,
        death_reason: player.death_reason.clone(),
        item: player.item,
        powerups: player.buffs,
        debuffs: player.debuffs,
        weapon: player.weapon,
        ammo: player.ammo,
        outline_color: player.outline_color.clone(),
        fill_color: player.fill_color.clone(),
    })
}

pub fn projectile_entry(projectile: &Projectile) -> ProjectileStateEntry {
    let (outline, fill) = projectile.colors();
    ProjectileStateEntry {
        width: projectile.width(),
        x: projectile.x(),
        y: projectile.y(),
        outline_color: outline.to_string(),
        fill_color: fill.to_string(),
    }
}

pub fn tile_state<'a>(tiles: impl Iterator<Item = &'a Tile>) -> ServerMsg {
    ServerMsg::TileState {
        tiles: tiles
            .map(|tile| TileStateEntry {
                x: tile.x,
                y: tile.y,
            })
            .collect(),
    }
}
