//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Players are identified by their connection id
pub type PlayerId = Uuid;

/// Pickup kinds a tile can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    /// Invincibility powerup
    Star,
    /// Two-shot gun
    Gun,
    /// Single bomb
    Bomb,
    /// Movement speed powerup
    Speed,
    /// Invisibility powerup
    Invis,
    /// Instant death
    Fall,
    /// Roots the player in place
    Trap,
    /// Burns the player to death unless something else gets them first
    Fire,
}

impl ItemKind {
    pub const GOOD: [ItemKind; 5] = [
        ItemKind::Star,
        ItemKind::Gun,
        ItemKind::Bomb,
        ItemKind::Speed,
        ItemKind::Invis,
    ];

    pub const BAD: [ItemKind; 3] = [ItemKind::Fall, ItemKind::Trap, ItemKind::Fire];

    /// How the item behaves once touched
    pub fn class(self) -> ItemClass {
        match self {
            ItemKind::Star => ItemClass::Powerup(PowerupKind::Star),
            ItemKind::Invis => ItemClass::Powerup(PowerupKind::Invis),
            ItemKind::Speed => ItemClass::Powerup(PowerupKind::Speed),
            ItemKind::Gun => ItemClass::Weapon(WeaponKind::Gun),
            ItemKind::Bomb => ItemClass::Weapon(WeaponKind::Bomb),
            ItemKind::Fall | ItemKind::Trap | ItemKind::Fire => ItemClass::Hazard,
        }
    }
}

/// Stored items are powerups or weapons; hazards apply on contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemClass {
    Powerup(PowerupKind),
    Weapon(WeaponKind),
    Hazard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerupKind {
    Star,
    Invis,
    Speed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeaponKind {
    Gun,
    Bomb,
}

/// Active powerup flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffs {
    pub invincible: bool,
    pub invisible: bool,
    pub speed_boost: bool,
}

/// Active debuff flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debuffs {
    pub on_fire: bool,
    pub trapped: bool,
}

/// Held movement keys for one input sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Open a new room and become its initiator
    CreateSession {
        room_id: String,
        target_size: usize,
    },

    /// Join an open room
    JoinSession {
        room_id: String,
    },

    /// Leave the current room
    LeaveSession,

    /// Initiator asks for the match to begin
    StartMatch {
        room_id: String,
    },

    /// Movement sample for client-side prediction reconciliation
    Move {
        room_id: String,
        player_id: PlayerId,
        /// Seconds the movement keys were held
        press_time: f32,
        movement: Movement,
        /// Client timestamp echoed back in selfPlayerState
        ts: u64,
    },

    /// Activate the held item
    UseItem {
        room_id: String,
        player_id: PlayerId,
    },

    /// Fire the active weapon at a board position
    Shoot {
        room_id: String,
        player_id: PlayerId,
        target_x: f32,
        target_y: f32,
    },

    /// Ping for latency measurement
    Ping {
        t: u64,
    },
}

impl ClientMsg {
    /// Message name used in acks and logs
    pub fn name(&self) -> &'static str {
        match self {
            ClientMsg::CreateSession { .. } => "createSession",
            ClientMsg::JoinSession { .. } => "joinSession",
            ClientMsg::LeaveSession => "leaveSession",
            ClientMsg::StartMatch { .. } => "startMatch",
            ClientMsg::Move { .. } => "move",
            ClientMsg::UseItem { .. } => "useItem",
            ClientMsg::Shoot { .. } => "shoot",
            ClientMsg::Ping { .. } => "ping",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        player_id: PlayerId,
        server_time: u64,
    },

    /// Result of a session request
    Ack {
        request: String,
        ok: bool,
    },

    /// Board side length, sent before placement
    BoardDimensions {
        side: f32,
    },

    /// Players are placed, the match begins shortly
    StartCountdown,

    /// First tick is about to run
    StartGame,

    /// Public state of all alive and just-died players
    PlayerState {
        players: Vec<PlayerStateEntry>,
    },

    /// Private state for the receiving player only
    SelfPlayerState(SelfPlayerState),

    /// Live bullets and bombs
    ProjectileState {
        projectiles: Vec<ProjectileStateEntry>,
    },

    /// Tiles still on the board
    TileState {
        tiles: Vec<TileStateEntry>,
    },

    /// Field after a shrink
    PlayingField(FieldState),

    /// Match result, `None` when nobody qualifies
    Winner {
        player_id: Option<PlayerId>,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStateEntry {
    pub id: PlayerId,
    pub width: f32,
    pub x: f32,
    pub y: f32,
    pub powerups: Buffs,
    pub debuffs: Debuffs,
    pub outline_color: String,
    pub fill_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfPlayerState {
    pub width: f32,
    pub x: f32,
    pub y: f32,
    /// Timestamp of the last movement input applied
    pub ts: u64,
    pub alive: bool,
    pub score: u32,
    pub death_reason: Option<String>,
    pub item: Option<ItemKind>,
    pub powerups: Buffs,
    pub debuffs: Debuffs,
    pub weapon: Option<WeaponKind>,
    pub ammo: u32,
    pub outline_color: String,
    pub fill_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileStateEntry {
    pub width: f32,
    pub x: f32,
    pub y: f32,
    pub outline_color: String,
    pub fill_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileStateEntry {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    pub x: f32,
    pub y: f32,
    pub side: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_parses_from_camel_case() {
        let raw = r#"{
            "type": "move",
            "roomId": "lobby",
            "playerId": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "pressTime": 0.016,
            "movement": {"up": true, "right": true},
            "ts": 1234
        }"#;

        match serde_json::from_str::<ClientMsg>(raw) {
            Ok(ClientMsg::Move {
                room_id,
                movement,
                ts,
                ..
            }) => {
                assert_eq!(room_id, "lobby");
                assert!(movement.up && movement.right && !movement.left);
                assert_eq!(ts, 1234);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn leave_session_has_no_fields() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"leaveSession"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::LeaveSession));
    }

    #[test]
    fn winner_sentinel_is_null() {
        let json = serde_json::to_value(ServerMsg::Winner { player_id: None }).unwrap();
        assert_eq!(json["type"], "winner");
        assert!(json["playerId"].is_null());
    }

    #[test]
    fn field_state_is_flattened() {
        let json = serde_json::to_value(ServerMsg::PlayingField(FieldState {
            x: 20.0,
            y: 20.0,
            side: 660.0,
        }))
        .unwrap();
        assert_eq!(json["type"], "playingField");
        assert_eq!(json["side"], 660.0);
    }

    #[test]
    fn debuffs_use_camel_case() {
        let json = serde_json::to_value(Debuffs {
            on_fire: true,
            trapped: false,
        })
        .unwrap();
        assert_eq!(json["onFire"], true);
    }
}
