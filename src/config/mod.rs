//! Configuration module - environment variable parsing and gameplay constants

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated), permissive when unset
    pub client_origin: Option<String>,
    /// Largest session a client may ask for
    pub max_room_size: usize,
    /// Simulation tuning shared by every match
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let lookup = |key: &str| env::var(key).ok();
        let game = GameConfig::from_lookup(lookup)?;

        let max_room_size = parse_var(lookup, "MAX_ROOM_SIZE", 8usize)?;
        if max_room_size < 2 {
            return Err(ConfigError::Invalid("MAX_ROOM_SIZE"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),
            max_room_size,
            game,
        })
    }
}

fn parse_var<T, F>(lookup: F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Gameplay constants for one match
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Match length before the timeout winner rule applies
    pub match_seconds: u32,
    /// Delay between the countdown and the first tick
    pub countdown_secs: u64,

    /// Board side for a two player match
    pub base_size: f32,
    /// Extra board side per player beyond two
    pub size_per_player: f32,
    /// Distance from the board edge players spawn at
    pub spawn_inset: f32,
    /// Distance from the field edge tiles spawn at
    pub tile_inset: f32,

    /// Ticks between periodic tile spawns
    pub tile_spawn_interval: u32,
    /// Keep the tile count constant by respawning consumed tiles
    pub replace_consumed_tiles: bool,
    /// Ticks between field shrinks, 0 disables shrinking
    pub shrink_interval: u32,
    /// Side length lost per shrink
    pub shrink_step: f32,
    /// Field never shrinks below this side
    pub min_field_side: f32,

    /// Quadtree split threshold
    pub tree_max_objects: usize,
    /// Quadtree depth limit
    pub tree_max_levels: u32,

    /// Upper bound on a single movement input's duration (seconds)
    pub max_press_time: f32,
    /// Pending movement inputs kept per player
    pub max_pending_moves: usize,

    pub player_size: f32,
    pub base_speed: f32,
    pub boosted_speed: f32,

    pub powerup_secs: f32,
    pub trap_secs: f32,
    pub fire_secs: f32,

    pub gun_ammo: u32,
    pub bomb_ammo: u32,

    pub bullet_size: f32,
    pub bullet_speed: f32,
    /// Bullets spawn this far from the shooter's center
    pub bullet_spawn_offset: f32,
    pub bomb_size: f32,
    pub bomb_blast_size: f32,
    pub bomb_fuse_secs: f32,
    pub bomb_blast_secs: f32,

    pub tile_size: f32,
    /// Chance a spawned tile comes from the good pool
    pub tile_luck: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            match_seconds: 60,
            countdown_secs: 3,

            base_size: 500.0,
            size_per_player: 100.0,
            spawn_inset: 75.0,
            tile_inset: 150.0,

            tile_spawn_interval: 300,
            replace_consumed_tiles: false,
            shrink_interval: 300,
            shrink_step: 40.0,
            min_field_side: 120.0,

            tree_max_objects: 4,
            tree_max_levels: 10,

            max_press_time: 0.25,
            max_pending_moves: 120,

            player_size: 60.0,
            base_speed: 200.0,
            boosted_speed: 400.0,

            powerup_secs: 15.0,
            trap_secs: 10.0,
            fire_secs: 5.0,

            gun_ammo: 2,
            bomb_ammo: 1,

            bullet_size: 10.0,
            bullet_speed: 400.0,
            bullet_spawn_offset: 40.0,
            bomb_size: 40.0,
            bomb_blast_size: 120.0,
            bomb_fuse_secs: 3.0,
            bomb_blast_secs: 0.5,

            tile_size: 50.0,
            tile_luck: 0.7,
        }
    }
}

impl GameConfig {
    /// Defaults overridden by whatever `lookup` returns for the match
    /// variables (TICK_RATE, MATCH_SECONDS, COUNTDOWN_SECS,
    /// REPLACE_CONSUMED_TILES, SHRINK_INTERVAL, SHRINK_STEP)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String> + Copy,
    {
        let mut game = Self::default();
        game.tick_rate = parse_var(lookup, "TICK_RATE", game.tick_rate)?;
        game.match_seconds = parse_var(lookup, "MATCH_SECONDS", game.match_seconds)?;
        game.countdown_secs = parse_var(lookup, "COUNTDOWN_SECS", game.countdown_secs)?;
        game.replace_consumed_tiles =
            parse_var(lookup, "REPLACE_CONSUMED_TILES", game.replace_consumed_tiles)?;
        game.shrink_interval = parse_var(lookup, "SHRINK_INTERVAL", game.shrink_interval)?;
        game.shrink_step = parse_var(lookup, "SHRINK_STEP", game.shrink_step)?;

        if game.tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }
        if !game.shrink_step.is_finite() || game.shrink_step < 0.0 {
            return Err(ConfigError::Invalid("SHRINK_STEP"));
        }
        Ok(game)
    }

    /// Seconds as a whole number of ticks (at least one)
    pub fn ticks(&self, secs: f32) -> u32 {
        ((secs * self.tick_rate as f32).round() as u32).max(1)
    }

    /// Seconds simulated by one tick
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Total ticks in the match clock
    pub fn tick_budget(&self) -> u32 {
        self.match_seconds.saturating_mul(self.tick_rate)
    }

    /// Board side for a given number of players
    pub fn board_size(&self, players: usize) -> f32 {
        self.base_size + players.saturating_sub(2) as f32 * self.size_per_player
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_grows_with_players() {
        let config = GameConfig::default();
        assert_eq!(config.board_size(2), 500.0);
        assert_eq!(config.board_size(4), 700.0);
        assert_eq!(config.board_size(1), 500.0);
    }

    #[test]
    fn durations_convert_to_ticks() {
        let config = GameConfig::default();
        assert_eq!(config.ticks(10.0), 600);
        assert_eq!(config.ticks(0.5), 30);
        assert_eq!(config.ticks(0.0), 1);
        assert_eq!(config.tick_budget(), 3600);
    }

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> + Copy {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn match_tuning_reads_from_lookup() {
        let game = GameConfig::from_lookup(vars(&[
            ("REPLACE_CONSUMED_TILES", "true"),
            ("SHRINK_INTERVAL", " 120 "),
            ("SHRINK_STEP", "25.5"),
            ("TICK_RATE", "30"),
        ]))
        .unwrap();

        assert!(game.replace_consumed_tiles);
        assert_eq!(game.shrink_interval, 120);
        assert_eq!(game.shrink_step, 25.5);
        assert_eq!(game.tick_rate, 30);
        assert_eq!(game.match_seconds, GameConfig::default().match_seconds);
    }

    #[test]
    fn unset_lookup_keeps_defaults() {
        let game = GameConfig::from_lookup(vars(&[])).unwrap();
        let defaults = GameConfig::default();
        assert!(!game.replace_consumed_tiles);
        assert_eq!(game.shrink_interval, defaults.shrink_interval);
        assert_eq!(game.shrink_step, defaults.shrink_step);
    }

    #[test]
    fn bad_match_tuning_is_rejected() {
        let cases: [&'static [(&'static str, &'static str)]; 4] = [
            &[("REPLACE_CONSUMED_TILES", "sometimes")],
            &[("SHRINK_INTERVAL", "-5")],
            &[("SHRINK_STEP", "-1")],
            &[("TICK_RATE", "0")],
        ];
        for case in cases {
            let key = case[0].0;
            match GameConfig::from_lookup(vars(case)) {
                Err(ConfigError::Invalid(k)) => assert_eq!(k, key),
                other => panic!("{key} accepted: {other:?}"),
            }
        }
    }
}
