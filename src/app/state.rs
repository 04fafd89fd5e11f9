//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::directory::MatchDirectory;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<MatchDirectory>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let directory = Arc::new(MatchDirectory::new(
            config.game.clone(),
            config.max_room_size,
        ));

        Self {
            config: Arc::new(config),
            directory,
        }
    }
}
