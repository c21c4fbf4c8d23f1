//! Runtime settings for the server, built once in `main` and handed to [`Server`].
//!
//! [`Server`]: crate::network::Server

use shared::{DEFAULT_HOST, DEFAULT_PORT};
use std::path::PathBuf;
use std::time::Duration;

/// What happens after the game-over check produces a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameOverPolicy {
    /// Clear the arena and keep serving; clients rejoin with `player_init`.
    #[default]
    Restart,
    /// Stop the server once the verdict has been broadcast.
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_rate: u32,
    pub max_clients: usize,
    pub disconnect_timeout: Duration,
    pub reaper_interval: Duration,
    pub game_over_check_interval: Duration,
    /// Receive timeout so the listener can notice shutdown.
    pub recv_timeout: Duration,
    pub characters_path: PathBuf,
    pub player_map_path: PathBuf,
    pub bullet_map_path: PathBuf,
    pub bots: usize,
    pub bot_character: String,
    pub seed: Option<u64>,
    /// Reject absolute moves that land on blocked terrain.
    pub validate_moves: bool,
    pub on_game_over: GameOverPolicy,
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("{DEFAULT_HOST}:{DEFAULT_PORT}"),
            tick_rate: 60,
            max_clients: 32,
            disconnect_timeout: Duration::from_secs(10),
            reaper_interval: Duration::from_secs(1),
            game_over_check_interval: Duration::from_millis(500),
            recv_timeout: Duration::from_millis(100),
            characters_path: PathBuf::from("assets/characters.json"),
            player_map_path: PathBuf::from("assets/map/player_collision.png"),
            bullet_map_path: PathBuf::from("assets/map/bullet_collision.png"),
            bots: 0,
            bot_character: "Ninja".to_string(),
            seed: None,
            validate_moves: false,
            on_game_over: GameOverPolicy::Restart,
        }
    }
}
