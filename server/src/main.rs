use clap::{Parser, ValueEnum};
use log::{error, info};
use server::assets::Assets;
use server::config::{GameOverPolicy, ServerConfig};
use server::network::Server;
use shared::{DEFAULT_HOST, DEFAULT_PORT};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnGameOver {
    /// Clear the arena and start a new round
    Restart,
    /// Stop the server
    Shutdown,
}

impl From<OnGameOver> for GameOverPolicy {
    fn from(value: OnGameOver) -> Self {
        match value {
            OnGameOver::Restart => GameOverPolicy::Restart,
            OnGameOver::Shutdown => GameOverPolicy::Shutdown,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to (use 0.0.0.0 to accept remote players)
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "10")]
    disconnect_timeout: u64,

    /// Character table (JSON)
    #[arg(long, default_value = "assets/characters.json")]
    characters: PathBuf,

    /// Collision mask for players (PNG, opaque pixels are solid)
    #[arg(long, default_value = "assets/map/player_collision.png")]
    player_map: PathBuf,

    /// Collision mask for bullets (PNG, opaque pixels are solid)
    #[arg(long, default_value = "assets/map/bullet_collision.png")]
    bullet_map: PathBuf,

    /// Number of server-controlled players
    #[arg(short, long, default_value = "0")]
    bots: usize,

    /// Character used by bots
    #[arg(long, default_value = "Ninja")]
    bot_character: String,

    /// Seed for spawn positions and bot behaviour
    #[arg(long)]
    seed: Option<u64>,

    /// Reject absolute moves onto blocked terrain
    #[arg(long)]
    validate_moves: bool,

    /// What to do once a round has a winner
    #[arg(long, value_enum, default_value = "restart")]
    on_game_over: OnGameOver,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind_addr: format!("{}:{}", args.host, args.port),
            tick_rate: args.tick_rate,
            max_clients: args.max_clients,
            disconnect_timeout: Duration::from_secs(args.disconnect_timeout),
            characters_path: args.characters,
            player_map_path: args.player_map,
            bullet_map_path: args.bullet_map,
            bots: args.bots,
            bot_character: args.bot_character,
            seed: args.seed,
            validate_moves: args.validate_moves,
            on_game_over: args.on_game_over.into(),
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    info!(
        "Starting server on {} at {}Hz (max {} clients)",
        config.bind_addr, config.tick_rate, config.max_clients
    );

    let assets = match Assets::load(&config) {
        Ok(assets) => assets,
        Err(e) => {
            error!("Failed to load assets: {}", e);
            return Err(e.into());
        }
    };

    let mut server = Server::new(config, assets).await?;
    let handle = server.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    });

    server.run().await
}
