//! # Arena Server Library
//!
//! The authoritative server for a real-time multiplayer arena shooter. It owns the
//! only trusted copy of player positions, bullets and health, and keeps every
//! connected client in sync over UDP.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Bullets are advanced once per tick at a fixed 60Hz cadence. Hits are decided here
//! against pixel-accurate collision maps; clients only render what they are told.
//!
//! ### Session Management
//! A client becomes a session on its first well-formed datagram. Sessions that stay
//! silent past the disconnect timeout are evicted together with their player.
//!
//! ### Broadcast Fan-out
//! Every accepted action is re-sent to all sessions. Each copy carries the origin's
//! id, except the copy going back to the origin itself, which carries `0`.
//!
//! ## Architecture Design
//!
//! ### Single Owner of the World
//! [`game::GameState`] lives inside the tick loop and nowhere else. The listener and
//! the reaper talk to it only through a channel, so no entity is ever mutated from
//! two tasks.
//!
//! ### Task Layout
//! - **Listener**: receives datagrams with a short timeout so it notices shutdown
//! - **Tick loop**: drains queued actions, moves bots, advances bullets
//! - **Sender**: resolves outgoing messages to addresses and writes them
//! - **Reaper**: evicts silent sessions once per second
//!
//! ## Module Organization
//!
//! - `collision`: terrain queries against the transparency masks
//! - `entity`: players, bullets and bot behaviour
//! - `game`: the authority that owns every entity
//! - `session`: address to session id bookkeeping
//! - `dispatch`: client actions in, outgoing messages out
//! - `broadcast`: per-recipient identity rewrite
//! - `network`: the UDP tasks and the tick loop
//! - `assets` and `config`: startup configuration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::assets::Assets;
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let assets = Assets::load(&config)?;
//!
//!     let mut server = Server::new(config, assets).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod broadcast;
pub mod collision;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod game;
pub mod network;
pub mod session;
