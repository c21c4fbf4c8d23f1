//! The authoritative game state.
//!
//! `GameState` owns every player and bullet. It is only ever touched from the tick
//! loop, so none of its operations lock; callers elsewhere refer to players by id.
//! Operations on an id that is not (or no longer) present are silent no-ops, since a
//! disconnect can race an action that is already queued.

use crate::assets::{Assets, CharacterTable};
use crate::collision::CollisionMaps;
use crate::entity::{self, Bullet, BulletStep, PlayerKind, PlayerState};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Direction, CHARACTER_HEIGHT, CHARACTER_WIDTH};
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;

/// Random spawn candidates tried before falling back to [`FALLBACK_SPAWN`].
pub const SPAWN_ATTEMPTS: usize = 100;
pub const FALLBACK_SPAWN: (f32, f32) = (100.0, 50.0);
/// Bots are numbered from here so they never collide with session ids.
pub const BOT_ID_BASE: u32 = 1_000_000;

#[derive(Debug, Error, PartialEq)]
pub enum GameError {
    #[error("no character named {0:?}")]
    UnknownCharacter(String),
}

/// A bullet striking a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub victim: u32,
    pub damage: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Winner(u32),
    Draw,
}

/// Something a bot did that clients need to hear about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BotEvent {
    Moved { id: u32, x: f32, y: f32 },
    Shot { id: u32, dx: f32, dy: f32 },
}

pub struct GameState {
    pub tick: u64,
    /// Ordered by id so that hit resolution is reproducible.
    players: BTreeMap<u32, PlayerState>,
    characters: CharacterTable,
    maps: CollisionMaps,
    rng: StdRng,
    next_bot_id: u32,
}

impl GameState {
    pub fn new(assets: Assets) -> Self {
        Self::with_rng(assets, StdRng::from_entropy())
    }

    pub fn with_seed(assets: Assets, seed: u64) -> Self {
        Self::with_rng(assets, StdRng::seed_from_u64(seed))
    }

    fn with_rng(assets: Assets, rng: StdRng) -> Self {
        Self {
            tick: 0,
            players: BTreeMap::new(),
            characters: assets.characters,
            maps: assets.maps,
            rng,
            next_bot_id: BOT_ID_BASE,
        }
    }

    /// Spawns a client-driven player at a free position and returns its coordinates.
    ///
    /// Re-initialising an existing id replaces the old player.
    pub fn create_player(
        &mut self,
        session_id: u32,
        character_name: &str,
    ) -> Result<(f32, f32), GameError> {
        self.spawn(session_id, PlayerKind::Remote, character_name)
    }

    /// Spawns a server-driven player and returns its id.
    pub fn spawn_bot(&mut self, character_name: &str) -> Result<u32, GameError> {
        let id = self.next_bot_id;
        self.spawn(id, PlayerKind::bot(), character_name)?;
        self.next_bot_id += 1;
        Ok(id)
    }

    fn spawn(
        &mut self,
        id: u32,
        kind: PlayerKind,
        character_name: &str,
    ) -> Result<(f32, f32), GameError> {
        let stats = self
            .characters
            .get(character_name)
            .cloned()
            .ok_or_else(|| GameError::UnknownCharacter(character_name.to_string()))?;

        let (x, y) = self.find_free_position(CHARACTER_WIDTH, CHARACTER_HEIGHT);
        let player = PlayerState::new(id, kind, &stats, x, y);

        info!(
            "Added player {} ({}) at ({}, {})",
            id, character_name, player.x, player.y
        );
        self.players.insert(id, player);
        Ok((x, y))
    }

    /// Samples random positions until one is legal on the player map.
    pub fn find_free_position(&mut self, width: u32, height: u32) -> (f32, f32) {
        let map = &self.maps.player;
        if map.width() < width || map.height() < height {
            return FALLBACK_SPAWN;
        }
        let max_x = map.width() - width;
        let max_y = map.height() - height;

        for _ in 0..SPAWN_ATTEMPTS {
            let x = self.rng.gen_range(0..=max_x) as f32;
            let y = self.rng.gen_range(0..=max_y) as f32;
            if map.is_legal(x, y, width, height) {
                return (x, y);
            }
        }

        debug!("No free spawn found in {} attempts", SPAWN_ATTEMPTS);
        FALLBACK_SPAWN
    }

    pub fn delete_player(&mut self, session_id: u32) -> bool {
        if self.players.remove(&session_id).is_some() {
            info!("Removed player {}", session_id);
            true
        } else {
            false
        }
    }

    pub fn get_player(&self, session_id: u32) -> Option<&PlayerState> {
        self.players.get(&session_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn bullet_count(&self) -> usize {
        self.players.values().map(|p| p.bullets.len()).sum()
    }

    /// Whether the player could stand at `(x, y)` on the player map.
    pub fn can_occupy(&self, session_id: u32, x: f32, y: f32) -> bool {
        self.players
            .get(&session_id)
            .is_some_and(|p| self.maps.player.is_legal(x, y, p.width, p.height))
    }

    /// Overwrites a player's position without checking terrain.
    pub fn set_position(&mut self, session_id: u32, x: f32, y: f32) {
        if let Some(player) = self.players.get_mut(&session_id) {
            player.x = x;
            player.y = y;
        }
    }

    /// Moves one step of the player's speed in `direction` if the destination is open
    /// terrain. Facing always follows the request. Returns the resulting position.
    pub fn move_relative(&mut self, session_id: u32, direction: Direction) -> Option<(f32, f32)> {
        let player = self.players.get_mut(&session_id)?;
        let (ux, uy) = direction.unit();
        let (dx, dy) = (ux * player.speed, uy * player.speed);

        player.facing = direction;
        if Self::step(&self.maps, player, dx, dy) {
            debug!("Player {} moved {} to ({}, {})", session_id, direction, player.x, player.y);
        }
        Some((player.x, player.y))
    }

    fn step(maps: &CollisionMaps, player: &mut PlayerState, dx: f32, dy: f32) -> bool {
        let (x, y) = (player.x + dx, player.y + dy);
        if maps.player.is_legal(x, y, player.width, player.height) {
            player.x = x;
            player.y = y;
            true
        } else {
            false
        }
    }

    pub fn shoot(&mut self, session_id: u32, dx: f32, dy: f32) -> bool {
        self.shoot_at(session_id, dx, dy, Instant::now())
    }

    /// Fires a bullet from the player's centre unless the weapon is still cooling
    /// down. Returns whether a bullet was created.
    pub fn shoot_at(&mut self, session_id: u32, dx: f32, dy: f32, now: Instant) -> bool {
        let Some(player) = self.players.get_mut(&session_id) else {
            return false;
        };
        if !player.can_shoot(now) {
            return false;
        }

        player.last_shot = Some(now);
        let (x, y) = player.center();
        player.bullets.push(Bullet::new(
            session_id,
            x,
            y,
            dx,
            dy,
            player.bullet_damage,
            player.bullet_lifespan,
        ));
        true
    }

    /// Advances every bullet by one tick and resolves hits.
    pub fn advance_tick(&mut self) -> Vec<Hit> {
        self.tick += 1;
        let mut hits = Vec::new();

        let owners: Vec<u32> = self.players.keys().copied().collect();
        for owner in owners {
            let bullets = match self.players.get_mut(&owner) {
                Some(player) if !player.bullets.is_empty() => std::mem::take(&mut player.bullets),
                _ => continue,
            };

            let mut survivors = Vec::with_capacity(bullets.len());
            for mut bullet in bullets {
                if bullet.advance(&self.maps.bullet) != BulletStep::Flying {
                    continue;
                }
                match self.strike(&bullet) {
                    Some(hit) => hits.push(hit),
                    None => survivors.push(bullet),
                }
            }

            if let Some(player) = self.players.get_mut(&owner) {
                player.bullets = survivors;
            }
        }

        hits
    }

    /// Applies a bullet to the first player (by id) it overlaps, never its owner.
    fn strike(&mut self, bullet: &Bullet) -> Option<Hit> {
        let victim = self
            .players
            .values_mut()
            .find(|p| p.id != bullet.owner && p.contains_point(bullet.x, bullet.y))?;
        let remaining = victim.take_damage(bullet.damage);
        info!(
            "Player {} hit player {} for {} ({} hp left)",
            bullet.owner, victim.id, bullet.damage, remaining
        );
        Some(Hit {
            victim: victim.id,
            damage: bullet.damage,
        })
    }

    /// Lets every living bot act once.
    pub fn advance_bots(&mut self, now: Instant) -> Vec<BotEvent> {
        let bots: Vec<u32> = self
            .players
            .values()
            .filter(|p| p.kind.is_bot() && p.is_alive())
            .map(|p| p.id)
            .collect();

        let mut events = Vec::new();
        for id in bots {
            let target = self.nearest_opponent(id);
            let Some(player) = self.players.get(&id) else {
                continue;
            };
            let intent = entity::advance(player, target, &mut self.rng);

            if let Some(player) = self.players.get_mut(&id) {
                if let Some(facing) = intent.facing {
                    player.facing = facing;
                }
                let (dx, dy) = intent.step;
                if (dx != 0.0 || dy != 0.0) && Self::step(&self.maps, player, dx, dy) {
                    events.push(BotEvent::Moved {
                        id,
                        x: player.x,
                        y: player.y,
                    });
                }
            }

            if let Some((dx, dy)) = intent.fire {
                if self.shoot_at(id, dx, dy, now) {
                    events.push(BotEvent::Shot { id, dx, dy });
                }
            }
        }
        events
    }

    fn nearest_opponent(&self, id: u32) -> Option<(f32, f32)> {
        let me = self.players.get(&id)?;
        self.players
            .values()
            .filter(|p| p.id != id && p.is_alive())
            .map(|p| (p.x, p.y))
            .min_by(|a, b| {
                let da = (a.0 - me.x).hypot(a.1 - me.y);
                let db = (b.0 - me.x).hypot(b.1 - me.y);
                da.total_cmp(&db)
            })
    }

    /// Winner or draw once at least two players are in the arena and at most one
    /// is still standing.
    pub fn verdict(&self) -> Option<Verdict> {
        if self.players.len() < 2 {
            return None;
        }
        let mut alive = self.players.values().filter(|p| p.is_alive());
        match (alive.next(), alive.next()) {
            (None, _) => Some(Verdict::Draw),
            (Some(winner), None) => Some(Verdict::Winner(winner.id)),
            _ => None,
        }
    }

    /// Clears the arena for a new round.
    pub fn reset(&mut self) {
        info!("Resetting arena ({} players removed)", self.players.len());
        self.players.clear();
    }
}
