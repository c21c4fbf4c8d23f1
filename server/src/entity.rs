//! Players and bullets as the authority stores them.

use crate::assets::CharacterStats;
use crate::collision::CollisionMap;
use rand::Rng;
use shared::{Direction, BULLET_RADIUS, CHARACTER_HEIGHT, CHARACTER_WIDTH};
use std::time::{Duration, Instant};

/// Bots open fire once a target is this close.
pub const BOT_SHOOT_DISTANCE: f32 = 250.0;
/// Bots back away from targets closer than this.
pub const BOT_RETREAT_DISTANCE: f32 = BOT_SHOOT_DISTANCE - 50.0;
const BOT_DODGE_CHANCE: f64 = 0.1;
const BOT_FIRE_CHANCE: f64 = 0.02;

/// Who drives a player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerKind {
    /// Driven by actions from a connected client.
    Remote,
    /// Driven by the server every tick.
    Bot {
        shoot_distance: f32,
        retreat_distance: f32,
    },
}

impl PlayerKind {
    pub fn bot() -> Self {
        PlayerKind::Bot {
            shoot_distance: BOT_SHOOT_DISTANCE,
            retreat_distance: BOT_RETREAT_DISTANCE,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, PlayerKind::Bot { .. })
    }
}

#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: u32,
    pub kind: PlayerKind,
    pub character: String,
    pub x: f32,
    pub y: f32,
    pub width: u32,
    pub height: u32,
    pub facing: Direction,
    pub speed: f32,
    pub max_hp: u32,
    pub hp: u32,
    pub bullet_speed: f32,
    pub bullet_damage: u32,
    pub bullet_lifespan: u32,
    pub shooting_cooldown: Duration,
    pub last_shot: Option<Instant>,
    pub bullets: Vec<Bullet>,
}

impl PlayerState {
    pub fn new(id: u32, kind: PlayerKind, stats: &CharacterStats, x: f32, y: f32) -> Self {
        Self {
            id,
            kind,
            character: stats.name.clone(),
            x,
            y,
            width: CHARACTER_WIDTH,
            height: CHARACTER_HEIGHT,
            facing: Direction::default(),
            speed: stats.speed,
            max_hp: stats.hp,
            hp: stats.hp,
            bullet_speed: stats.bullet_speed,
            bullet_damage: stats.bullet_damage,
            bullet_lifespan: stats.bullet_lifespan,
            shooting_cooldown: stats.cooldown(),
            last_shot: None,
            bullets: Vec::new(),
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x + (self.width / 2) as f32,
            self.y + (self.height / 2) as f32,
        )
    }

    /// Half-open test: the right and bottom edges are outside the player.
    pub fn contains_point(&self, px: f32, py: f32) -> bool {
        px >= self.x
            && px < self.x + self.width as f32
            && py >= self.y
            && py < self.y + self.height as f32
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Applies damage, flooring health at zero. Returns the remaining health.
    pub fn take_damage(&mut self, damage: u32) -> u32 {
        self.hp = self.hp.saturating_sub(damage);
        self.hp
    }

    pub fn can_shoot(&self, now: Instant) -> bool {
        match self.last_shot {
            Some(last) => now.saturating_duration_since(last) > self.shooting_cooldown,
            None => true,
        }
    }
}

/// Outcome of moving a bullet one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletStep {
    Flying,
    Expired,
    Blocked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    pub radius: f32,
    pub damage: u32,
    /// Remaining ticks.
    pub lifespan: u32,
    /// Id of the shooter; only used to stop a bullet from hitting its owner.
    pub owner: u32,
}

impl Bullet {
    pub fn new(owner: u32, x: f32, y: f32, dx: f32, dy: f32, damage: u32, lifespan: u32) -> Self {
        Self {
            x,
            y,
            dx,
            dy,
            radius: BULLET_RADIUS,
            damage,
            lifespan,
            owner,
        }
    }

    /// Spends one tick of lifespan, then moves if the next position is open terrain.
    pub fn advance(&mut self, terrain: &CollisionMap) -> BulletStep {
        self.lifespan = self.lifespan.saturating_sub(1);
        if self.lifespan == 0 {
            return BulletStep::Expired;
        }

        let (next_x, next_y) = (self.x + self.dx, self.y + self.dy);
        let size = self.radius as u32;
        if terrain.is_legal(next_x, next_y, size, size) {
            self.x = next_x;
            self.y = next_y;
            BulletStep::Flying
        } else {
            BulletStep::Blocked
        }
    }
}

/// What a player wants to do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Intent {
    pub step: (f32, f32),
    pub facing: Option<Direction>,
    /// Bullet velocity, if the player wants to fire.
    pub fire: Option<(f32, f32)>,
}

/// Decides the next move for a player. Remote players are driven by the network and
/// never act on their own; bots chase, keep their distance from, and shoot at the
/// given target position.
pub fn advance(
    state: &PlayerState,
    target: Option<(f32, f32)>,
    rng: &mut impl Rng,
) -> Intent {
    match state.kind {
        PlayerKind::Remote => Intent::default(),
        PlayerKind::Bot {
            shoot_distance,
            retreat_distance,
        } => {
            let Some((target_x, target_y)) = target else {
                return Intent::default();
            };
            let distance_x = target_x - state.x;
            let distance_y = target_y - state.y;
            let distance = distance_x.hypot(distance_y);

            let toward = |delta: f32| if delta > 0.0 { state.speed } else { -state.speed };
            let (mut dx, mut dy) = if distance > shoot_distance {
                (toward(distance_x), toward(distance_y))
            } else if distance < retreat_distance {
                (-toward(distance_x), -toward(distance_y))
            } else {
                (0.0, 0.0)
            };

            if rng.gen_bool(BOT_DODGE_CHANCE) {
                dx = -dx;
                dy = -dy;
            }

            let facing = if distance_x.abs() > distance_y.abs() {
                if dx > 0.0 {
                    Direction::Right
                } else {
                    Direction::Left
                }
            } else if dy < 0.0 {
                Direction::Up
            } else {
                Direction::Down
            };

            let fire = (distance <= shoot_distance && rng.gen_bool(BOT_FIRE_CHANCE)).then(|| {
                let angle = distance_y.atan2(distance_x);
                (
                    angle.cos() * state.bullet_speed,
                    angle.sin() * state.bullet_speed,
                )
            });

            Intent {
                step: (dx, dy),
                facing: Some(facing),
                fire,
            }
        }
    }
}
