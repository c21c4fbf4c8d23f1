//! Performance benchmarks for the per-tick hot paths

use server::assets::{Assets, CharacterTable};
use server::broadcast::fan_out;
use server::collision::{CollisionMap, CollisionMaps};
use server::game::GameState;
use shared::{decode_frame, encode_frame, Action, Direction};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const TABLE: &str = r#"{"characters": [
    {"name": "Ninja", "hp": 100000, "speed": 4, "bullet_speed": 8,
     "bullet_damage": 1, "bullet_lifespan": 120, "shooting_cooldown": 0}
]}"#;

fn walled_map() -> CollisionMap {
    let mut map = CollisionMap::open_area(800, 600);
    map.fill_solid(0, 0, 800, 16);
    map.fill_solid(0, 584, 800, 16);
    map.fill_solid(200, 120, 32, 200);
    map.fill_solid(560, 280, 32, 200);
    map
}

fn game() -> GameState {
    let assets = Assets {
        characters: CharacterTable::from_json_str(TABLE).unwrap(),
        maps: CollisionMaps::shared(walled_map()),
    };
    GameState::with_seed(assets, 3)
}

/// Benchmarks rectangle legality checks against the collision mask
#[test]
fn benchmark_collision_queries() {
    let map = walled_map();
    let iterations = 100_000;
    let start = Instant::now();

    let mut legal = 0;
    for i in 0..iterations {
        let x = (i % 760) as f32;
        let y = (i % 560) as f32;
        if map.is_legal(x, y, 32, 32) {
            legal += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Collision queries: {} iterations in {:?} ({:.2} ns/iter, {} legal)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64,
        legal
    );

    assert!(legal > 0);
    // 32x32 perimeter checks stay far below a second even in debug builds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks a crowded tick: 32 players with 20 bullets each
#[test]
fn benchmark_crowded_tick() {
    let mut game = game();
    let now = Instant::now();
    for id in 1..=32 {
        game.create_player(id, "Ninja").unwrap();
    }
    for round in 0..20u32 {
        let angle = round as f32 * 0.3;
        let at = now + Duration::from_millis(round as u64 + 1);
        for id in 1..=32 {
            game.shoot_at(id, angle.cos() * 6.0, angle.sin() * 6.0, at);
        }
        game.advance_tick();
    }
    assert!(game.bullet_count() > 32);

    let ticks = 60;
    let start = Instant::now();
    let mut hits = 0;
    for _ in 0..ticks {
        hits += game.advance_tick().len();
    }
    let duration = start.elapsed();

    println!(
        "Crowded tick: {} ticks in {:?} ({:.2} ms/tick, {} hits)",
        ticks,
        duration,
        duration.as_secs_f64() * 1000.0 / ticks as f64,
        hits
    );

    // A 60Hz server has ~16ms per tick; allow slack for debug builds.
    assert!(duration < Duration::from_secs(ticks as u64 / 6));
}

/// Benchmarks relative movement with terrain validation
#[test]
fn benchmark_relative_movement() {
    let mut game = game();
    for id in 1..=16 {
        game.create_player(id, "Ninja").unwrap();
    }

    let directions = [Direction::Left, Direction::Right, Direction::Up, Direction::Down];
    let iterations = 50_000;
    let start = Instant::now();

    for i in 0..iterations {
        let id = (i % 16) as u32 + 1;
        game.move_relative(id, directions[i % 4]);
    }

    let duration = start.elapsed();
    println!(
        "Relative movement: {} moves in {:?} ({:.2} ns/move)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks framing plus fan-out of one action to a full server
#[test]
fn benchmark_broadcast_encoding() {
    let recipients: Vec<(u32, SocketAddr)> = (1..=32)
        .map(|id| (id, SocketAddr::from(([127, 0, 0, 1], 20_000 + id as u16))))
        .collect();
    let action = Action::move_to(123.5, 456.25);

    let iterations = 1_000;
    let start = Instant::now();

    let mut bytes = 0;
    for i in 0..iterations {
        for (_, copy) in fan_out((i % 32) as u32 + 1, &action, &recipients) {
            let frame = encode_frame(&copy).unwrap();
            bytes += frame.len();
            if i == 0 {
                assert_eq!(decode_frame(&frame).unwrap(), copy);
            }
        }
    }

    let duration = start.elapsed();
    println!(
        "Broadcast encoding: {} broadcasts ({} bytes) in {:?}",
        iterations, bytes, duration
    );
    assert!(duration.as_millis() < 3000);
}
