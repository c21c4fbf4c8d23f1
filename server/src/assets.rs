//! Static configuration loaded once at startup: the character table and the two
//! collision masks. Failing to load any of them is fatal for the process.

use crate::collision::{CollisionMap, CollisionMaps};
use crate::config::ServerConfig;
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse character table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to decode collision map {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("character table is empty")]
    EmptyCharacterTable,
    #[error("character {0:?} is defined twice")]
    DuplicateCharacter(String),
    #[error("collision map is empty ({width}x{height})")]
    EmptyMap { width: u32, height: u32 },
}

/// Template stats for one playable character.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CharacterStats {
    pub name: String,
    pub hp: u32,
    /// Pixels per movement step.
    pub speed: f32,
    /// Magnitude of the velocity bots give their bullets; clients pre-scale their own.
    pub bullet_speed: f32,
    pub bullet_damage: u32,
    /// Bullet lifetime in ticks.
    pub bullet_lifespan: u32,
    /// Minimum time between shots, in milliseconds.
    pub shooting_cooldown: u64,
}

impl CharacterStats {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.shooting_cooldown)
    }
}

#[derive(Deserialize)]
struct CharacterFile {
    characters: Vec<CharacterStats>,
}

#[derive(Debug, Clone, Default)]
pub struct CharacterTable {
    characters: HashMap<String, CharacterStats>,
}

impl CharacterTable {
    pub fn from_json_str(json: &str) -> Result<Self, AssetError> {
        let file: CharacterFile = serde_json::from_str(json)?;
        Self::from_characters(file.characters)
    }

    pub fn from_characters(
        characters: impl IntoIterator<Item = CharacterStats>,
    ) -> Result<Self, AssetError> {
        let mut table = HashMap::new();
        for stats in characters {
            if table.contains_key(&stats.name) {
                return Err(AssetError::DuplicateCharacter(stats.name));
            }
            table.insert(stats.name.clone(), stats);
        }
        if table.is_empty() {
            return Err(AssetError::EmptyCharacterTable);
        }
        Ok(Self { characters: table })
    }

    pub fn load(path: &Path) -> Result<Self, AssetError> {
        let json = std::fs::read_to_string(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn get(&self, name: &str) -> Option<&CharacterStats> {
        self.characters.get(name)
    }

    fn len(&self) -> usize {
        self.characters.len()
    }
}

/// Everything the game authority needs from disk.
#[derive(Debug, Clone)]
pub struct Assets {
    pub characters: CharacterTable,
    pub maps: CollisionMaps,
}

impl Assets {
    pub fn load(config: &ServerConfig) -> Result<Self, AssetError> {
        let characters = CharacterTable::load(&config.characters_path)?;
        info!(
            "Loaded {} characters from {}",
            characters.len(),
            config.characters_path.display()
        );

        let player = CollisionMap::open(&config.player_map_path)?;
        let bullet = CollisionMap::open(&config.bullet_map_path)?;
        info!(
            "Loaded collision maps: player {}x{}, bullet {}x{}",
            player.width(),
            player.height(),
            bullet.width(),
            bullet.height()
        );

        Ok(Self {
            characters,
            maps: CollisionMaps { player, bullet },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "characters": [
            {"name": "Ninja", "hp": 100, "speed": 4, "bullet_speed": 8,
             "bullet_damage": 10, "bullet_lifespan": 60, "shooting_cooldown": 300},
            {"name": "Samurai", "hp": 140, "speed": 3, "bullet_speed": 6,
             "bullet_damage": 18, "bullet_lifespan": 45, "shooting_cooldown": 600}
        ]
    }"#;

    #[test]
    fn test_parse_character_table() {
        let table = CharacterTable::from_json_str(TABLE).unwrap();
        assert_eq!(table.len(), 2);

        let ninja = table.get("Ninja").unwrap();
        assert_eq!(ninja.hp, 100);
        assert_eq!(ninja.speed, 4.0);
        assert_eq!(ninja.bullet_lifespan, 60);
        assert_eq!(ninja.cooldown(), Duration::from_millis(300));

        assert!(table.get("Pirate").is_none());
    }

    #[test]
    fn test_duplicate_character_rejected() {
        let json = r#"{"characters": [
            {"name": "A", "hp": 1, "speed": 1, "bullet_speed": 1,
             "bullet_damage": 1, "bullet_lifespan": 1, "shooting_cooldown": 1},
            {"name": "A", "hp": 2, "speed": 2, "bullet_speed": 2,
             "bullet_damage": 2, "bullet_lifespan": 2, "shooting_cooldown": 2}
        ]}"#;
        assert!(matches!(
            CharacterTable::from_json_str(json),
            Err(AssetError::DuplicateCharacter(name)) if name == "A"
        ));
    }

    #[test]
    fn test_empty_and_malformed_tables_rejected() {
        assert!(matches!(
            CharacterTable::from_json_str(r#"{"characters": []}"#),
            Err(AssetError::EmptyCharacterTable)
        ));
        assert!(matches!(
            CharacterTable::from_json_str(r#"{"characters": [{"name": "A"}]}"#),
            Err(AssetError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let result = CharacterTable::load(Path::new("does/not/exist.json"));
        match result {
            Err(AssetError::Io { path, .. }) => {
                assert_eq!(path, PathBuf::from("does/not/exist.json"))
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn test_bundled_character_table_parses() {
        let json = include_str!("../../assets/characters.json");
        let table = CharacterTable::from_json_str(json).unwrap();
        let ninja = table.get("Ninja").unwrap();
        assert_eq!(ninja.hp, 100);
        assert_eq!(ninja.speed, 4.0);
    }
}
