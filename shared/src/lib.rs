//! Types and constants shared by the arena server and its clients.
//!
//! Everything that crosses the wire lives in [`protocol`]; this module holds the
//! geometry constants both sides agree on and the movement [`Direction`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod protocol;

pub use protocol::{
    decode_frame, encode_frame, Action, ActionType, ClientCommand, MoveCommand, ProtocolError,
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12345;

/// Player id that tells a recipient "this action is your own".
pub const SELF_PLAYER_ID: u32 = 0;

pub const CHARACTER_WIDTH: u32 = 32;
pub const CHARACTER_HEIGHT: u32 = 32;
pub const BULLET_RADIUS: f32 = 3.0;

/// Separates the decimal length prefix from the JSON body.
pub const MESSAGE_DIVIDER: u8 = b'!';

/// Upper bound for a single datagram in either direction.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// One of the four movement directions a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    #[default]
    Down,
}

impl Direction {
    /// Unit step for this direction in screen space (y grows downwards).
    pub fn unit(self) -> (f32, f32) {
        match self {
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
            Direction::Up => (0.0, -1.0),
            Direction::Down => (0.0, 1.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(ProtocolError::InvalidParameter(format!(
                "unknown direction {other:?}"
            ))),
        }
    }
}
