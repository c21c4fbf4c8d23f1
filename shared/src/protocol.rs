//! Wire protocol: JSON actions inside a length-prefixed datagram.
//!
//! Every datagram in either direction is `<len>!<json>` where `<len>` is the ASCII
//! decimal byte length of the JSON body, e.g. `58!{"type":"move",...}`. The body is
//! an [`Action`]:
//!
//! ```json
//! { "type": "move", "action_parameters": [120.0, 80.0], "player_id": 3 }
//! ```
//!
//! `player_id` is only present on server-to-client messages, where `0` means the
//! action belongs to the recipient itself.

use crate::{Direction, MAX_DATAGRAM_SIZE, MESSAGE_DIVIDER};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Longest accepted length prefix; anything longer cannot fit in a datagram anyway.
const MAX_PREFIX_DIGITS: usize = 5;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("datagram has no '!' length delimiter")]
    MissingLengthPrefix,
    #[error("invalid length prefix {0:?}")]
    InvalidLengthPrefix(String),
    #[error("length mismatch: prefix says {expected} bytes, body has {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("payload of {0} bytes exceeds the datagram limit")]
    PayloadTooLarge(usize),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{action} expects at least {expected} parameters, got {got}")]
    MissingParameters {
        action: ActionType,
        expected: usize,
        got: usize,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("{0} is not accepted from clients")]
    UnexpectedType(ActionType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Move,
    Shoot,
    PlayerInit,
    Hit,
    Disconnect,
    GameOver,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Move => "move",
            ActionType::Shoot => "shoot",
            ActionType::PlayerInit => "player_init",
            ActionType::Hit => "hit",
            ActionType::Disconnect => "disconnect",
            ActionType::GameOver => "game_over",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub action_parameters: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<u32>,
}

impl Action {
    pub fn new(action_type: ActionType, action_parameters: Vec<Value>) -> Self {
        Self {
            action_type,
            action_parameters,
            player_id: None,
        }
    }

    pub fn move_to(x: f32, y: f32) -> Self {
        Self::new(ActionType::Move, vec![Value::from(x), Value::from(y)])
    }

    pub fn move_step(direction: Direction) -> Self {
        Self::new(ActionType::Move, vec![Value::from(direction.as_str())])
    }

    pub fn shoot(dx: f32, dy: f32) -> Self {
        Self::new(ActionType::Shoot, vec![Value::from(dx), Value::from(dy)])
    }

    /// Client request to join with the given character.
    pub fn player_init(character_name: &str) -> Self {
        Self::new(ActionType::PlayerInit, vec![Value::from(character_name)])
    }

    /// Server announcement of a spawned player.
    pub fn player_spawn(character_name: &str, x: f32, y: f32) -> Self {
        Self::new(
            ActionType::PlayerInit,
            vec![Value::from(character_name), Value::from(x), Value::from(y)],
        )
    }

    pub fn hit(damage: u32) -> Self {
        Self::new(ActionType::Hit, vec![Value::from(damage)])
    }

    pub fn disconnect() -> Self {
        Self::new(ActionType::Disconnect, Vec::new())
    }

    pub fn game_over_win() -> Self {
        Self::new(ActionType::GameOver, vec![Value::from("win")])
    }

    pub fn game_over_draw() -> Self {
        Self::new(ActionType::GameOver, vec![Value::from("draw")])
    }

    pub fn with_player_id(mut self, player_id: u32) -> Self {
        self.player_id = Some(player_id);
        self
    }

    /// Interprets a client-sent action, checking the parameter list for its type.
    pub fn command(&self) -> Result<ClientCommand, ProtocolError> {
        let params = &self.action_parameters;
        match self.action_type {
            ActionType::Move => match params.first() {
                Some(Value::String(direction)) => {
                    Ok(ClientCommand::Move(MoveCommand::Step(direction.parse()?)))
                }
                Some(_) => {
                    self.require(2)?;
                    Ok(ClientCommand::Move(MoveCommand::To {
                        x: number_at(params, 0)?,
                        y: number_at(params, 1)?,
                    }))
                }
                None => Err(self.missing(1)),
            },
            ActionType::Shoot => {
                self.require(2)?;
                Ok(ClientCommand::Shoot {
                    dx: number_at(params, 0)?,
                    dy: number_at(params, 1)?,
                })
            }
            ActionType::PlayerInit => {
                self.require(1)?;
                let character_name = params[0]
                    .as_str()
                    .ok_or_else(|| {
                        ProtocolError::InvalidParameter("character name must be a string".into())
                    })?
                    .to_string();
                Ok(ClientCommand::PlayerInit { character_name })
            }
            ActionType::Disconnect => Ok(ClientCommand::Disconnect),
            other => Err(ProtocolError::UnexpectedType(other)),
        }
    }

    fn require(&self, expected: usize) -> Result<(), ProtocolError> {
        if self.action_parameters.len() < expected {
            Err(self.missing(expected))
        } else {
            Ok(())
        }
    }

    fn missing(&self, expected: usize) -> ProtocolError {
        ProtocolError::MissingParameters {
            action: self.action_type,
            expected,
            got: self.action_parameters.len(),
        }
    }
}

fn number_at(params: &[Value], index: usize) -> Result<f32, ProtocolError> {
    params[index]
        .as_f64()
        .map(|value| value as f32)
        .filter(|value| value.is_finite())
        .ok_or_else(|| {
            ProtocolError::InvalidParameter(format!(
                "parameter {index} must be a finite number, got {}",
                params[index]
            ))
        })
}

/// Movement request in one of the two supported shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveCommand {
    /// `[x, y]`: absolute coordinates reported by the client.
    To { x: f32, y: f32 },
    /// `[direction]`: one server-validated step.
    Step(Direction),
}

/// What a client may ask the server to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Move(MoveCommand),
    Shoot { dx: f32, dy: f32 },
    PlayerInit { character_name: String },
    Disconnect,
}

/// Serializes an action and prepends its length prefix.
pub fn encode_frame(action: &Action) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(action)?;
    let mut frame = body.len().to_string().into_bytes();
    frame.push(MESSAGE_DIVIDER);
    frame.extend_from_slice(&body);
    if frame.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::PayloadTooLarge(frame.len()));
    }
    Ok(frame)
}

/// Parses one length-prefixed datagram into an action.
///
/// The prefix must be plain decimal digits and must match the body length exactly.
pub fn decode_frame(data: &[u8]) -> Result<Action, ProtocolError> {
    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }

    let divider = data
        .iter()
        .position(|&byte| byte == MESSAGE_DIVIDER)
        .ok_or(ProtocolError::MissingLengthPrefix)?;
    let (prefix, rest) = data.split_at(divider);
    let body = &rest[1..];

    if prefix.is_empty()
        || prefix.len() > MAX_PREFIX_DIGITS
        || !prefix.iter().all(u8::is_ascii_digit)
    {
        return Err(ProtocolError::InvalidLengthPrefix(
            String::from_utf8_lossy(prefix).into_owned(),
        ));
    }

    // Only ASCII digits, so this cannot fail.
    let expected: usize = std::str::from_utf8(prefix)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| {
            ProtocolError::InvalidLengthPrefix(String::from_utf8_lossy(prefix).into_owned())
        })?;

    if body.len() != expected {
        return Err(ProtocolError::LengthMismatch {
            expected,
            actual: body.len(),
        });
    }

    Ok(serde_json::from_slice(body)?)
}
