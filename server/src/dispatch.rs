//! Turns inbound client actions and simulation outcomes into outgoing messages.
//!
//! Nothing here touches the network. Each function mutates the [`GameState`] and
//! returns the [`GameMessage`]s the sender task should deliver.

use crate::game::{BotEvent, GameState, Hit, Verdict};
use log::{debug, warn};
use shared::{Action, ClientCommand, MoveCommand};
use std::time::Instant;

/// Outgoing traffic queued for the sender task.
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    /// To every session, with `player_id` rewritten per recipient.
    Broadcast { origin: u32, action: Action },
    /// To a single session, sent as-is.
    Unicast { session_id: u32, action: Action },
    /// To every session, sent as-is.
    Announce { action: Action },
}

impl GameMessage {
    fn broadcast(origin: u32, action: Action) -> Self {
        GameMessage::Broadcast { origin, action }
    }

    /// Rebroadcasts a client action with the parameters exactly as the client sent them.
    fn relay(origin: u32, action: &Action) -> Self {
        Self::broadcast(
            origin,
            Action::new(action.action_type, action.action_parameters.clone()),
        )
    }
}

/// Applies client actions to the game.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    /// Drop absolute moves that end on blocked terrain instead of trusting the client.
    validate_moves: bool,
}

impl Dispatcher {
    pub fn new(validate_moves: bool) -> Self {
        Self { validate_moves }
    }

    /// Applies one action from `session_id`. Malformed or rejected actions are logged
    /// and produce no messages.
    pub fn apply(
        &self,
        game: &mut GameState,
        session_id: u32,
        action: &Action,
        now: Instant,
    ) -> Vec<GameMessage> {
        let command = match action.command() {
            Ok(command) => command,
            Err(e) => {
                warn!("Dropping {} from session {}: {}", action.action_type, session_id, e);
                return Vec::new();
            }
        };

        match command {
            ClientCommand::PlayerInit { character_name } => {
                self.player_init(game, session_id, &character_name)
            }
            ClientCommand::Move(MoveCommand::To { x, y }) => {
                if game.get_player(session_id).is_none() {
                    return Vec::new();
                }
                if self.validate_moves && !game.can_occupy(session_id, x, y) {
                    debug!("Rejected move of player {} to ({}, {})", session_id, x, y);
                    return Vec::new();
                }
                game.set_position(session_id, x, y);
                vec![GameMessage::relay(session_id, action)]
            }
            ClientCommand::Move(MoveCommand::Step(direction)) => game
                .move_relative(session_id, direction)
                .map(|(x, y)| GameMessage::broadcast(session_id, Action::move_to(x, y)))
                .into_iter()
                .collect(),
            ClientCommand::Shoot { dx, dy } => {
                if game.shoot_at(session_id, dx, dy, now) {
                    vec![GameMessage::relay(session_id, action)]
                } else {
                    Vec::new()
                }
            }
            ClientCommand::Disconnect => self.close_session(game, session_id),
        }
    }

    /// Spawns the player, announces it to everyone and catches the newcomer up on
    /// every player that was already in the arena.
    fn player_init(
        &self,
        game: &mut GameState,
        session_id: u32,
        character_name: &str,
    ) -> Vec<GameMessage> {
        let (x, y) = match game.create_player(session_id, character_name) {
            Ok(position) => position,
            Err(e) => {
                warn!("Rejected player_init from session {}: {}", session_id, e);
                return Vec::new();
            }
        };

        let mut messages = vec![GameMessage::broadcast(
            session_id,
            Action::player_spawn(character_name, x, y),
        )];
        messages.extend(
            game.players()
                .filter(|player| player.id != session_id)
                .map(|player| GameMessage::Unicast {
                    session_id,
                    action: Action::player_spawn(&player.character, player.x, player.y)
                        .with_player_id(player.id),
                }),
        );
        messages
    }

    /// Removes a departed session's player and tells everyone else it is gone.
    pub fn close_session(&self, game: &mut GameState, session_id: u32) -> Vec<GameMessage> {
        if game.delete_player(session_id) {
            vec![GameMessage::broadcast(session_id, Action::disconnect())]
        } else {
            Vec::new()
        }
    }
}

/// One `hit` per victim, broadcast so the victim sees itself as player 0.
pub fn hit_messages(hits: &[Hit]) -> Vec<GameMessage> {
    hits.iter()
        .map(|hit| GameMessage::broadcast(hit.victim, Action::hit(hit.damage)))
        .collect()
}

pub fn bot_messages(events: &[BotEvent]) -> Vec<GameMessage> {
    events
        .iter()
        .map(|event| match *event {
            BotEvent::Moved { id, x, y } => GameMessage::broadcast(id, Action::move_to(x, y)),
            BotEvent::Shot { id, dx, dy } => GameMessage::broadcast(id, Action::shoot(dx, dy)),
        })
        .collect()
}

pub fn verdict_message(verdict: Verdict) -> GameMessage {
    match verdict {
        Verdict::Winner(id) => GameMessage::broadcast(id, Action::game_over_win()),
        Verdict::Draw => GameMessage::Announce {
            action: Action::game_over_draw(),
        },
    }
}
