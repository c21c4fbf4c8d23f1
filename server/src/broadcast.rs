//! Per-recipient fan-out of outgoing actions.
//!
//! Every client renders "my player" and "other players" with the same code path, so
//! each copy of a broadcast action is rewritten for its recipient: the origin sees
//! `player_id == 0`, everyone else sees the origin's session id.

use shared::{Action, SELF_PLAYER_ID};
use std::net::SocketAddr;

/// The `player_id` that `recipient` should see for an action from `origin`.
pub fn player_id_for(origin: u32, recipient: u32) -> u32 {
    if recipient == origin {
        SELF_PLAYER_ID
    } else {
        origin
    }
}

/// One rewritten copy of `action` per recipient.
pub fn fan_out(
    origin: u32,
    action: &Action,
    recipients: &[(u32, SocketAddr)],
) -> Vec<(SocketAddr, Action)> {
    recipients
        .iter()
        .map(|&(recipient, addr)| {
            let copy = action
                .clone()
                .with_player_id(player_id_for(origin, recipient));
            (addr, copy)
        })
        .collect()
}
