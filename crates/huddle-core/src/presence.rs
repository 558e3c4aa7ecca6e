//! Presence and typing coordination.
//!
//! Presence is stateless: every snapshot is recomputed from the connection
//! registry at the moment of the membership change, so a snapshot can never
//! disagree with the registry. Typing signals are transient pass-through
//! broadcasts; the server stores nothing and expires nothing, the emitting
//! client owns the timeout for its own indicator.

use crate::{
    driver::RelayAction,
    event::ServerEvent,
    registry::ConnectionRegistry,
    room::RoomCode,
};

/// Presence snapshot broadcast for `room`, sent to every member.
///
/// Emitted after any membership change (create, join, disconnect, kick).
pub fn active_users(registry: &ConnectionRegistry, room: &RoomCode) -> RelayAction {
    let users: Vec<String> = registry.users_in_room(room).into_iter().collect();

    RelayAction::BroadcastToRoom {
        room: room.clone(),
        event: ServerEvent::ActiveUsers { users },
        exclude: None,
    }
}

/// Global live-room count broadcast, sent to every connection.
///
/// The count is captured here, inside the dispatch step, so the broadcast
/// value always matches the registry state that produced it.
pub fn room_count(registry: &ConnectionRegistry) -> RelayAction {
    RelayAction::BroadcastToAll {
        event: ServerEvent::RoomCountUpdate { count: registry.active_room_count() },
    }
}

/// Typing signal from `conn_id`, fanned out to every *other* room member.
///
/// Returns `None` when the connection has no current room: typing in the
/// lobby is a no-op, not an error.
pub fn typing(
    registry: &ConnectionRegistry,
    conn_id: u64,
    display_name: &str,
) -> Option<RelayAction> {
    let room = registry.get(conn_id)?.room.clone()?;

    Some(RelayAction::BroadcastToRoom {
        room,
        event: ServerEvent::Typing { display_name: display_name.to_string() },
        exclude: Some(conn_id),
    })
}

/// Stop-typing signal from `conn_id`, fanned out to every other member.
pub fn stop_typing(registry: &ConnectionRegistry, conn_id: u64) -> Option<RelayAction> {
    let room = registry.get(conn_id)?.room.clone()?;

    Some(RelayAction::BroadcastToRoom {
        room,
        event: ServerEvent::StopTyping,
        exclude: Some(conn_id),
    })
}
