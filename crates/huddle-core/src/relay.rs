//! Message relay: validate, persist, broadcast.
//!
//! Inbound messages resolve their room through the connection registry; a
//! connection with no current room is silently dropped, not treated as an
//! error - lobby chatter has nowhere to go. Persistence happens
//! before broadcast so every client, the sender included, renders from the
//! authoritative stored message rather than optimistic local state.

use crate::{
    driver::{LogLevel, RelayAction},
    env::Environment,
    event::ServerEvent,
    registry::ConnectionRegistry,
    storage::{MessageStore, NewMessage},
};

/// Persist an inbound message and broadcast it to the sender's room.
///
/// The timestamp is assigned here, at persist time, from the environment
/// clock; the store assigns the id and the room-local sequence number. On
/// persistence failure the message is logged and dropped: the sender
/// receives no error and no echo.
pub fn send_message<S: MessageStore, E: Environment>(
    registry: &ConnectionRegistry,
    store: &S,
    env: &E,
    conn_id: u64,
    sender: &str,
    text: &str,
) -> Vec<RelayAction> {
    let Some(room) = registry.get(conn_id).and_then(|entry| entry.room.clone()) else {
        return vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("message from {sender} dropped: conn {conn_id} not in a room"),
        }];
    };

    let message = NewMessage {
        room: room.clone(),
        sender: sender.to_string(),
        text: text.to_string(),
        timestamp_ms: env.now_millis(),
    };

    match store.append(message) {
        Ok(stored) => vec![RelayAction::BroadcastToRoom {
            room,
            event: ServerEvent::ReceiveMessage { message: stored },
            exclude: None,
        }],
        Err(err) => vec![RelayAction::Log {
            level: LogLevel::Error,
            message: format!("failed to persist message from {sender} in room {room}: {err}"),
        }],
    }
}

/// Delete a message by id and notify the sender's room.
///
/// No ownership check: any member of a room may delete any message in it.
/// A connection with no current room is a silent no-op. The removal notice
/// goes out whether or not the id existed, mirroring the idempotent store
/// delete.
pub fn delete_message<S: MessageStore>(
    registry: &ConnectionRegistry,
    store: &S,
    conn_id: u64,
    id: u64,
) -> Vec<RelayAction> {
    let Some(room) = registry.get(conn_id).and_then(|entry| entry.room.clone()) else {
        return Vec::new();
    };

    match store.delete_by_id(id) {
        Ok(()) => vec![RelayAction::BroadcastToRoom {
            room,
            event: ServerEvent::MessageDeleted { id },
            exclude: None,
        }],
        Err(err) => vec![RelayAction::Log {
            level: LogLevel::Error,
            message: format!("failed to delete message {id} in room {room}: {err}"),
        }],
    }
}
