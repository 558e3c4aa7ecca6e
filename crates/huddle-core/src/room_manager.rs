//! Room lifecycle: create, join, delete, owned-room listing.
//!
//! Rooms have no record of their own, so lifecycle operations are really
//! registry and store mutations keyed by a [`RoomCode`]: creation mints a
//! code that no live connection is using, joining registers membership and
//! replays history, deletion purges history and evicts the live members.
//!
//! Guest identities (display name carrying the guest marker) may create and
//! join rooms but are rejected from deletion and owned-room listing.

use crate::{
    driver::{LogLevel, RelayAction},
    env::Environment,
    event::ServerEvent,
    presence,
    registry::ConnectionRegistry,
    room::RoomCode,
    storage::MessageStore,
};

/// Suffix marking an ephemeral guest identity, e.g. `"anna (Guest)"`.
pub const GUEST_SUFFIX: &str = "(Guest)";

/// Maximum number of messages replayed when joining a room.
pub const HISTORY_REPLAY_LIMIT: usize = 50;

/// Whether a display name denotes an ephemeral guest.
pub fn is_guest(display_name: &str) -> bool {
    display_name.ends_with(GUEST_SUFFIX)
}

/// Create a fresh room and join the requester as its sole member.
///
/// The minted code is retried while it collides with a currently live room;
/// the 36^6 space makes more than one round vanishingly unlikely.
pub fn create_room<E: Environment>(
    registry: &mut ConnectionRegistry,
    env: &E,
    conn_id: u64,
    display_name: &str,
) -> Vec<RelayAction> {
    let room = loop {
        let candidate = RoomCode::mint(env);
        if !registry.is_room_live(&candidate) {
            break candidate;
        }
    };

    let departed = registry.get(conn_id).and_then(|entry| entry.room.clone());
    registry.upsert(conn_id, display_name, room.clone());

    let mut actions = vec![
        RelayAction::SendToConnection {
            conn_id,
            event: ServerEvent::RoomJoined { room: room.clone(), messages: Vec::new() },
        },
        presence::active_users(registry, &room),
    ];
    actions.extend(departed_room_updates(registry, departed.as_ref(), &room));
    actions.push(presence::room_count(registry));
    actions.push(RelayAction::Log {
        level: LogLevel::Info,
        message: format!("{display_name} created and joined room {room} (conn {conn_id})"),
    });

    actions
}

/// Presence refresh for a room the connection just moved out of.
///
/// Moving between rooms is a membership change for the departed room too:
/// its remaining members get a fresh snapshot. The global count is handled
/// by the caller (create always broadcasts it; join broadcasts when any
/// room flipped between live and empty).
fn departed_room_updates(
    registry: &ConnectionRegistry,
    departed: Option<&RoomCode>,
    joined: &RoomCode,
) -> Vec<RelayAction> {
    match departed {
        Some(previous) if previous != joined && registry.is_room_live(previous) => {
            vec![presence::active_users(registry, previous)]
        },
        _ => Vec::new(),
    }
}

/// Join a room by code, replaying recent history.
///
/// Any syntactically valid code is accepted without an existence check:
/// joining a room nobody has ever used succeeds with an empty replay. If
/// loading history fails the join still happens (membership and presence
/// stay consistent) but no reply is sent; the client sees nothing.
pub fn join_room<S: MessageStore>(
    registry: &mut ConnectionRegistry,
    store: &S,
    conn_id: u64,
    display_name: &str,
    room_input: &str,
) -> Vec<RelayAction> {
    let room = match RoomCode::parse(room_input) {
        Ok(room) => room,
        Err(err) => {
            return vec![RelayAction::SendToConnection {
                conn_id,
                event: ServerEvent::RoomError { message: format!("Invalid room code: {err}.") },
            }];
        },
    };

    let was_live = registry.is_room_live(&room);
    let departed = registry.get(conn_id).and_then(|entry| entry.room.clone());
    registry.upsert(conn_id, display_name, room.clone());

    let mut actions = Vec::new();

    match store.recent(&room, HISTORY_REPLAY_LIMIT) {
        Ok(messages) => {
            actions.push(RelayAction::SendToConnection {
                conn_id,
                event: ServerEvent::RoomJoined { room: room.clone(), messages },
            });
        },
        Err(err) => {
            actions.push(RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("failed to load history for room {room}: {err}"),
            });
        },
    }

    actions.push(presence::active_users(registry, &room));
    actions.extend(departed_room_updates(registry, departed.as_ref(), &room));

    let emptied_previous = departed
        .as_ref()
        .is_some_and(|previous| previous != &room && !registry.is_room_live(previous));
    if !was_live || emptied_previous {
        actions.push(presence::room_count(registry));
    }

    actions.push(RelayAction::Log {
        level: LogLevel::Info,
        message: format!("{display_name} joined room {room} (conn {conn_id})"),
    });

    actions
}

/// Delete a room: purge its history, kick its members, refresh counts.
///
/// Registered users only; guests receive a visible error and nothing
/// changes. Members are notified individually and then evicted to the
/// lobby, so the kick notices and the post-eviction room count are
/// computed from consistent registry states.
pub fn delete_room<S: MessageStore>(
    registry: &mut ConnectionRegistry,
    store: &S,
    conn_id: u64,
    display_name: &str,
    room_input: &str,
) -> Vec<RelayAction> {
    if is_guest(display_name) {
        return vec![RelayAction::SendToConnection {
            conn_id,
            event: ServerEvent::RoomError {
                message: "Guests are not allowed to delete rooms.".to_string(),
            },
        }];
    }

    let room = match RoomCode::parse(room_input) {
        Ok(room) => room,
        Err(err) => {
            return vec![RelayAction::SendToConnection {
                conn_id,
                event: ServerEvent::RoomError { message: format!("Invalid room code: {err}.") },
            }];
        },
    };

    let purged = match store.delete_room(&room) {
        Ok(purged) => purged,
        Err(err) => {
            return vec![
                RelayAction::SendToConnection {
                    conn_id,
                    event: ServerEvent::RoomError {
                        message: "An error occurred while deleting the room.".to_string(),
                    },
                },
                RelayAction::Log {
                    level: LogLevel::Error,
                    message: format!("failed to purge room {room}: {err}"),
                },
            ];
        },
    };

    let members = registry.conns_in_room(&room);
    let notice = format!("This room ({room}) was deleted by a user.");

    let mut actions: Vec<RelayAction> = members
        .iter()
        .map(|member| RelayAction::SendToConnection {
            conn_id: *member,
            event: ServerEvent::RoomKicked { message: notice.clone() },
        })
        .collect();

    for member in &members {
        registry.clear_room(*member);
    }

    actions.push(presence::room_count(registry));
    actions.extend(my_rooms(store, conn_id, display_name));
    actions.push(RelayAction::Log {
        level: LogLevel::Info,
        message: format!(
            "room {room} deleted by {display_name}: purged {purged} messages, kicked {} members",
            members.len()
        ),
    });

    actions
}

/// Reply with the distinct rooms `display_name` has posted in.
///
/// Guests always get an empty list without touching the store; store
/// failures degrade to an empty list rather than an error.
pub fn my_rooms<S: MessageStore>(
    store: &S,
    conn_id: u64,
    display_name: &str,
) -> Vec<RelayAction> {
    if is_guest(display_name) {
        return vec![RelayAction::SendToConnection {
            conn_id,
            event: ServerEvent::MyRoomsList { rooms: Vec::new() },
        }];
    }

    match store.rooms_with_sender(display_name) {
        Ok(rooms) => vec![RelayAction::SendToConnection {
            conn_id,
            event: ServerEvent::MyRoomsList { rooms },
        }],
        Err(err) => vec![
            RelayAction::SendToConnection {
                conn_id,
                event: ServerEvent::MyRoomsList { rooms: Vec::new() },
            },
            RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("failed to list rooms for {display_name}: {err}"),
            },
        ],
    }
}
