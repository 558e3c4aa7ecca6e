//! Wire contract.
//!
//! JSON events exchanged with clients over the persistent connection. Tag
//! names match the transport event names one-for-one, so a serialized
//! [`ClientEvent`]/[`ServerEvent`] is exactly one wire frame.
//!
//! Room identifiers arrive as raw strings and are validated by the room
//! lifecycle manager, not at decode time: a malformed code must produce a
//! `room-error` reply, not a dropped frame.

use serde::{Deserialize, Serialize};

use crate::{room::RoomCode, storage::StoredMessage};

/// Client-to-server events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Mint a new room and join it as sole member.
    CreateRoom {
        /// Display name to register for this connection.
        display_name: String,
    },

    /// Join a room by code, replaying recent history.
    JoinRoom {
        /// Display name to register for this connection.
        display_name: String,
        /// Room code, unvalidated.
        room: String,
    },

    /// Request the list of rooms this name has posted in.
    GetMyRooms {
        /// Display name to look up.
        display_name: String,
    },

    /// Destroy a room: purge its history and kick its members.
    DeleteRoom {
        /// Room code, unvalidated.
        room: String,
        /// Display name of the requester (guests are rejected).
        display_name: String,
    },

    /// Send a chat message to the current room.
    SendMessage {
        /// Display name to record as sender.
        sender: String,
        /// Message body.
        text: String,
    },

    /// Delete a message by store identifier.
    DeleteMessage {
        /// Identifier of the message to delete.
        id: u64,
    },

    /// The connection started typing.
    Typing {
        /// Display name to show on peers' typing indicators.
        display_name: String,
    },

    /// The connection stopped typing.
    StopTyping,
}

/// Server-to-client events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Reply to create/join: the room entered and its replayed history.
    RoomJoined {
        /// Room the connection is now in.
        room: RoomCode,
        /// Replayed history, oldest first. Empty for fresh rooms.
        messages: Vec<StoredMessage>,
    },

    /// Visible error reply to an invalid request.
    RoomError {
        /// Human-readable description.
        message: String,
    },

    /// A new message in the connection's room (senders receive their own).
    ReceiveMessage {
        /// The persisted message.
        message: StoredMessage,
    },

    /// A message was removed from the room.
    MessageDeleted {
        /// Identifier of the removed message.
        id: u64,
    },

    /// Presence snapshot: deduplicated display names in the room.
    ActiveUsers {
        /// Current occupants.
        users: Vec<String>,
    },

    /// A peer in the room started typing.
    Typing {
        /// Display name of the typist.
        display_name: String,
    },

    /// A peer in the room stopped typing.
    StopTyping,

    /// Global count of rooms with at least one live connection.
    RoomCountUpdate {
        /// Number of live rooms.
        count: usize,
    },

    /// Reply to `get-my-rooms`.
    MyRoomsList {
        /// Distinct rooms the requester has posted in.
        rooms: Vec<RoomCode>,
    },

    /// The connection's room was deleted; client must return to the lobby.
    RoomKicked {
        /// Human-readable eviction notice.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_transport_tag_names() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"create-room","display_name":"alice"}"#).unwrap();
        assert_eq!(event, ClientEvent::CreateRoom { display_name: "alice".to_string() });

        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"join-room","display_name":"bob","room":"AB12CD"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom { display_name: "bob".to_string(), room: "AB12CD".to_string() }
        );

        let event: ClientEvent = serde_json::from_str(r#"{"type":"stop-typing"}"#).unwrap();
        assert_eq!(event, ClientEvent::StopTyping);
    }

    #[test]
    fn malformed_room_codes_still_decode() {
        // Validation happens in the lifecycle manager, not the codec
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"join-room","display_name":"bob","room":"definitely not a code"}"#,
        )
        .unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { room, .. } if room.len() > 6));
    }

    #[test]
    fn server_events_serialize_with_tag() {
        let json = serde_json::to_string(&ServerEvent::RoomCountUpdate { count: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"room-count-update","count":3}"#);

        let json = serde_json::to_string(&ServerEvent::ActiveUsers {
            users: vec!["alice".to_string(), "bob".to_string()],
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"active-users","users":["alice","bob"]}"#);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"shut-down"}"#).is_err());
    }
}
