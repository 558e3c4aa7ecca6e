//! Relay driver.
//!
//! Ties together the connection registry, room lifecycle, presence
//! coordination, and message relay. The driver is Sans-IO: it consumes
//! [`RelayEvent`]s produced by the runtime and returns an ordered list of
//! [`RelayAction`]s for the runtime to execute. Feeding events in and
//! asserting on the returned actions tests the whole fan-out logic without
//! a network.
//!
//! The runtime must serialize calls to [`RelayDriver::process_event`]: all
//! registry reads and mutations for one event run to completion before the
//! next event, which is the only concurrency control the registry needs.

use crate::{
    env::Environment,
    event::{ClientEvent, ServerEvent},
    presence,
    registry::ConnectionRegistry,
    relay,
    room::RoomCode,
    room_manager,
    storage::MessageStore,
};

/// Events that the relay driver processes.
///
/// These are produced by the external runtime (tests or production
/// transport).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new connection was accepted by the transport.
    ConnectionOpened {
        /// Unique connection id assigned by the runtime.
        conn_id: u64,
    },

    /// A decoded client event arrived on a connection.
    ClientEvent {
        /// Connection that sent the event.
        conn_id: u64,
        /// The decoded event.
        event: ClientEvent,
    },

    /// A connection was closed (by peer or error).
    ConnectionClosed {
        /// Connection that was closed.
        conn_id: u64,
        /// Reason for closure.
        reason: String,
    },
}

/// Actions that the relay driver produces.
///
/// These are executed by runtime-specific code. Event payloads (presence
/// snapshots, room counts) are captured at action-creation time, inside the
/// dispatch step; only broadcast recipient lists are resolved at execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Send an event to a specific connection.
    SendToConnection {
        /// Target connection id.
        conn_id: u64,
        /// Event to send.
        event: ServerEvent,
    },

    /// Broadcast an event to every connection currently in a room.
    BroadcastToRoom {
        /// Target room.
        room: RoomCode,
        /// Event to broadcast.
        event: ServerEvent,
        /// Optional connection to exclude (typing never echoes).
        exclude: Option<u64>,
    },

    /// Broadcast an event to every live connection.
    BroadcastToAll {
        /// Event to broadcast.
        event: ServerEvent,
    },

    /// Log a message (for debugging/monitoring).
    Log {
        /// Log level.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels for relay actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// Action-based relay driver.
///
/// Owns the connection registry and the handles to the environment and the
/// message store; orchestrates lifecycle, presence, and relay per event.
pub struct RelayDriver<E, S>
where
    E: Environment,
    S: MessageStore,
{
    /// Connection/room registry, exclusively owned.
    registry: ConnectionRegistry,
    /// Message store backend.
    store: S,
    /// Environment (clock, RNG).
    env: E,
}

impl<E, S> RelayDriver<E, S>
where
    E: Environment,
    S: MessageStore,
{
    /// Create a new relay driver.
    pub fn new(env: E, store: S) -> Self {
        Self { registry: ConnectionRegistry::new(), store, env }
    }

    /// Process a relay event and return the actions to execute.
    ///
    /// This is the single entry point. Per-event failures never escape as
    /// errors: they become `Log` actions or visible `room-error` replies,
    /// so one misbehaving connection cannot take the dispatcher down.
    pub fn process_event(&mut self, event: RelayEvent) -> Vec<RelayAction> {
        tracing::trace!(?event, "processing relay event");

        match event {
            RelayEvent::ConnectionOpened { conn_id } => self.handle_connection_opened(conn_id),
            RelayEvent::ClientEvent { conn_id, event } => self.handle_client_event(conn_id, event),
            RelayEvent::ConnectionClosed { conn_id, reason } => {
                self.handle_connection_closed(conn_id, &reason)
            },
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_opened(&mut self, conn_id: u64) -> Vec<RelayAction> {
        if !self.registry.register(conn_id) {
            return vec![RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("connection {conn_id} opened twice, ignoring"),
            }];
        }

        vec![
            // The newcomer gets the current room count straight away.
            RelayAction::SendToConnection {
                conn_id,
                event: ServerEvent::RoomCountUpdate { count: self.registry.active_room_count() },
            },
            RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("connection {conn_id} accepted"),
            },
        ]
    }

    /// Route a decoded client event to the owning component.
    fn handle_client_event(&mut self, conn_id: u64, event: ClientEvent) -> Vec<RelayAction> {
        if !self.registry.contains(conn_id) {
            return vec![RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("event from unknown connection {conn_id}, ignoring"),
            }];
        }

        match event {
            ClientEvent::CreateRoom { display_name } => {
                room_manager::create_room(&mut self.registry, &self.env, conn_id, &display_name)
            },
            ClientEvent::JoinRoom { display_name, room } => {
                room_manager::join_room(&mut self.registry, &self.store, conn_id, &display_name, &room)
            },
            ClientEvent::GetMyRooms { display_name } => {
                room_manager::my_rooms(&self.store, conn_id, &display_name)
            },
            ClientEvent::DeleteRoom { room, display_name } => room_manager::delete_room(
                &mut self.registry,
                &self.store,
                conn_id,
                &display_name,
                &room,
            ),
            ClientEvent::SendMessage { sender, text } => relay::send_message(
                &self.registry,
                &self.store,
                &self.env,
                conn_id,
                &sender,
                &text,
            ),
            ClientEvent::DeleteMessage { id } => {
                relay::delete_message(&self.registry, &self.store, conn_id, id)
            },
            ClientEvent::Typing { display_name } => {
                presence::typing(&self.registry, conn_id, &display_name).into_iter().collect()
            },
            ClientEvent::StopTyping => {
                presence::stop_typing(&self.registry, conn_id).into_iter().collect()
            },
        }
    }

    /// Handle a connection being closed.
    ///
    /// Disconnect is a lifecycle transition, not an error: the entry is
    /// removed, the former room's presence is recomputed, and the global
    /// count refreshes when the room emptied. A reconnecting client gets a
    /// brand-new connection and must explicitly re-join.
    fn handle_connection_closed(&mut self, conn_id: u64, reason: &str) -> Vec<RelayAction> {
        let Some(entry) = self.registry.remove(conn_id) else {
            return vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("close for unknown connection {conn_id}"),
            }];
        };

        let mut actions = Vec::new();

        if let Some(room) = entry.room {
            actions.push(presence::active_users(&self.registry, &room));
            if !self.registry.is_room_live(&room) {
                actions.push(presence::room_count(&self.registry));
            }
        }

        actions.push(RelayAction::Log {
            level: LogLevel::Info,
            message: format!(
                "connection {conn_id} ({}) closed: {reason}",
                entry.display_name.as_deref().unwrap_or("unnamed")
            ),
        });

        actions
    }

    /// The connection registry (read-only).
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Connection ids currently in a room, for broadcast fan-out.
    pub fn conns_in_room(&self, room: &RoomCode) -> Vec<u64> {
        self.registry.conns_in_room(room)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// The message store backend.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<E, S> std::fmt::Debug for RelayDriver<E, S>
where
    E: Environment,
    S: MessageStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayDriver")
            .field("connection_count", &self.registry.len())
            .field("active_room_count", &self.registry.active_room_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        fn now_millis(&self) -> u64 {
            1_700_000_000_000
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            use rand::RngCore;
            rand::thread_rng().fill_bytes(buffer);
        }
    }

    fn test_driver() -> RelayDriver<TestEnv, MemoryStore> {
        RelayDriver::new(TestEnv, MemoryStore::new())
    }

    fn open(driver: &mut RelayDriver<TestEnv, MemoryStore>, conn_id: u64) {
        driver.process_event(RelayEvent::ConnectionOpened { conn_id });
    }

    #[test]
    fn new_connection_gets_room_count() {
        let mut driver = test_driver();

        let actions = driver.process_event(RelayEvent::ConnectionOpened { conn_id: 1 });

        assert_eq!(driver.connection_count(), 1);
        assert!(matches!(
            actions[0],
            RelayAction::SendToConnection {
                conn_id: 1,
                event: ServerEvent::RoomCountUpdate { count: 0 }
            }
        ));
    }

    #[test]
    fn duplicate_open_is_logged_and_ignored() {
        let mut driver = test_driver();
        open(&mut driver, 1);

        let actions = driver.process_event(RelayEvent::ConnectionOpened { conn_id: 1 });

        assert_eq!(driver.connection_count(), 1);
        assert!(matches!(actions[0], RelayAction::Log { level: LogLevel::Warn, .. }));
    }

    #[test]
    fn event_from_unknown_connection_is_ignored() {
        let mut driver = test_driver();

        let actions = driver.process_event(RelayEvent::ClientEvent {
            conn_id: 42,
            event: ClientEvent::CreateRoom { display_name: "alice".to_string() },
        });

        assert!(matches!(actions[0], RelayAction::Log { level: LogLevel::Warn, .. }));
        assert_eq!(driver.registry().active_room_count(), 0);
    }

    #[test]
    fn create_room_registers_membership() {
        let mut driver = test_driver();
        open(&mut driver, 1);

        let actions = driver.process_event(RelayEvent::ClientEvent {
            conn_id: 1,
            event: ClientEvent::CreateRoom { display_name: "alice".to_string() },
        });

        let RelayAction::SendToConnection {
            event: ServerEvent::RoomJoined { room, messages }, ..
        } = &actions[0]
        else {
            panic!("expected RoomJoined reply, got {actions:?}");
        };

        assert!(messages.is_empty());
        assert_eq!(driver.conns_in_room(room), vec![1]);
        assert_eq!(driver.registry().active_room_count(), 1);
    }

    #[test]
    fn close_for_unknown_connection_is_harmless() {
        let mut driver = test_driver();

        let actions = driver.process_event(RelayEvent::ConnectionClosed {
            conn_id: 7,
            reason: "gone".to_string(),
        });

        assert!(matches!(actions[0], RelayAction::Log { level: LogLevel::Debug, .. }));
    }

    #[test]
    fn disconnect_updates_presence_and_count() {
        let mut driver = test_driver();
        open(&mut driver, 1);
        open(&mut driver, 2);

        driver.process_event(RelayEvent::ClientEvent {
            conn_id: 1,
            event: ClientEvent::CreateRoom { display_name: "alice".to_string() },
        });

        let actions = driver.process_event(RelayEvent::ConnectionClosed {
            conn_id: 1,
            reason: "client disconnect".to_string(),
        });

        // Room emptied: presence snapshot for the room, then a global count
        // broadcast reporting zero live rooms.
        assert!(matches!(
            actions[0],
            RelayAction::BroadcastToRoom { event: ServerEvent::ActiveUsers { ref users }, .. }
                if users.is_empty()
        ));
        assert!(matches!(
            actions[1],
            RelayAction::BroadcastToAll { event: ServerEvent::RoomCountUpdate { count: 0 } }
        ));
        assert_eq!(driver.connection_count(), 1);
    }
}
