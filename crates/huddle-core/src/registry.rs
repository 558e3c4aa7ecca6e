//! Connection registry: the single source of truth for who is online.
//!
//! Maps each live connection to its display name and current room (at most
//! one). The registry doubles as the room directory: the set of live rooms
//! and the occupants of a room are derived by scanning entries on demand,
//! never stored, so presence can't drift from membership.
//!
//! No persistence; state is lost on process restart. Rooms and messages
//! survive in the message store, only presence is lost, and clients re-join
//! on reconnect.

use std::collections::{BTreeSet, HashMap};

use crate::room::RoomCode;

/// State tracked for one live connection.
///
/// A fresh connection has neither a name nor a room; the first create/join
/// action sets both. A kicked connection keeps its name but loses its room
/// (back to the lobby).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionEntry {
    /// Display name, set once a join/create action names the connection.
    /// Not unique: the same name from several connections is legal.
    pub display_name: Option<String>,
    /// Current room. `None` means the connection sits in the lobby.
    pub room: Option<RoomCode>,
}

/// Registry of live connections, owned by the dispatcher.
///
/// Mutated only on the connect/disconnect/join/create path, which the
/// dispatcher serializes, so the registry behaves as a sequential monitor
/// without internal locking.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conns: HashMap<u64, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh connection with no identity and no room.
    ///
    /// Returns `false` if the connection id is already registered.
    pub fn register(&mut self, conn_id: u64) -> bool {
        if self.conns.contains_key(&conn_id) {
            return false;
        }
        self.conns.insert(conn_id, ConnectionEntry::default());
        true
    }

    /// Set a connection's display name and room in one step.
    ///
    /// Inserts the entry if the connection was unknown (hence "upsert"):
    /// the transport always registers connections first, but the registry
    /// does not depend on it.
    pub fn upsert(&mut self, conn_id: u64, display_name: &str, room: RoomCode) {
        let entry = self.conns.entry(conn_id).or_default();
        entry.display_name = Some(display_name.to_string());
        entry.room = Some(room);
    }

    /// Remove a connection entirely. Returns the previous entry if any.
    pub fn remove(&mut self, conn_id: u64) -> Option<ConnectionEntry> {
        self.conns.remove(&conn_id)
    }

    /// Look up a connection's entry.
    pub fn get(&self, conn_id: u64) -> Option<&ConnectionEntry> {
        self.conns.get(&conn_id)
    }

    /// Whether the connection is registered.
    pub fn contains(&self, conn_id: u64) -> bool {
        self.conns.contains_key(&conn_id)
    }

    /// Evict a connection back to the lobby, keeping its identity.
    ///
    /// Returns the room it was in, if any.
    pub fn clear_room(&mut self, conn_id: u64) -> Option<RoomCode> {
        self.conns.get_mut(&conn_id).and_then(|entry| entry.room.take())
    }

    /// Deduplicated display names of connections currently in `room`.
    ///
    /// The same name on several connections counts once. Unnamed
    /// connections cannot be in a room, so every member has a name.
    pub fn users_in_room(&self, room: &RoomCode) -> BTreeSet<String> {
        self.conns
            .values()
            .filter(|entry| entry.room.as_ref() == Some(room))
            .filter_map(|entry| entry.display_name.clone())
            .collect()
    }

    /// Connection ids currently in `room`, in stable (sorted) order.
    pub fn conns_in_room(&self, room: &RoomCode) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .conns
            .iter()
            .filter(|(_, entry)| entry.room.as_ref() == Some(room))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Distinct room codes with at least one live connection.
    pub fn active_rooms(&self) -> BTreeSet<RoomCode> {
        self.conns.values().filter_map(|entry| entry.room.clone()).collect()
    }

    /// Number of distinct rooms with at least one live connection.
    pub fn active_room_count(&self) -> usize {
        self.active_rooms().len()
    }

    /// Whether `room` has at least one live connection.
    pub fn is_room_live(&self, room: &RoomCode) -> bool {
        self.conns.values().any(|entry| entry.room.as_ref() == Some(room))
    }

    /// Total number of registered connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(code: &str) -> RoomCode {
        RoomCode::parse(code).unwrap()
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register(1));
        assert!(registry.contains(1));
        assert!(!registry.contains(2));

        let entry = registry.get(1).unwrap();
        assert!(entry.display_name.is_none());
        assert!(entry.room.is_none());
    }

    #[test]
    fn register_duplicate_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register(1));
        assert!(!registry.register(1));
    }

    #[test]
    fn upsert_sets_name_and_room() {
        let mut registry = ConnectionRegistry::new();
        registry.register(1);

        registry.upsert(1, "alice", room("AAAAAA"));

        let entry = registry.get(1).unwrap();
        assert_eq!(entry.display_name.as_deref(), Some("alice"));
        assert_eq!(entry.room, Some(room("AAAAAA")));

        // Moving rooms overwrites in place
        registry.upsert(1, "alice", room("BBBBBB"));
        assert_eq!(registry.get(1).unwrap().room, Some(room("BBBBBB")));
        assert!(!registry.is_room_live(&room("AAAAAA")));
    }

    #[test]
    fn remove_returns_previous_entry() {
        let mut registry = ConnectionRegistry::new();
        registry.register(1);
        registry.upsert(1, "alice", room("AAAAAA"));

        let entry = registry.remove(1).unwrap();
        assert_eq!(entry.display_name.as_deref(), Some("alice"));
        assert_eq!(entry.room, Some(room("AAAAAA")));

        assert!(!registry.contains(1));
        assert!(registry.remove(1).is_none());
    }

    #[test]
    fn users_in_room_deduplicates_names() {
        let mut registry = ConnectionRegistry::new();
        registry.upsert(1, "alice", room("AAAAAA"));
        registry.upsert(2, "alice", room("AAAAAA"));
        registry.upsert(3, "bob", room("AAAAAA"));
        registry.upsert(4, "carol", room("BBBBBB"));

        let users = registry.users_in_room(&room("AAAAAA"));
        assert_eq!(users.len(), 2);
        assert!(users.contains("alice"));
        assert!(users.contains("bob"));
    }

    #[test]
    fn conns_in_room_is_sorted() {
        let mut registry = ConnectionRegistry::new();
        registry.upsert(9, "a", room("AAAAAA"));
        registry.upsert(3, "b", room("AAAAAA"));
        registry.upsert(7, "c", room("BBBBBB"));

        assert_eq!(registry.conns_in_room(&room("AAAAAA")), vec![3, 9]);
    }

    #[test]
    fn active_rooms_are_derived_from_entries() {
        let mut registry = ConnectionRegistry::new();
        assert_eq!(registry.active_room_count(), 0);

        registry.upsert(1, "alice", room("AAAAAA"));
        registry.upsert(2, "bob", room("AAAAAA"));
        registry.upsert(3, "carol", room("BBBBBB"));
        assert_eq!(registry.active_room_count(), 2);

        registry.remove(3);
        assert_eq!(registry.active_room_count(), 1);
        assert!(!registry.is_room_live(&room("BBBBBB")));
    }

    #[test]
    fn clear_room_evicts_to_lobby_keeping_identity() {
        let mut registry = ConnectionRegistry::new();
        registry.upsert(1, "alice", room("AAAAAA"));

        assert_eq!(registry.clear_room(1), Some(room("AAAAAA")));

        let entry = registry.get(1).unwrap();
        assert_eq!(entry.display_name.as_deref(), Some("alice"));
        assert!(entry.room.is_none());

        // Second eviction is a no-op
        assert_eq!(registry.clear_room(1), None);
        assert_eq!(registry.clear_room(42), None);
    }
}
