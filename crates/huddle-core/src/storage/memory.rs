use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{MessageStore, NewMessage, StorageError, StoredMessage};
use crate::room::RoomCode;

/// In-memory message store for testing and single-process deployments.
///
/// Messages live in per-room vectors kept in `seq` order. All state is
/// wrapped in Arc<Mutex<>> to allow Clone and concurrent access.
/// Thread-safe through Mutex, but uses `lock().expect()` which will panic if
/// the mutex is poisoned - acceptable for test code.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Next message id to assign, global across rooms.
    next_id: u64,

    /// Next sequence number per room. Survives individual deletions so seq
    /// stays monotonic; reset when the whole room is purged.
    next_seqs: HashMap<RoomCode, u64>,

    /// Messages per room, in `seq` order.
    rooms: HashMap<RoomCode, Vec<StoredMessage>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored messages across all rooms.
    ///
    /// Useful for debugging and testing.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). This is acceptable for test code.
    #[allow(clippy::expect_used)]
    pub fn message_count(&self) -> usize {
        let inner = self.inner.lock().expect("Mutex poisoned");
        inner.rooms.values().map(Vec::len).sum()
    }

    /// Number of rooms with at least one stored message.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    pub fn room_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").rooms.len()
    }
}

impl MessageStore for MemoryStore {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    fn append(&self, message: NewMessage) -> Result<StoredMessage, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let id = inner.next_id;
        inner.next_id += 1;

        let seq_slot = inner.next_seqs.entry(message.room.clone()).or_insert(0);
        let seq = *seq_slot;
        *seq_slot += 1;

        let stored = StoredMessage {
            id,
            room: message.room.clone(),
            sender: message.sender,
            text: message.text,
            seq,
            timestamp_ms: message.timestamp_ms,
        };

        inner.rooms.entry(message.room).or_default().push(stored.clone());

        Ok(stored)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    fn recent(&self, room: &RoomCode, limit: usize) -> Result<Vec<StoredMessage>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        let Some(messages) = inner.rooms.get(room) else {
            return Ok(Vec::new());
        };

        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    fn delete_by_id(&self, id: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let mut emptied = None;
        for (room, messages) in &mut inner.rooms {
            if let Some(pos) = messages.iter().position(|m| m.id == id) {
                messages.remove(pos);
                if messages.is_empty() {
                    emptied = Some(room.clone());
                }
                break;
            }
        }

        if let Some(room) = emptied {
            inner.rooms.remove(&room);
        }

        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    fn delete_room(&self, room: &RoomCode) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let purged = inner.rooms.remove(room).map_or(0, |messages| messages.len() as u64);
        inner.next_seqs.remove(room);

        Ok(purged)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    fn rooms_with_sender(&self, sender: &str) -> Result<Vec<RoomCode>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        let mut rooms: Vec<RoomCode> = inner
            .rooms
            .iter()
            .filter(|(_, messages)| messages.iter().any(|m| m.sender == sender))
            .map(|(room, _)| room.clone())
            .collect();
        rooms.sort();

        Ok(rooms)
    }
}
