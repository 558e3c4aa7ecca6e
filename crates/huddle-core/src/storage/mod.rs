//! Message store abstraction.
//!
//! Trait-based abstraction over the append-only message log. The trait is
//! synchronous (no async): every store call completes within a single
//! dispatch step, which is what makes room-local sequence assignment atomic
//! without per-room locks.

mod error;
mod memory;

pub use error::StorageError;
pub use memory::MemoryStore;
use serde::{Deserialize, Serialize};

use crate::room::RoomCode;

/// A message accepted by the relay but not yet persisted.
///
/// The relay stamps `timestamp_ms` from the environment clock at persist
/// time; the store assigns `id` and `seq` on append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Room the message belongs to.
    pub room: RoomCode,
    /// Display name of the sender, as supplied by the client.
    pub sender: String,
    /// Message body.
    pub text: String,
    /// Server-assigned wall-clock timestamp (milliseconds since epoch).
    pub timestamp_ms: u64,
}

/// A persisted message as replayed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Store-assigned unique identifier.
    pub id: u64,
    /// Room the message belongs to.
    pub room: RoomCode,
    /// Display name of the sender.
    pub sender: String,
    /// Message body.
    pub text: String,
    /// Room-local sequence number, monotonic per room.
    ///
    /// Replay order is `seq` order; `timestamp_ms` is informational.
    pub seq: u64,
    /// Server-assigned wall-clock timestamp (milliseconds since epoch).
    pub timestamp_ms: u64,
}

/// Storage abstraction for the per-room message log.
///
/// Must be Clone (shared between the driver and HTTP handlers), Send + Sync
/// (thread-safe), and synchronous. Implementations typically share internal
/// state via Arc, so clones access the same underlying storage.
pub trait MessageStore: Clone + Send + Sync + 'static {
    /// Persist a message, assigning its unique id and room-local sequence
    /// number.
    ///
    /// # Invariants
    ///
    /// - Post: `seq` is strictly greater than every `seq` previously
    ///   assigned in the same room, including deleted messages
    fn append(&self, message: NewMessage) -> Result<StoredMessage, StorageError>;

    /// Load the `limit` most recent messages for a room, oldest first.
    ///
    /// Unknown rooms return an empty list, never an error: a room with no
    /// history is indistinguishable from a room that never existed.
    fn recent(&self, room: &RoomCode, limit: usize) -> Result<Vec<StoredMessage>, StorageError>;

    /// Delete a single message by identifier.
    ///
    /// Deleting an unknown id is a no-op.
    fn delete_by_id(&self, id: u64) -> Result<(), StorageError>;

    /// Delete every message in a room. Returns the number purged.
    fn delete_room(&self, room: &RoomCode) -> Result<u64, StorageError>;

    /// Distinct rooms in which `sender` appears as a message sender.
    ///
    /// This is the "owned rooms" derivation: ownership is nothing more than
    /// having posted, there is no explicit ownership record.
    fn rooms_with_sender(&self, sender: &str) -> Result<Vec<RoomCode>, StorageError>;
}
