//! Redb-backed durable message store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. The
//! message log survives server restarts; only presence is lost.

use std::{path::Path, sync::Arc};

use huddle_core::{MessageStore, NewMessage, RoomCode, StorageError, StoredMessage};
use redb::{Database, ReadableTable, TableDefinition};

/// Table: messages
/// Key: (room code: 6 ASCII bytes, seq: u64 big-endian) [14 bytes]
/// Value: CBOR-encoded `StoredMessage`
const MESSAGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("messages");

/// Table: message id index
/// Key: message id as big-endian bytes [8 bytes]
/// Value: the message's key in MESSAGES
const MESSAGE_IDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("message_ids");

/// Table: per-room sequence counters
/// Key: room code [6 bytes]
/// Value: next seq as big-endian bytes [8 bytes]
///
/// Kept separately from MESSAGES so seq stays monotonic across individual
/// deletions; the counter is dropped when the whole room is purged.
const SEQUENCES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sequences");

/// Table: store-wide metadata (the message id counter)
const META: TableDefinition<&[u8], &[u8]> = TableDefinition::new("meta");

const NEXT_ID_KEY: &[u8] = b"next_message_id";

/// Durable message store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or
    /// created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            let _ = txn.open_table(MESSAGES).map_err(io_err)?;
            let _ = txn.open_table(MESSAGE_IDS).map_err(io_err)?;
            let _ = txn.open_table(SEQUENCES).map_err(io_err)?;
            let _ = txn.open_table(META).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(Self { db: Arc::new(db) })
    }
}

fn io_err(err: impl std::fmt::Display) -> StorageError {
    StorageError::Io(err.to_string())
}

fn ser_err(err: impl std::fmt::Display) -> StorageError {
    StorageError::Serialization(err.to_string())
}

/// Encode a MESSAGES key: room code bytes followed by big-endian seq.
fn encode_message_key(room: &RoomCode, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(room.as_str().len() + 8);
    key.extend_from_slice(room.as_str().as_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn decode_u64(bytes: &[u8]) -> Result<u64, StorageError> {
    let arr: [u8; 8] =
        bytes.try_into().map_err(|_| ser_err("counter value is not 8 bytes"))?;
    Ok(u64::from_be_bytes(arr))
}

impl MessageStore for RedbStore {
    fn append(&self, message: NewMessage) -> Result<StoredMessage, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let stored = {
            let mut messages = txn.open_table(MESSAGES).map_err(io_err)?;
            let mut ids = txn.open_table(MESSAGE_IDS).map_err(io_err)?;
            let mut seqs = txn.open_table(SEQUENCES).map_err(io_err)?;
            let mut meta = txn.open_table(META).map_err(io_err)?;

            let id = match meta.get(NEXT_ID_KEY).map_err(io_err)? {
                Some(value) => decode_u64(value.value())?,
                None => 0,
            };
            meta.insert(NEXT_ID_KEY, (id + 1).to_be_bytes().as_slice()).map_err(io_err)?;

            let room_key = message.room.as_str().as_bytes().to_vec();
            let seq = match seqs.get(room_key.as_slice()).map_err(io_err)? {
                Some(value) => decode_u64(value.value())?,
                None => 0,
            };
            seqs.insert(room_key.as_slice(), (seq + 1).to_be_bytes().as_slice())
                .map_err(io_err)?;

            let stored = StoredMessage {
                id,
                room: message.room,
                sender: message.sender,
                text: message.text,
                seq,
                timestamp_ms: message.timestamp_ms,
            };

            let mut value = Vec::new();
            ciborium::into_writer(&stored, &mut value).map_err(ser_err)?;

            let key = encode_message_key(&stored.room, seq);
            messages.insert(key.as_slice(), value.as_slice()).map_err(io_err)?;
            ids.insert(id.to_be_bytes().as_slice(), key.as_slice()).map_err(io_err)?;

            stored
        };

        txn.commit().map_err(io_err)?;

        Ok(stored)
    }

    fn recent(&self, room: &RoomCode, limit: usize) -> Result<Vec<StoredMessage>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(MESSAGES).map_err(io_err)?;

        let start = encode_message_key(room, 0);
        let end = encode_message_key(room, u64::MAX);

        let range = table.range(start.as_slice()..=end.as_slice()).map_err(io_err)?;

        // Walk the room's log backwards to find the tail, then flip it back
        // to oldest-first.
        let mut messages = Vec::with_capacity(limit);
        for result in range.rev() {
            if messages.len() >= limit {
                break;
            }

            let (_, value) = result.map_err(io_err)?;
            let message: StoredMessage =
                ciborium::from_reader(value.value()).map_err(ser_err)?;
            messages.push(message);
        }

        messages.reverse();
        Ok(messages)
    }

    fn delete_by_id(&self, id: u64) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        {
            let mut messages = txn.open_table(MESSAGES).map_err(io_err)?;
            let mut ids = txn.open_table(MESSAGE_IDS).map_err(io_err)?;

            let key = ids
                .remove(id.to_be_bytes().as_slice())
                .map_err(io_err)?
                .map(|guard| guard.value().to_vec());

            if let Some(key) = key {
                messages.remove(key.as_slice()).map_err(io_err)?;
            }
        }

        txn.commit().map_err(io_err)?;

        Ok(())
    }

    fn delete_room(&self, room: &RoomCode) -> Result<u64, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let purged = {
            let mut messages = txn.open_table(MESSAGES).map_err(io_err)?;
            let mut ids = txn.open_table(MESSAGE_IDS).map_err(io_err)?;
            let mut seqs = txn.open_table(SEQUENCES).map_err(io_err)?;

            let start = encode_message_key(room, 0);
            let end = encode_message_key(room, u64::MAX);

            let doomed: Vec<(Vec<u8>, u64)> = {
                let range =
                    messages.range(start.as_slice()..=end.as_slice()).map_err(io_err)?;

                let mut doomed = Vec::new();
                for result in range {
                    let (key, value) = result.map_err(io_err)?;
                    let message: StoredMessage =
                        ciborium::from_reader(value.value()).map_err(ser_err)?;
                    doomed.push((key.value().to_vec(), message.id));
                }
                doomed
            };

            for (key, id) in &doomed {
                messages.remove(key.as_slice()).map_err(io_err)?;
                ids.remove(id.to_be_bytes().as_slice()).map_err(io_err)?;
            }

            seqs.remove(room.as_str().as_bytes()).map_err(io_err)?;

            doomed.len() as u64
        };

        txn.commit().map_err(io_err)?;

        Ok(purged)
    }

    fn rooms_with_sender(&self, sender: &str) -> Result<Vec<RoomCode>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(MESSAGES).map_err(io_err)?;

        let mut rooms = std::collections::BTreeSet::new();

        for result in table.iter().map_err(io_err)? {
            let (_, value) = result.map_err(io_err)?;
            let message: StoredMessage =
                ciborium::from_reader(value.value()).map_err(ser_err)?;
            if message.sender == sender {
                rooms.insert(message.room);
            }
        }

        Ok(rooms.into_iter().collect())
    }
}
