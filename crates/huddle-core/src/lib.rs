//! Huddle coordination core.
//!
//! Sans-IO session/room coordination for a real-time chat relay: the
//! in-memory mapping between live connections and rooms, room lifecycle
//! (create/join/delete/kick), presence and typing fan-out, and message
//! relay ordering.
//!
//! # Architecture
//!
//! The [`RelayDriver`] is the single integration point. The runtime feeds
//! it [`RelayEvent`]s (connect, decoded client event, disconnect) and
//! executes the ordered [`RelayAction`] list it returns. Nothing in this
//! crate performs I/O: time and randomness come through [`Environment`],
//! persistence through [`MessageStore`], and the network through whatever
//! executes the actions. That is what makes every fan-out rule testable by
//! feeding events and asserting on actions.
//!
//! # Components
//!
//! - [`ConnectionRegistry`]: connection → (display name, room), the single
//!   source of truth for who is online. Room liveness is derived from it
//!   by scanning, never stored.
//! - [`room_manager`]: room lifecycle (create/join/delete/owned listing)
//! - [`presence`]: presence snapshots, room counts, typing fan-out
//! - [`relay`]: message persist-and-broadcast
//! - [`RelayDriver`]: thin routing over the above

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
mod driver;
mod env;
mod event;
pub mod presence;
mod registry;
pub mod relay;
mod room;
pub mod room_manager;
pub mod storage;

pub use auth::{AuthError, CredentialStore, SessionToken};
pub use driver::{LogLevel, RelayAction, RelayDriver, RelayEvent};
pub use env::Environment;
pub use event::{ClientEvent, ServerEvent};
pub use registry::{ConnectionEntry, ConnectionRegistry};
pub use room::{ROOM_CODE_LEN, RoomCode, RoomCodeError};
pub use storage::{MemoryStore, MessageStore, NewMessage, StorageError, StoredMessage};
