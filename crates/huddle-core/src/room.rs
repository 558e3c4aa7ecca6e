//! Room identifiers.
//!
//! A room has no backing record anywhere in the system: it is a value-typed
//! code that "exists" while at least one live connection references it (for
//! presence) or while stored messages reference it (for history replay).
//! Every room operation is a lookup filtered by this identifier.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::env::Environment;

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 6;

/// Characters a room code may contain.
const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A 6-character uppercase alphanumeric room identifier.
///
/// Codes are minted from the environment RNG on room creation and accepted
/// verbatim on join (lowercase input is normalized). The 36^6 identifier
/// space makes mint collisions against live rooms rare; creation retries on
/// collision anyway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

/// Why a room code failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomCodeError {
    /// Wrong length.
    #[error("room code must be exactly {ROOM_CODE_LEN} characters")]
    Length,

    /// Character outside `0-9A-Z`.
    #[error("room code may only contain digits and letters")]
    Charset,
}

impl RoomCode {
    /// Parse and normalize a room code.
    ///
    /// Lowercase letters are uppercased; anything outside `[0-9A-Za-z]{6}`
    /// is rejected.
    pub fn parse(input: &str) -> Result<Self, RoomCodeError> {
        if input.len() != ROOM_CODE_LEN {
            return Err(RoomCodeError::Length);
        }

        if !input.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(RoomCodeError::Charset);
        }

        Ok(Self(input.to_ascii_uppercase()))
    }

    /// Mint a fresh random room code from the environment RNG.
    pub fn mint<E: Environment>(env: &E) -> Self {
        let mut bytes = [0u8; ROOM_CODE_LEN];
        env.random_bytes(&mut bytes);

        let code: String =
            bytes.iter().map(|b| char::from(ALPHABET[usize::from(*b) % ALPHABET.len()])).collect();

        Self(code)
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}
