//! Credential store boundary.
//!
//! Account management is an external collaborator of the coordination core:
//! the core never consults it (identity arrives on join/create events as a
//! display name), but the runtime exposes it over HTTP. The trait lives
//! here so the seam is typed in one place; implementations live with the
//! runtime.

use thiserror::Error;

/// An opaque signed session token handed to a client on login.
///
/// The core treats it as a black box; only the issuing store can verify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap an encoded token.
    pub fn new(encoded: String) -> Self {
        Self(encoded)
    }

    /// The encoded token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SessionToken> for String {
    fn from(token: SessionToken) -> Self {
        token.0
    }
}

/// Errors from credential operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Registration rejected: the username is taken.
    #[error("username already exists")]
    UsernameTaken,

    /// Login rejected: unknown user or wrong password.
    ///
    /// Deliberately does not distinguish the two.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The backing store failed.
    #[error("credential store error: {0}")]
    Store(String),
}

/// Storage and verification of registered accounts.
///
/// Hash-and-compare semantics: `register` persists a salted hash, `login`
/// compares and issues an opaque signed token.
pub trait CredentialStore: Clone + Send + Sync + 'static {
    /// Create an account. Fails with [`AuthError::UsernameTaken`] if the
    /// username is already registered.
    fn register(&self, username: &str, password: &str) -> Result<(), AuthError>;

    /// Verify a password and issue a session token.
    fn login(&self, username: &str, password: &str) -> Result<SessionToken, AuthError>;
}
