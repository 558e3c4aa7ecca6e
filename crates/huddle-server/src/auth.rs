//! Credential store implementation and HTTP auth surface.
//!
//! Accounts live in their own redb database: username → salted password
//! hash (HKDF-SHA256 with a per-user random salt). Login issues an opaque
//! session token: an expiry-stamped payload signed with HMAC-SHA256 under a
//! per-process random key, hex-encoded. Tokens therefore die with the
//! process, like presence does; clients are expected to log in again.

use std::{path::Path, sync::Arc};

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use huddle_core::{AuthError, CredentialStore, Environment, SessionToken};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::AppState;

/// Table: users
/// Key: username bytes
/// Value: CBOR-encoded `UserRecord`
const USERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("users");

/// How long issued session tokens stay valid.
const TOKEN_TTL_SECS: u64 = 3600;

/// Domain-separation info string for password key derivation.
const PASSWORD_INFO: &[u8] = b"huddle password v1";

type HmacSha256 = Hmac<Sha256>;

/// A stored account record.
#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    /// Per-user random salt.
    salt: Vec<u8>,
    /// HKDF-SHA256(salt, password) output.
    hash: Vec<u8>,
}

/// Durable credential store backed by redb.
///
/// Generic over the environment so tests can pin the clock; production uses
/// [`crate::SystemEnv`].
#[derive(Clone)]
pub struct RedbCredentialStore<E: Environment> {
    db: Arc<Database>,
    /// HMAC key for session tokens, minted fresh at open time.
    signing_key: [u8; 32],
    env: E,
}

impl<E: Environment> RedbCredentialStore<E> {
    /// Open or create the account database at the given path.
    pub fn open(path: impl AsRef<Path>, env: E) -> Result<Self, AuthError> {
        let db = Database::create(path.as_ref()).map_err(store_err)?;

        let txn = db.begin_write().map_err(store_err)?;
        {
            let _ = txn.open_table(USERS).map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;

        let mut signing_key = [0u8; 32];
        env.random_bytes(&mut signing_key);

        Ok(Self { db: Arc::new(db), signing_key, env })
    }

    /// Derive the stored hash for a password under a salt.
    fn derive_hash(salt: &[u8], password: &str) -> Result<[u8; 32], AuthError> {
        let hkdf = Hkdf::<Sha256>::new(Some(salt), password.as_bytes());
        let mut okm = [0u8; 32];
        hkdf.expand(PASSWORD_INFO, &mut okm)
            .map_err(|e| AuthError::Store(format!("key derivation failed: {e}")))?;
        Ok(okm)
    }

    /// Sign `payload` with the process token key.
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| AuthError::Store(format!("bad signing key: {e}")))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Issue an opaque signed token for `username`.
    fn issue_token(&self, username: &str) -> Result<SessionToken, AuthError> {
        let expires_at_secs = self.env.now_millis() / 1000 + TOKEN_TTL_SECS;
        let payload = format!("{username}:{expires_at_secs}");
        let tag = self.sign(payload.as_bytes())?;

        Ok(SessionToken::new(format!("{}.{}", hex::encode(payload), hex::encode(tag))))
    }

    /// Verify a token, returning the username it names.
    ///
    /// Fails on malformed encoding, a bad signature, or expiry.
    pub fn verify_token(&self, token: &SessionToken) -> Result<String, AuthError> {
        let (payload_hex, tag_hex) =
            token.as_str().split_once('.').ok_or(AuthError::InvalidCredentials)?;

        let payload = hex::decode(payload_hex).map_err(|_| AuthError::InvalidCredentials)?;
        let tag = hex::decode(tag_hex).map_err(|_| AuthError::InvalidCredentials)?;

        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| AuthError::Store(format!("bad signing key: {e}")))?;
        mac.update(&payload);
        mac.verify_slice(&tag).map_err(|_| AuthError::InvalidCredentials)?;

        let payload = String::from_utf8(payload).map_err(|_| AuthError::InvalidCredentials)?;
        let (username, expiry) =
            payload.rsplit_once(':').ok_or(AuthError::InvalidCredentials)?;
        let expires_at_secs: u64 =
            expiry.parse().map_err(|_| AuthError::InvalidCredentials)?;

        if self.env.now_millis() / 1000 >= expires_at_secs {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(username.to_string())
    }
}

fn store_err(err: impl std::fmt::Display) -> AuthError {
    AuthError::Store(err.to_string())
}

impl<E: Environment> CredentialStore for RedbCredentialStore<E> {
    fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let txn = self.db.begin_write().map_err(store_err)?;

        {
            let mut users = txn.open_table(USERS).map_err(store_err)?;

            if users.get(username.as_bytes()).map_err(store_err)?.is_some() {
                return Err(AuthError::UsernameTaken);
            }

            let mut salt = [0u8; 16];
            self.env.random_bytes(&mut salt);

            let hash = Self::derive_hash(&salt, password)?;
            let record = UserRecord { salt: salt.to_vec(), hash: hash.to_vec() };

            let mut value = Vec::new();
            ciborium::into_writer(&record, &mut value)
                .map_err(|e| AuthError::Store(format!("serialization error: {e}")))?;

            users.insert(username.as_bytes(), value.as_slice()).map_err(store_err)?;
        }

        txn.commit().map_err(store_err)?;

        Ok(())
    }

    fn login(&self, username: &str, password: &str) -> Result<SessionToken, AuthError> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let users = txn.open_table(USERS).map_err(store_err)?;

        let Some(value) = users.get(username.as_bytes()).map_err(store_err)? else {
            // Unknown user and wrong password are deliberately the same error
            return Err(AuthError::InvalidCredentials);
        };

        let record: UserRecord = ciborium::from_reader(value.value())
            .map_err(|e| AuthError::Store(format!("serialization error: {e}")))?;

        let candidate = Self::derive_hash(&record.salt, password)?;

        // Constant-time comparison via HMAC verification.
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| AuthError::Store(format!("bad signing key: {e}")))?;
        mac.update(&record.hash);
        let expected = mac.finalize().into_bytes();

        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| AuthError::Store(format!("bad signing key: {e}")))?;
        mac.update(&candidate);
        mac.verify_slice(&expected).map_err(|_| AuthError::InvalidCredentials)?;

        self.issue_token(username)
    }
}

/// Request body for both auth endpoints.
#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    /// Account name.
    pub username: String,
    /// Plain-text password (TLS is the transport's problem).
    pub password: String,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct LoginBody {
    token: String,
    user: UserBody,
}

#[derive(Debug, Serialize)]
struct UserBody {
    username: String,
}

fn message_response(status: StatusCode, message: &str) -> Response {
    (status, Json(MessageBody { message: message.to_string() })).into_response()
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Response {
    match state.credentials.register(&request.username, &request.password) {
        Ok(()) => message_response(StatusCode::CREATED, "User registered successfully"),
        Err(AuthError::UsernameTaken) => {
            message_response(StatusCode::BAD_REQUEST, "Username already exists.")
        },
        Err(err) => {
            tracing::error!("registration failed for {}: {err}", request.username);
            message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error during registration.",
            )
        },
    }
}

/// `POST /api/auth/login`
pub async fn login(State(state): State<AppState>, Json(request): Json<AuthRequest>) -> Response {
    match state.credentials.login(&request.username, &request.password) {
        Ok(token) => Json(LoginBody {
            token: token.into(),
            user: UserBody { username: request.username },
        })
        .into_response(),
        Err(AuthError::InvalidCredentials) => {
            message_response(StatusCode::BAD_REQUEST, "Invalid credentials")
        },
        Err(err) => {
            tracing::error!("login failed for {}: {err}", request.username);
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error during login.")
        },
    }
}
