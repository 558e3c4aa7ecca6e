//! Huddle chat relay server.
//!
//! Production runtime for [`huddle_core`]: the Sans-IO [`RelayDriver`]
//! produces action lists, and this crate executes them against real I/O -
//! axum WebSockets for the event contract, redb for the message log and
//! account store, the system clock and OS RNG for the environment.
//!
//! # Architecture
//!
//! - [`Server`]: binds the listener, wires the router, runs the runtime
//! - [`ws`](crate::ws): actor-per-connection WebSocket transport
//! - [`RedbStore`]: durable message log
//! - [`RedbCredentialStore`]: accounts and session tokens, plus the HTTP
//!   auth endpoints
//! - [`SystemEnv`]: real time and cryptographic randomness
//!
//! The driver sits behind one async mutex: an event is processed and its
//! actions executed under the same guard, so broadcast membership is
//! resolved against exactly the registry state that produced the actions.
//! Action execution only pushes into per-connection channels and never
//! blocks on a slow client.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod error;
mod storage;
mod system_env;
mod ws;

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, atomic::{AtomicU64, Ordering}},
};

use axum::{
    Router,
    extract::ws::Message,
    routing::{get, post},
};
pub use error::ServerError;
use huddle_core::{LogLevel, RelayAction, RelayDriver, RelayEvent, ServerEvent};
pub use storage::RedbStore;
pub use system_env::SystemEnv;
use tokio::sync::{Mutex, RwLock, mpsc};

pub use crate::auth::RedbCredentialStore;

/// The concrete driver this runtime hosts.
type Driver = RelayDriver<SystemEnv, RedbStore>;

/// Shared per-connection outbound channels.
///
/// All messages to a client go through its single unbounded sender,
/// preserving per-connection ordering.
pub(crate) struct SharedState {
    senders: RwLock<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    next_conn_id: AtomicU64,
}

impl SharedState {
    fn new() -> Self {
        Self { senders: RwLock::new(HashMap::new()), next_conn_id: AtomicU64::new(1) }
    }

    pub(crate) fn allocate_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) async fn insert_sender(&self, conn_id: u64, tx: mpsc::UnboundedSender<Message>) {
        self.senders.write().await.insert(conn_id, tx);
    }

    pub(crate) async fn remove_sender(&self, conn_id: u64) {
        self.senders.write().await.remove(&conn_id);
    }
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub(crate) driver: Arc<Mutex<Driver>>,
    pub(crate) shared: Arc<SharedState>,
    pub(crate) credentials: RedbCredentialStore<SystemEnv>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:5000").
    pub bind_address: String,
    /// Directory holding the redb databases. Created if missing.
    pub data_dir: PathBuf,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:5000".to_string(), data_dir: PathBuf::from("huddle-data") }
    }
}

/// Production Huddle server.
///
/// Wraps `RelayDriver` with an axum WebSocket transport and redb storage.
pub struct Server {
    listener: tokio::net::TcpListener,
    state: AppState,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            ServerError::Config(format!(
                "cannot create data dir {}: {e}",
                config.data_dir.display()
            ))
        })?;

        let env = SystemEnv::new();
        let store = RedbStore::open(config.data_dir.join("messages.redb"))?;
        let credentials =
            RedbCredentialStore::open(config.data_dir.join("users.redb"), env.clone())
                .map_err(|e| ServerError::Config(format!("cannot open account store: {e}")))?;

        let driver = RelayDriver::new(env, store);
        let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

        Ok(Self {
            listener,
            state: AppState {
                driver: Arc::new(Mutex::new(driver)),
                shared: Arc::new(SharedState::new()),
                credentials,
            },
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server until shutdown or a fatal transport error.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("server listening on {}", self.listener.local_addr()?);

        let app = router(self.state);
        axum::serve(self.listener, app).await?;

        Ok(())
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::upgrade))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .with_state(state)
}

/// Feed one event through the driver and execute the resulting actions.
///
/// Processing and execution happen under the same driver guard so the
/// broadcast fan-out sees the registry state its actions were computed
/// from.
pub(crate) async fn dispatch(state: &AppState, event: RelayEvent) {
    let mut driver = state.driver.lock().await;
    let actions = driver.process_event(event);
    execute_actions(&driver, actions, &state.shared).await;
}

/// Execute relay actions against the outbound channels.
async fn execute_actions(driver: &Driver, actions: Vec<RelayAction>, shared: &SharedState) {
    for action in actions {
        match action {
            RelayAction::SendToConnection { conn_id, event } => {
                let Some(text) = encode_event(&event) else { continue };

                let senders = shared.senders.read().await;
                if let Some(tx) = senders.get(&conn_id) {
                    if tx.send(Message::Text(text.into())).is_err() {
                        tracing::debug!("send to closing connection {conn_id}");
                    }
                } else {
                    tracing::warn!("SendToConnection: connection {conn_id} not found");
                }
            },

            RelayAction::BroadcastToRoom { room, event, exclude } => {
                let conns = driver.conns_in_room(&room);
                let Some(text) = encode_event(&event) else { continue };

                let senders = shared.senders.read().await;
                for conn_id in conns {
                    if Some(conn_id) == exclude {
                        continue;
                    }
                    if let Some(tx) = senders.get(&conn_id) {
                        if tx.send(Message::Text(text.clone().into())).is_err() {
                            tracing::debug!("broadcast to closing connection {conn_id}");
                        }
                    }
                }
            },

            RelayAction::BroadcastToAll { event } => {
                let Some(text) = encode_event(&event) else { continue };

                let senders = shared.senders.read().await;
                for (conn_id, tx) in senders.iter() {
                    if tx.send(Message::Text(text.clone().into())).is_err() {
                        tracing::debug!("broadcast to closing connection {conn_id}");
                    }
                }
            },

            RelayAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

fn encode_event(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::error!("failed to encode outbound event: {err}");
            None
        },
    }
}
