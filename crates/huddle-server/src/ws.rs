//! WebSocket transport.
//!
//! One actor per connection: the socket is split into halves, a writer task
//! owns the sink and drains an mpsc channel (any part of the system sends
//! to a client by cloning the sender), and the reader loop decodes JSON
//! text frames into client events for the driver. Malformed frames are
//! logged and skipped, never fatal.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use huddle_core::{ClientEvent, RelayEvent};
use tokio::sync::mpsc;

use crate::{AppState, dispatch};

/// `GET /ws`
///
/// Upgrades to a WebSocket and runs the connection actor. Identity is not
/// established here: clients name themselves on join/create events, exactly
/// like the rest of the event contract.
pub(crate) async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let conn_id = state.shared.allocate_conn_id();
    ws.on_upgrade(move |socket| run_connection(socket, state, conn_id))
}

/// Drive one connection until it closes.
async fn run_connection(socket: WebSocket, state: AppState, conn_id: u64) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    state.shared.insert_sender(conn_id, tx.clone()).await;

    // Writer task: forwards mpsc messages to the WebSocket sink.
    let writer = tokio::spawn(writer_task(ws_sender, rx));

    dispatch(&state, RelayEvent::ConnectionOpened { conn_id }).await;
    tracing::debug!(conn_id, "WebSocket connection started");

    let mut close_reason = "stream ended".to_string();

    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        dispatch(&state, RelayEvent::ClientEvent { conn_id, event }).await;
                    },
                    Err(err) => {
                        tracing::debug!(conn_id, "skipping malformed frame: {err}");
                    },
                }
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = tx.send(Message::Pong(data));
            },
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(conn_id, reason = ?frame, "client initiated close");
                close_reason = "client initiated close".to_string();
                break;
            },
            Some(Ok(_)) => {
                // Binary frames and stray pongs are ignored; the contract
                // is JSON text.
            },
            Some(Err(err)) => {
                tracing::debug!(conn_id, "WebSocket receive error: {err}");
                close_reason = format!("receive error: {err}");
                break;
            },
            None => break,
        }
    }

    // Unregister before the close event so no broadcast targets a dead
    // sender.
    state.shared.remove_sender(conn_id).await;
    dispatch(&state, RelayEvent::ConnectionClosed { conn_id, reason: close_reason }).await;

    writer.abort();
}

/// Forward outbound messages to the sink until either side goes away.
async fn writer_task(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        if sink.send(message).await.is_err() {
            break;
        }
    }
}
