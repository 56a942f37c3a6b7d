// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! WebSocket relay router and connection handling.
//!
//! Each connection may join one room; signaling envelopes it sends are
//! broadcast to the other members of that room, and envelopes from the
//! other members are forwarded back down the socket.
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use campusmeet_common::{ClientMessage, RoomId, ServerMessage, SignalEnvelope, UserId};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::store::MeetingStore;
use crate::validation;
use crate::AppState;

/// Create the WebSocket relay router
pub fn create_router<S: MeetingStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Handler for WebSocket connections
pub async fn ws_handler<S: MeetingStore + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

// One connection's live room subscription.
struct RoomSubscription {
    room_id: RoomId,
    user_id: UserId,
    bus: broadcast::Sender<SignalEnvelope>,
    relay: JoinHandle<()>,
}

impl RoomSubscription {
    fn shut_down(self, state: &AppState<impl MeetingStore>) {
        self.relay.abort();
        state.rooms.release(&self.room_id);
    }
}

async fn handle_connection<S: MeetingStore + 'static>(
    socket: WebSocket,
    state: Arc<AppState<S>>,
) {
    let (mut sink, mut stream) = socket.split();

    // channel feeding the socket; the relay task and the request loop
    // both write through it
    let (client_tx, mut client_rx) = mpsc::channel::<Message>(32);

    let send_task = tokio::spawn(async move {
        while let Some(message) = client_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut subscription: Option<RoomSubscription> = None;

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::JoinRoom { room_id, user_id }) => {
                    if subscription.is_some() {
                        send_error(&client_tx, "ALREADY_JOINED", "connection is already in a room")
                            .await;
                        continue;
                    }
                    if let Err(err) = validation::validate_room_id(&room_id) {
                        send_error(&client_tx, "INVALID_ROOM_ID", &err.to_string()).await;
                        continue;
                    }

                    let bus = state.rooms.bus(&room_id);
                    let relay = spawn_relay(bus.subscribe(), user_id.clone(), client_tx.clone());

                    tracing::debug!(%room_id, %user_id, "connection joined room");
                    send_message(
                        &client_tx,
                        &ServerMessage::RoomJoined {
                            room_id: room_id.clone(),
                        },
                    )
                    .await;

                    subscription = Some(RoomSubscription {
                        room_id,
                        user_id,
                        bus,
                        relay,
                    });
                },
                Ok(ClientMessage::Signal { event, payload }) => match &subscription {
                    Some(sub) => {
                        // best-effort: a send with no other subscribers
                        // is not an error
                        let _ = sub.bus.send(SignalEnvelope {
                            room_id: sub.room_id.clone(),
                            sender_id: sub.user_id.clone(),
                            event,
                            payload,
                        });
                    },
                    None => {
                        send_error(&client_tx, "NOT_IN_ROOM", "join a room before signaling")
                            .await;
                    },
                },
                Ok(ClientMessage::LeaveRoom) => {
                    if let Some(sub) = subscription.take() {
                        sub.shut_down(&state);
                    }
                },
                Err(err) => {
                    send_error(&client_tx, "MALFORMED_MESSAGE", &err.to_string()).await;
                },
            },
            Message::Close(_) => break,
            _ => {},
        }
    }

    // dropping the connection leaves the room
    if let Some(sub) = subscription.take() {
        sub.shut_down(&state);
    }
    send_task.abort();
}

// Forward room envelopes from other senders down the socket.
fn spawn_relay(
    mut rx: broadcast::Receiver<SignalEnvelope>,
    user_id: UserId,
    client_tx: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    if envelope.sender_id == user_id {
                        continue;
                    }
                    let message = ServerMessage::Signal {
                        sender_id: envelope.sender_id,
                        event: envelope.event,
                        payload: envelope.payload,
                    };
                    let Ok(json) = serde_json::to_string(&message) else {
                        continue;
                    };
                    if client_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "relay subscriber lagged");
                },
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn send_message(client_tx: &mpsc::Sender<Message>, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(json) => {
            if let Err(err) = client_tx.send(Message::Text(json.into())).await {
                tracing::warn!(error = %err, "failed to send server message");
            }
        },
        Err(err) => tracing::warn!(error = %err, "failed to serialize server message"),
    }
}

async fn send_error(client_tx: &mpsc::Sender<Message>, code: &str, message: &str) {
    send_message(
        client_tx,
        &ServerMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
        },
    )
    .await;
}
