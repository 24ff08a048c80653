use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};

use super::{
    events::{ClientEvent, RoomAck, ServerEvent},
    rooms::{ConnectionId, Rooms},
};
use crate::{db::UserId, locks::ConversationLocks, session::AuthUser, store::Store};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn conversation_ws(
    AuthUser(user_id): AuthUser,
    State(rooms): State<Arc<Rooms>>,
    State(store): State<Store>,
    State(locks): State<Arc<ConversationLocks>>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |socket: WebSocket| {
        let (sender, receiver) = socket.split();
        run_connection(sender, receiver, user_id, rooms, store, locks).await
    })
}

/// Drives one client until it goes away: a writer task drains the
/// connection's outbound queue while this task answers control frames.
/// Leaves every room on exit.
pub(crate) async fn run_connection<Tx, Rx>(
    mut sender: Tx,
    mut receiver: Rx,
    user_id: UserId,
    rooms: Arc<Rooms>,
    store: Store,
    locks: Arc<ConversationLocks>,
) where
    Tx: Sink<WsMessage> + Unpin + Send + 'static,
    Rx: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    let (connection_id, mut rx) = rooms.connect(user_id);
    info!(%connection_id, user_id, "client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, event = event.name(), "could not encode event");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            frame = receiver.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let reply = match serde_json::from_str::<ClientEvent>(text.as_str()) {
                        Ok(event) => handle_client_event(&rooms, &store, &locks, connection_id, user_id, event).await,
                        Err(e) => {
                            debug!(%connection_id, error = %e, "unreadable control frame");
                            ServerEvent::error("unrecognized event")
                        }
                    };
                    rooms.send_to(connection_id, reply);
                }
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    rooms.disconnect(connection_id);
    send_task.abort();
    info!(%connection_id, user_id, "client disconnected");
}

/// Applies a control frame and returns the reply for the sender. Joining
/// requires the user to participate in the conversation right now; the check
/// and the subscribe run under the conversation's lock so a concurrent
/// removal either sees the subscription and evicts it or is seen by the check.
pub(crate) async fn handle_client_event(
    rooms: &Rooms,
    store: &Store,
    locks: &ConversationLocks,
    connection_id: ConnectionId,
    user_id: UserId,
    event: ClientEvent,
) -> ServerEvent {
    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            let _guard = locks.lock(conversation_id).await;
            match store.is_participant(conversation_id, user_id).await {
                Ok(true) => {
                    rooms.join(connection_id, conversation_id);
                    debug!(%connection_id, conversation_id, "joined room");
                    ServerEvent::JoinedConversation(RoomAck { conversation_id })
                }
                Ok(false) => ServerEvent::error("you are not a participant in this conversation"),
                Err(e) => {
                    warn!(%connection_id, conversation_id, error = %e, "participant check failed");
                    ServerEvent::error("storage unavailable, try again later")
                }
            }
        }
        ClientEvent::LeaveConversation { conversation_id } => {
            rooms.leave(connection_id, conversation_id);
            ServerEvent::LeftConversation(RoomAck { conversation_id })
        }
    }
}
