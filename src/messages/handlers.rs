use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use serde::Deserialize;

use super::{ConversationMessages, MessageService, SentMessage};
use crate::{
    AppResult,
    db::{ConversationId, MessageId},
    realtime::DeletedPayload,
    res::{self, ApiResponse},
    session::AuthUser,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageBody {
    conversation_id: ConversationId,
    text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateMessageBody {
    text: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send_message(
    AuthUser(user_id): AuthUser,
    State(messages): State<MessageService>,
    Json(SendMessageBody { conversation_id, text }): Json<SendMessageBody>,
) -> AppResult<Json<ApiResponse<SentMessage>>> {
    let sent = messages.send(conversation_id, user_id, &text).await?;
    Ok(res::ok("Message sent successfully.", sent))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_message(
    AuthUser(user_id): AuthUser,
    State(messages): State<MessageService>,
    Path(message_id): Path<MessageId>,
    Json(UpdateMessageBody { text }): Json<UpdateMessageBody>,
) -> AppResult<Json<ApiResponse<SentMessage>>> {
    let updated = messages.update(message_id, user_id, &text).await?;
    Ok(res::ok("Message updated successfully.", updated))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_message(
    AuthUser(user_id): AuthUser,
    State(messages): State<MessageService>,
    Path(message_id): Path<MessageId>,
) -> AppResult<Json<ApiResponse<DeletedPayload>>> {
    let deleted = messages.delete(message_id, user_id).await?;
    Ok(res::ok("Message deleted successfully.", deleted))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_messages(
    AuthUser(user_id): AuthUser,
    State(messages): State<MessageService>,
    Path(conversation_id): Path<ConversationId>,
) -> AppResult<Json<ApiResponse<ConversationMessages>>> {
    let history = messages.list(conversation_id, user_id).await?;
    Ok(res::ok("Messages retrieved successfully.", history))
}
