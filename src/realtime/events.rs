//! Realtime wire format. Field names are what clients bind to; keep them
//! stable.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::{ConversationId, Message, MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderSummary {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub text: String,
    pub conversation_id: ConversationId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub sender: SenderSummary,
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            text: message.text.clone(),
            conversation_id: message.conversation_id,
            created_at: message.created_at,
            sender: SenderSummary {
                id: message.sender_id,
                name: message.sender_name.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedPayload {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
}

impl From<&Message> for DeletedPayload {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAck {
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Frames sent to clients as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    MessageCreated(MessagePayload),
    MessageUpdated(MessagePayload),
    MessageDeleted(DeletedPayload),
    JoinedConversation(RoomAck),
    LeftConversation(RoomAck),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload { message: message.into() })
    }

    pub fn name(&self) -> &'static str {
        use ServerEvent::*;
        match self {
            MessageCreated(_) => "messageCreated",
            MessageUpdated(_) => "messageUpdated",
            MessageDeleted(_) => "messageDeleted",
            JoinedConversation(_) => "joinedConversation",
            LeftConversation(_) => "leftConversation",
            Error(_) => "error",
        }
    }
}

/// Control frames clients send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinConversation { conversation_id: ConversationId },
    LeaveConversation { conversation_id: ConversationId },
}
