//! Error types shared by the services and the HTTP layer.
//!
//! Services return [`ChatError`]; handlers return [`AppResult`], whose error
//! converts into a JSON `{success: false, message}` response. Storage details
//! are logged and never sent to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Coarse classification used for status codes and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    Upstream,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message text cannot be empty")]
    EmptyText,
    #[error("group name must be 1 to 100 characters")]
    InvalidName,
    #[error("a group must have at least 2 members")]
    InsufficientMembers,
    #[error("one or more participant ids are invalid")]
    UnknownParticipant,

    #[error("you cannot start a conversation with yourself")]
    SelfConversation,
    #[error("you can only message your friends")]
    NotFriends,
    #[error("user is already a participant in this group")]
    AlreadyMember,
    #[error("user is not a participant in this group")]
    NotAMember,
    #[error("the group admin must transfer adminship before leaving")]
    AdminMustTransfer,

    #[error("group conversation not found")]
    NotFound,
    #[error("conversation not found")]
    ConversationNotFound,
    #[error("message not found")]
    MessageNotFound,

    #[error("only the group admin can do that")]
    NotAuthorized,
    #[error("you are not a participant in this conversation")]
    NotAParticipant,
    #[error("only the sender can change this message")]
    NotOwner,

    #[error("storage error: {0}")]
    Upstream(#[from] sqlx::Error),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        use ChatError::*;
        match self {
            EmptyText | InvalidName | InsufficientMembers | UnknownParticipant => {
                ErrorKind::Validation
            }
            SelfConversation | NotFriends | AlreadyMember | NotAMember | AdminMustTransfer => {
                ErrorKind::Conflict
            }
            NotFound | ConversationNotFound | MessageNotFound => ErrorKind::NotFound,
            NotAuthorized | NotAParticipant | NotOwner => ErrorKind::Forbidden,
            Upstream(_) => ErrorKind::Upstream,
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    Chat(ChatError),
    Unauthenticated,
    Internal(anyhow::Error),
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        Self::Chat(err)
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Chat(err) => match err.kind() {
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, err.to_string()),
                ErrorKind::Conflict => (StatusCode::CONFLICT, err.to_string()),
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
                ErrorKind::Forbidden => (StatusCode::FORBIDDEN, err.to_string()),
                ErrorKind::Upstream => {
                    error!(error = %err, "storage failure surfaced to client");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "storage unavailable, try again later".to_owned(),
                    )
                }
            },
            AppError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "not signed in".to_owned())
            }
            AppError::Internal(err) => {
                error!(error = ?err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(ChatError::EmptyText.kind(), ErrorKind::Validation);
        assert_eq!(ChatError::SelfConversation.kind(), ErrorKind::Conflict);
        assert_eq!(ChatError::MessageNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(ChatError::NotOwner.kind(), ErrorKind::Forbidden);
        assert_eq!(
            ChatError::Upstream(sqlx::Error::PoolTimedOut).kind(),
            ErrorKind::Upstream
        );
    }

    #[test]
    fn upstream_errors_hide_storage_details() {
        let response = AppError::from(ChatError::Upstream(sqlx::Error::PoolTimedOut)).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn forbidden_maps_to_403() {
        let response = AppError::from(ChatError::NotAuthorized).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
