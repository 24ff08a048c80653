mod handlers;
mod service;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::AppState;

pub use service::{ConversationMessages, MessageService, MessageView, SentMessage};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", post(handlers::send_message))
        .route(
            "/messages/{id}",
            patch(handlers::update_message).delete(handlers::delete_message),
        )
        .route("/conversations/{id}/messages", get(handlers::list_messages))
}
