mod handlers;
mod service;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::AppState;

pub use service::{ConversationManager, ConversationSummary, DirectOutcome, ParticipantSummary};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(handlers::list_all))
        .route("/conversations/direct", post(handlers::create_direct))
        .route("/conversations/groups", post(handlers::create_group))
        .route("/conversations/groups/{id}", patch(handlers::update_group))
        .route("/conversations/groups/{id}/members", post(handlers::add_member))
        .route(
            "/conversations/groups/{id}/members/{member_id}",
            delete(handlers::remove_member),
        )
        .route("/conversations/groups/{id}/leave", post(handlers::leave_group))
}
