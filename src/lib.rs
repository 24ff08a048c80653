pub mod appresult;
pub mod config;
pub mod conversations;
pub mod db;
pub mod friends;
pub mod locks;
pub mod messages;
pub mod notify;
pub mod realtime;
pub mod res;
pub mod retry;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::{
    Json, Router, debug_handler,
    extract::{FromRef, State},
    routing::get,
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use conversations::ConversationManager;
use friends::FriendDirectory;
use locks::ConversationLocks;
use messages::MessageService;
use notify::Notifier;
use realtime::Rooms;
use store::Store;

pub use appresult::{AppError, AppResult, ChatError, ChatResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub rooms: Arc<Rooms>,
    pub locks: Arc<ConversationLocks>,
    pub conversations: ConversationManager,
    pub messages: MessageService,
}

impl AppState {
    /// Wires the services together around one shared room registry and one
    /// set of conversation locks.
    pub fn new(
        store: Store,
        friends: Arc<dyn FriendDirectory>,
        notifier: Arc<dyn Notifier>,
        outbound_buffer: usize,
    ) -> Self {
        let rooms = Arc::new(Rooms::new(outbound_buffer));
        let locks = Arc::new(ConversationLocks::new());

        Self {
            conversations: ConversationManager::new(
                store.clone(),
                friends,
                Arc::clone(&rooms),
                Arc::clone(&locks),
            ),
            messages: MessageService::new(store.clone(), Arc::clone(&rooms), notifier, Arc::clone(&locks)),
            store,
            rooms,
            locks,
        }
    }
}

/// All routes, without the session layer; the caller adds that.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(conversations::router())
        .merge(messages::router())
        .merge(realtime::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
}

#[debug_handler(state = AppState)]
async fn health(State(store): State<Store>, State(rooms): State<Arc<Rooms>>) -> AppResult<Json<Value>> {
    store.ping().await.map_err(ChatError::from)?;
    Ok(Json(json!({
        "success": true,
        "connections": rooms.connection_count(),
    })))
}
