//! Realtime fan-out of message events over WebSockets.

pub mod events;
pub mod rooms;
mod ws;

use axum::{Router, routing::get};

use crate::AppState;

pub use events::{ClientEvent, DeletedPayload, MessagePayload, ServerEvent};
pub use rooms::{ConnectionId, Rooms};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::conversation_ws))
}
