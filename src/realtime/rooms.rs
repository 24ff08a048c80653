//! The subscription map: which live connections listen to which
//! conversation.
//!
//! Everything here is synchronous and the mutex is never held across an
//! `.await`. Publishing copies the room's senders out under the lock and
//! delivers after releasing it with `try_send`, so a slow or dead connection
//! only loses its own events.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};
use uuid::Uuid;

use super::events::ServerEvent;
use crate::db::{ConversationId, UserId};

pub type ConnectionId = Uuid;

#[derive(Debug)]
struct Connection {
    user_id: UserId,
    tx: mpsc::Sender<ServerEvent>,
    rooms: HashSet<ConversationId>,
}

#[derive(Debug, Default)]
struct Subscriptions {
    rooms: HashMap<ConversationId, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, Connection>,
}

impl Subscriptions {
    fn unsubscribe(&mut self, connection_id: ConnectionId, conversation_id: ConversationId) -> bool {
        let Some(connection) = self.connections.get_mut(&connection_id) else {
            return false;
        };
        if !connection.rooms.remove(&conversation_id) {
            return false;
        }
        if let Some(room) = self.rooms.get_mut(&conversation_id) {
            room.remove(&connection_id);
            if room.is_empty() {
                self.rooms.remove(&conversation_id);
            }
        }
        true
    }
}

#[derive(Debug)]
pub struct Rooms {
    inner: Mutex<Subscriptions>,
    buffer: usize,
}

impl Rooms {
    /// `buffer` is how many undelivered events a connection may queue before
    /// further events to it are dropped.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Mutex::new(Subscriptions::default()),
            buffer: buffer.max(1),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Subscriptions> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection with no room membership.
    pub fn connect(&self, user_id: UserId) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::now_v7();
        self.inner().connections.insert(
            id,
            Connection {
                user_id,
                tx,
                rooms: HashSet::new(),
            },
        );
        (id, rx)
    }

    /// Returns `false` if the connection is gone.
    pub fn join(&self, connection_id: ConnectionId, conversation_id: ConversationId) -> bool {
        let mut inner = self.inner();
        let Some(connection) = inner.connections.get_mut(&connection_id) else {
            return false;
        };
        connection.rooms.insert(conversation_id);
        inner.rooms.entry(conversation_id).or_default().insert(connection_id);
        true
    }

    pub fn leave(&self, connection_id: ConnectionId, conversation_id: ConversationId) -> bool {
        self.inner().unsubscribe(connection_id, conversation_id)
    }

    /// Drops the connection from every room it joined.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        let mut inner = self.inner();
        let Some(connection) = inner.connections.remove(&connection_id) else {
            return;
        };
        for conversation_id in connection.rooms {
            if let Some(room) = inner.rooms.get_mut(&conversation_id) {
                room.remove(&connection_id);
                if room.is_empty() {
                    inner.rooms.remove(&conversation_id);
                }
            }
        }
    }

    /// Unsubscribes every connection of `user_id` from the room, e.g. after
    /// the user left the group. Returns how many were removed.
    pub fn evict_user(&self, conversation_id: ConversationId, user_id: UserId) -> usize {
        let mut inner = self.inner();
        let targets: Vec<ConnectionId> = inner
            .rooms
            .get(&conversation_id)
            .into_iter()
            .flatten()
            .filter(|id| inner.connections.get(id).is_some_and(|c| c.user_id == user_id))
            .copied()
            .collect();

        targets
            .into_iter()
            .filter(|&id| inner.unsubscribe(id, conversation_id))
            .count()
    }

    /// Fans `event` out to everyone currently in the room. Best effort:
    /// full or closed queues are skipped. Returns the number of connections
    /// the event was queued for.
    pub fn publish(&self, conversation_id: ConversationId, event: ServerEvent) -> usize {
        let senders: Vec<(ConnectionId, mpsc::Sender<ServerEvent>)> = {
            let inner = self.inner();
            inner
                .rooms
                .get(&conversation_id)
                .into_iter()
                .flatten()
                .filter_map(|id| inner.connections.get(id).map(|c| (*id, c.tx.clone())))
                .collect()
        };

        let mut delivered = 0;
        for (connection_id, tx) in senders {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(%connection_id, conversation_id, event = event.name(), "outbound queue full, dropping event");
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(%connection_id, conversation_id, "connection closing, dropping event");
                }
            }
        }
        delivered
    }

    /// Sends to a single connection, e.g. a reply to a control frame.
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let tx = self.inner().connections.get(&connection_id).map(|c| c.tx.clone());
        tx.is_some_and(|tx| tx.try_send(event).is_ok())
    }

    pub fn room_size(&self, conversation_id: ConversationId) -> usize {
        self.inner().rooms.get(&conversation_id).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.inner().connections.len()
    }
}
