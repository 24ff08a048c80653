//! Bridge to the notification service.
//!
//! [`Notifier::notify`] is fire-and-forget: it returns immediately and a
//! failed delivery never fails the operation that triggered it.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::{db::UserId, store::Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    NewMessage,
    FriendRequest,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        use NotificationKind::*;
        match self {
            NewMessage => "NEW_MESSAGE",
            FriendRequest => "FRIEND_REQUEST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    /// Id of the thing the notification points at, e.g. a message id.
    pub entity_id: String,
}

pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, event: NotificationEvent);
}

/// Writes durable notification records on background tasks. Writes still
/// running at shutdown are lost unless [`StoreNotifier::flush`] is awaited.
#[derive(Clone, Debug)]
pub struct StoreNotifier {
    store: Store,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl StoreNotifier {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            tasks: Arc::default(),
        }
    }

    /// Waits for every write queued so far.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let count = pending.len();
        while pending.join_next().await.is_some() {}
        debug!(count, "notification writes flushed");
    }
}

impl Notifier for StoreNotifier {
    fn notify(&self, event: NotificationEvent) {
        let store = self.store.clone();
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        // reap finished writes
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            match store.insert_notification(&event).await {
                Ok(()) => debug!(kind = event.kind.as_str(), receiver = event.receiver_id, "notification stored"),
                Err(e) => warn!(
                    kind = event.kind.as_str(),
                    receiver = event.receiver_id,
                    error = %e,
                    "dropping notification"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{self, ALICE, BOB};

    async fn notification_count(store: &Store) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications")
            .fetch_one(store.pool())
            .await
            .unwrap();
        count
    }

    fn new_message(entity_id: &str) -> NotificationEvent {
        NotificationEvent {
            kind: NotificationKind::NewMessage,
            sender_id: ALICE,
            receiver_id: BOB,
            text: "Alice sent you a message".to_owned(),
            entity_id: entity_id.to_owned(),
        }
    }

    #[tokio::test]
    async fn event_rows_are_shared_between_notifications() {
        let store = testing::store().await;

        store.insert_notification(&new_message("1")).await.unwrap();
        store.insert_notification(&new_message("2")).await.unwrap();

        let (events,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notification_events")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(events, 1);
        assert_eq!(notification_count(&store).await, 2);
    }

    #[tokio::test]
    async fn store_notifier_writes_in_the_background() {
        let store = testing::store().await;
        let notifier = StoreNotifier::new(store.clone());

        notifier.notify(new_message("9"));

        for _ in 0..100 {
            if notification_count(&store).await == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("notification was never stored");
    }

    #[tokio::test]
    async fn flush_waits_for_pending_writes() {
        let store = testing::store().await;
        let notifier = StoreNotifier::new(store.clone());

        for id in ["1", "2", "3"] {
            notifier.notify(new_message(id));
        }
        notifier.flush().await;

        assert_eq!(notification_count(&store).await, 3);
        // nothing left to wait for
        notifier.flush().await;
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let store = testing::store().await;
        let notifier = StoreNotifier::new(store.clone());
        store.pool().close().await;

        // returns without panicking even though the write will fail
        notifier.notify(new_message("1"));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn kinds_serialize_in_wire_form() {
        let json = serde_json::to_value(new_message("3")).unwrap();
        assert_eq!(json["kind"], "NEW_MESSAGE");
        assert_eq!(json["entityId"], "3");
        assert_eq!(NotificationKind::FriendRequest.as_str(), "FRIEND_REQUEST");
    }
}
