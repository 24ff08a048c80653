//! Fixtures for unit tests: an in-memory database seeded with a few users.

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::{
    conversations::ConversationManager,
    db::UserId,
    friends::StoreFriends,
    locks::ConversationLocks,
    messages::MessageService,
    notify::{NotificationEvent, Notifier},
    realtime::Rooms,
    retry::RetryPolicy,
    store::Store,
};

pub const ALICE: UserId = 1;
pub const BOB: UserId = 2;
pub const CAROL: UserId = 3;
/// Has no friends.
pub const DAVE: UserId = 4;

/// One connection that never expires, so the in-memory database lives as
/// long as the pool.
pub async fn store() -> Store {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    let store = Store::from_pool(pool, RetryPolicy::none()).await.unwrap();

    for (id, name) in [(ALICE, "Alice"), (BOB, "Bob"), (CAROL, "Carol"), (DAVE, "Dave")] {
        sqlx::query("INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(name)
            .bind(format!("{}@example.com", name.to_lowercase()))
            .execute(store.pool())
            .await
            .unwrap();
    }
    // stored in both directions on purpose
    for (a, b) in [(ALICE, BOB), (CAROL, ALICE), (BOB, CAROL)] {
        sqlx::query("INSERT INTO friendships (user_id, friend_id) VALUES (?1, ?2)")
            .bind(a)
            .bind(b)
            .execute(store.pool())
            .await
            .unwrap();
    }

    store
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct TestApp {
    pub store: Store,
    pub rooms: Arc<Rooms>,
    pub notifier: Arc<RecordingNotifier>,
    pub conversations: ConversationManager,
    pub messages: MessageService,
}

pub async fn app() -> TestApp {
    let store = store().await;
    let rooms = Arc::new(Rooms::new(64));
    let locks = Arc::new(ConversationLocks::new());
    let notifier = Arc::new(RecordingNotifier::default());

    TestApp {
        conversations: ConversationManager::new(
            store.clone(),
            Arc::new(StoreFriends::new(store.clone())),
            Arc::clone(&rooms),
            Arc::clone(&locks),
        ),
        messages: MessageService::new(store.clone(), Arc::clone(&rooms), notifier.clone(), locks),
        store,
        rooms,
        notifier,
    }
}
