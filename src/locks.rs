//! Per-conversation critical sections.
//!
//! Message writes and membership removals in one conversation run one at a
//! time so that validation, persistence, and the realtime publish happen as
//! a unit and events leave in completion order. Different conversations never
//! contend.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::db::ConversationId;

#[derive(Debug, Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<ConversationId, Weak<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            match locks.get(&id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    locks.retain(|_, lock| lock.strong_count() > 0);
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(id, Arc::downgrade(&lock));
                    lock
                }
            }
        };

        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_conversation_is_exclusive() {
        let locks = Arc::new(ConversationLocks::new());
        let guard = locks.lock(1).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(1).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn other_conversations_do_not_wait() {
        let locks = ConversationLocks::new();
        let _one = locks.lock(1).await;

        tokio::time::timeout(Duration::from_millis(100), locks.lock(2))
            .await
            .expect("lock for another conversation should be free");
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = ConversationLocks::new();
        drop(locks.lock(1).await);
        drop(locks.lock(2).await);

        assert_eq!(locks.tracked(), 1);
    }
}
