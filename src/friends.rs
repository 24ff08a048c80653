use async_trait::async_trait;

use crate::{appresult::ChatResult, db::UserId, store::Store};

/// Read side of the friend service.
#[async_trait]
pub trait FriendDirectory: Send + Sync + 'static {
    async fn are_friends(&self, a: UserId, b: UserId) -> ChatResult<bool>;
}

/// Answers from the `friendships` table the friend service maintains.
#[derive(Clone, Debug)]
pub struct StoreFriends {
    store: Store,
}

impl StoreFriends {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FriendDirectory for StoreFriends {
    async fn are_friends(&self, a: UserId, b: UserId) -> ChatResult<bool> {
        Ok(self.store.are_friends(a, b).await?)
    }
}
