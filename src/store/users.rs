use super::Store;
use crate::{
    db::{User, UserId},
    retry::retry,
};

impl Store {
    pub async fn user(&self, id: UserId) -> Result<Option<User>, sqlx::Error> {
        let row: Option<(i64, String, String)> = retry(&self.retry, "user", || {
            sqlx::query_as("SELECT id, name, email FROM users WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
        })
        .await?;

        Ok(row.map(|(id, name, email)| User { id, name, email }))
    }

    /// How many of `ids` resolve to existing users.
    pub async fn count_existing_users(&self, ids: &[UserId]) -> Result<usize, sqlx::Error> {
        let ids = serde_json::to_string(ids).map_err(|e| sqlx::Error::Encode(e.into()))?;
        let ids = ids.as_str();

        let (count,): (i64,) = retry(&self.retry, "count_existing_users", || {
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE id IN (SELECT value FROM json_each(?1))")
                .bind(ids)
                .fetch_one(&self.pool)
        })
        .await?;

        Ok(count as usize)
    }

    /// Friendship rows may be stored in either direction.
    pub async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = retry(&self.retry, "are_friends", || {
            sqlx::query_as(
                "SELECT 1 FROM friendships \
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
            )
            .bind(a)
            .bind(b)
            .fetch_optional(&self.pool)
        })
        .await?;

        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{self, ALICE, BOB, CAROL, DAVE};

    #[tokio::test]
    async fn counts_only_known_users() {
        let store = testing::store().await;
        assert_eq!(store.count_existing_users(&[ALICE, BOB, 999]).await.unwrap(), 2);
        assert_eq!(store.count_existing_users(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn friendship_is_symmetric() {
        let store = testing::store().await;
        assert!(store.are_friends(ALICE, BOB).await.unwrap());
        assert!(store.are_friends(BOB, ALICE).await.unwrap());
        assert!(!store.are_friends(ALICE, DAVE).await.unwrap());
        assert_eq!(store.user(CAROL).await.unwrap().unwrap().name, "Carol");
    }
}
