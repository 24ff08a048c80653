use time::OffsetDateTime;

use super::Store;
use crate::{notify::NotificationEvent, retry::retry};

impl Store {
    /// Records a notification, reusing the `(type, text)` event row when one
    /// already exists.
    pub async fn insert_notification(&self, event: &NotificationEvent) -> Result<(), sqlx::Error> {
        retry(&self.retry, "insert_notification", || async move {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "INSERT INTO notification_events (type, text) VALUES (?1, ?2) \
                 ON CONFLICT (type, text) DO NOTHING",
            )
            .bind(event.kind.as_str())
            .bind(&event.text)
            .execute(&mut *tx)
            .await?;

            let (event_id,): (i64,) =
                sqlx::query_as("SELECT id FROM notification_events WHERE type = ?1 AND text = ?2")
                    .bind(event.kind.as_str())
                    .bind(&event.text)
                    .fetch_one(&mut *tx)
                    .await?;

            sqlx::query(
                "INSERT INTO notifications (sender_id, receiver_id, entity_id, notification_event_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(event.sender_id)
            .bind(event.receiver_id)
            .bind(&event.entity_id)
            .bind(event_id)
            .bind(OffsetDateTime::now_utc())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(())
        })
        .await
    }
}
