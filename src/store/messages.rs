use time::OffsetDateTime;

use super::{MessageRow, Store, message_from_row};
use crate::{
    db::{ConversationId, Message, MessageId, UserId},
    retry::retry,
};

const MESSAGE_SELECT: &str = "SELECT m.id, m.conversation_id, m.sender_id, u.name, m.text, m.created_at \
     FROM messages m JOIN users u ON u.id = m.sender_id";

impl Store {
    /// Inserts a message only if `sender_id` participates in the conversation
    /// at the moment of the write; the membership check and the insert are a
    /// single statement. Returns `None` when the sender is not a participant.
    pub async fn insert_message_from_participant(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: &str,
    ) -> Result<Option<Message>, sqlx::Error> {
        let created_at = OffsetDateTime::now_utc();
        let inserted: Option<(i64,)> = retry(&self.retry, "insert_message", || {
            sqlx::query_as(
                "INSERT INTO messages (conversation_id, sender_id, text, created_at) \
                 SELECT ?1, ?2, ?3, ?4 \
                 WHERE EXISTS (SELECT 1 FROM participants WHERE conversation_id = ?1 AND user_id = ?2) \
                 RETURNING id",
            )
            .bind(conversation_id)
            .bind(sender_id)
            .bind(text)
            .bind(created_at)
            .fetch_optional(&self.pool)
        })
        .await?;

        match inserted {
            Some((id,)) => self.message(id).await,
            None => Ok(None),
        }
    }

    pub async fn message(&self, id: MessageId) -> Result<Option<Message>, sqlx::Error> {
        let query = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
        let row: Option<MessageRow> = retry(&self.retry, "message", || {
            sqlx::query_as(&query).bind(id).fetch_optional(&self.pool)
        })
        .await?;

        Ok(row.map(message_from_row))
    }

    /// Oldest first; ids are assigned in insertion order.
    pub async fn messages_in(&self, conversation_id: ConversationId) -> Result<Vec<Message>, sqlx::Error> {
        let query = format!("{MESSAGE_SELECT} WHERE m.conversation_id = ?1 ORDER BY m.id");
        let rows: Vec<MessageRow> = retry(&self.retry, "messages_in", || {
            sqlx::query_as(&query).bind(conversation_id).fetch_all(&self.pool)
        })
        .await?;

        Ok(rows.into_iter().map(message_from_row).collect())
    }

    pub async fn update_message_text(&self, id: MessageId, text: &str) -> Result<bool, sqlx::Error> {
        let result = retry(&self.retry, "update_message_text", || {
            sqlx::query("UPDATE messages SET text = ?1 WHERE id = ?2")
                .bind(text)
                .bind(id)
                .execute(&self.pool)
        })
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_message(&self, id: MessageId) -> Result<bool, sqlx::Error> {
        let result = retry(&self.retry, "delete_message", || {
            sqlx::query("DELETE FROM messages WHERE id = ?1").bind(id).execute(&self.pool)
        })
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
