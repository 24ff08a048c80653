use std::collections::BTreeMap;

use time::OffsetDateTime;

use super::{ConversationRow, ParticipantRow, Store, conversation_from_row, participant_from_row};
use crate::{
    db::{Conversation, ConversationId, ConversationWithParticipants, Participant, Role, UserId},
    retry::retry,
};

const CONVERSATION_COLUMNS: &str = "id, is_group, group_name, group_admin_id, created_at";

/// Outcome of [`Store::find_or_create_direct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectConversation {
    pub id: ConversationId,
    pub created: bool,
}

fn direct_key(a: UserId, b: UserId) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{low}:{high}")
}

impl Store {
    pub async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>, sqlx::Error> {
        let query = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1");
        let row: Option<ConversationRow> = retry(&self.retry, "conversation", || {
            sqlx::query_as(&query).bind(id).fetch_optional(&self.pool)
        })
        .await?;

        Ok(row.map(conversation_from_row))
    }

    pub async fn participants(&self, id: ConversationId) -> Result<Vec<Participant>, sqlx::Error> {
        let rows: Vec<ParticipantRow> = retry(&self.retry, "participants", || {
            sqlx::query_as(
                "SELECT p.conversation_id, p.role, u.id, u.name, u.email \
                 FROM participants p JOIN users u ON u.id = p.user_id \
                 WHERE p.conversation_id = ?1 ORDER BY u.id",
            )
            .bind(id)
            .fetch_all(&self.pool)
        })
        .await?;

        rows.into_iter().map(participant_from_row).collect()
    }

    pub async fn conversation_with_participants(
        &self,
        id: ConversationId,
    ) -> Result<Option<ConversationWithParticipants>, sqlx::Error> {
        let Some(conversation) = self.conversation(id).await? else {
            return Ok(None);
        };
        let participants = self.participants(id).await?;

        Ok(Some(ConversationWithParticipants { conversation, participants }))
    }

    pub async fn is_participant(&self, id: ConversationId, user_id: UserId) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = retry(&self.retry, "is_participant", || {
            sqlx::query_as("SELECT 1 FROM participants WHERE conversation_id = ?1 AND user_id = ?2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
        })
        .await?;

        Ok(row.is_some())
    }

    pub async fn participant_ids(&self, id: ConversationId) -> Result<Vec<UserId>, sqlx::Error> {
        let rows: Vec<(i64,)> = retry(&self.retry, "participant_ids", || {
            sqlx::query_as("SELECT user_id FROM participants WHERE conversation_id = ?1 ORDER BY user_id")
                .bind(id)
                .fetch_all(&self.pool)
        })
        .await?;

        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }

    /// Returns the direct conversation of `a` and `b`, creating it with both
    /// participants if none exists. The unique `direct_key` makes concurrent
    /// callers converge on one row.
    pub async fn find_or_create_direct(&self, a: UserId, b: UserId) -> Result<DirectConversation, sqlx::Error> {
        let key = direct_key(a, b);
        let key = key.as_str();

        retry(&self.retry, "find_or_create_direct", || async move {
            let mut tx = self.pool.begin().await?;

            let inserted: Option<(i64,)> = sqlx::query_as(
                "INSERT INTO conversations (is_group, direct_key, created_at) VALUES (0, ?1, ?2) \
                 ON CONFLICT (direct_key) DO NOTHING RETURNING id",
            )
            .bind(key)
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(&mut *tx)
            .await?;

            let direct = match inserted {
                Some((id,)) => {
                    for user_id in [a, b] {
                        sqlx::query("INSERT INTO participants (conversation_id, user_id, role) VALUES (?1, ?2, NULL)")
                            .bind(id)
                            .bind(user_id)
                            .execute(&mut *tx)
                            .await?;
                    }
                    DirectConversation { id, created: true }
                }
                None => {
                    let (id,): (i64,) = sqlx::query_as("SELECT id FROM conversations WHERE direct_key = ?1")
                        .bind(key)
                        .fetch_one(&mut *tx)
                        .await?;
                    DirectConversation { id, created: false }
                }
            };

            tx.commit().await?;
            Ok::<_, sqlx::Error>(direct)
        })
        .await
    }

    /// Inserts a group and its participants atomically. `admin_id` gets
    /// [`Role::Admin`], every other id [`Role::Member`]; `members` must
    /// already be deduplicated and include the admin.
    pub async fn insert_group(
        &self,
        name: &str,
        admin_id: UserId,
        members: &[UserId],
    ) -> Result<ConversationId, sqlx::Error> {
        retry(&self.retry, "insert_group", || async move {
            let mut tx = self.pool.begin().await?;

            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO conversations (is_group, group_name, group_admin_id, created_at) \
                 VALUES (1, ?1, ?2, ?3) RETURNING id",
            )
            .bind(name)
            .bind(admin_id)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&mut *tx)
            .await?;

            for &user_id in members {
                let role = if user_id == admin_id { Role::Admin } else { Role::Member };
                sqlx::query("INSERT INTO participants (conversation_id, user_id, role) VALUES (?1, ?2, ?3)")
                    .bind(id)
                    .bind(user_id)
                    .bind(role.as_str())
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok::<_, sqlx::Error>(id)
        })
        .await
    }

    pub async fn update_group_name(&self, id: ConversationId, name: &str) -> Result<(), sqlx::Error> {
        retry(&self.retry, "update_group_name", || {
            sqlx::query("UPDATE conversations SET group_name = ?1 WHERE id = ?2 AND is_group = 1")
                .bind(name)
                .bind(id)
                .execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    /// Returns `false` when the user already participates.
    pub async fn insert_participant(
        &self,
        id: ConversationId,
        user_id: UserId,
        role: Role,
    ) -> Result<bool, sqlx::Error> {
        let result = retry(&self.retry, "insert_participant", || {
            sqlx::query(
                "INSERT INTO participants (conversation_id, user_id, role) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (conversation_id, user_id) DO NOTHING",
            )
            .bind(id)
            .bind(user_id)
            .bind(role.as_str())
            .execute(&self.pool)
        })
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Returns `false` when there was no such participant.
    pub async fn delete_participant(&self, id: ConversationId, user_id: UserId) -> Result<bool, sqlx::Error> {
        let result = retry(&self.retry, "delete_participant", || {
            sqlx::query("DELETE FROM participants WHERE conversation_id = ?1 AND user_id = ?2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
        })
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Every conversation with its participants, oldest first, read in one
    /// transaction.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationWithParticipants>, sqlx::Error> {
        let conversations_query = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations ORDER BY id");
        let conversations_query = conversations_query.as_str();

        let (conversations, participants) = retry(&self.retry, "list_conversations", || async move {
            let mut tx = self.pool.begin().await?;
            let conversations: Vec<ConversationRow> =
                sqlx::query_as(conversations_query).fetch_all(&mut *tx).await?;
            let participants: Vec<ParticipantRow> = sqlx::query_as(
                "SELECT p.conversation_id, p.role, u.id, u.name, u.email \
                 FROM participants p JOIN users u ON u.id = p.user_id \
                 ORDER BY p.conversation_id, u.id",
            )
            .fetch_all(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>((conversations, participants))
        })
        .await?;

        let mut by_conversation: BTreeMap<ConversationId, Vec<Participant>> = BTreeMap::new();
        for row in participants {
            let participant = participant_from_row(row)?;
            by_conversation
                .entry(participant.conversation_id)
                .or_default()
                .push(participant);
        }

        Ok(conversations
            .into_iter()
            .map(|row| {
                let conversation = conversation_from_row(row);
                let participants = by_conversation.remove(&conversation.id).unwrap_or_default();
                ConversationWithParticipants { conversation, participants }
            })
            .collect())
    }
}
