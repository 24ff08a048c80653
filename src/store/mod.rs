//! Persistence gateway over SQLite.
//!
//! [`Store`] is plain CRUD over conversations, participants, messages, and
//! the read-only user/friendship tables. It enforces no business rules
//! beyond what the schema does (unique membership, unique direct pairs).
//! Every call goes through [`retry`] so transient failures are retried
//! before they reach a service.
//!
//! Queries use the runtime-checked `sqlx::query*` forms; migrations under
//! `migrations/` are embedded at compile time.

mod conversations;
mod messages;
mod notifications;
mod users;

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    db::{Conversation, Message, Participant, Role, User},
    retry::{RetryPolicy, retry},
};

pub use conversations::DirectConversation;

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl Store {
    /// Open (or create) the database at `url` and run pending migrations.
    pub async fn connect(url: &str, max_connections: u32, retry: RetryPolicy) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool, retry).await
    }

    pub async fn from_pool(pool: SqlitePool, retry: RetryPolicy) -> Result<Self, sqlx::Error> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations applied");
        Ok(Self { pool, retry })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        retry(&self.retry, "ping", || sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(())
    }
}

type ConversationRow = (i64, bool, Option<String>, Option<i64>, OffsetDateTime);

fn conversation_from_row(
    (id, is_group, group_name, group_admin_id, created_at): ConversationRow,
) -> Conversation {
    Conversation {
        id,
        is_group,
        group_name,
        group_admin_id,
        created_at,
    }
}

type ParticipantRow = (i64, Option<String>, i64, String, String);

fn participant_from_row(
    (conversation_id, role, user_id, name, email): ParticipantRow,
) -> Result<Participant, sqlx::Error> {
    let role = role
        .as_deref()
        .map(Role::from_str)
        .transpose()
        .map_err(|e| sqlx::Error::Decode(e.into()))?;

    Ok(Participant {
        conversation_id,
        role,
        user: User { id: user_id, name, email },
    })
}

type MessageRow = (i64, i64, i64, String, String, OffsetDateTime);

fn message_from_row(
    (id, conversation_id, sender_id, sender_name, text, created_at): MessageRow,
) -> Message {
    Message {
        id,
        conversation_id,
        sender_id,
        sender_name,
        text,
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let store = testing::store().await;
        Store::from_pool(store.pool().clone(), RetryPolicy::none())
            .await
            .unwrap();
        store.ping().await.unwrap();
    }
}
