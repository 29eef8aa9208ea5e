//! 会话存储的 PostgreSQL 实现
//!
//! 参与者对归一化后落到 (participant_low, participant_high) 两列，
//! 由唯一索引保证"同一对用户最多一个会话"。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use application::ConversationRepository;
use domain::{Conversation, ConversationId, RepositoryError, Timestamp, UserId};

use crate::db::DbPool;

pub struct PgConversationRepository {
    pool: DbPool,
}

impl PgConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct DbConversation {
    id: Uuid,
    participant_low: Uuid,
    participant_high: Uuid,
    listing_id: Option<Uuid>,
    last_message_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl DbConversation {
    fn into_domain(self) -> Conversation {
        Conversation {
            id: ConversationId::from(self.id),
            participants: [
                UserId::from(self.participant_low),
                UserId::from(self.participant_high),
            ],
            listing_id: self.listing_id.map(Into::into),
            last_message_at: self.last_message_at,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

fn storage(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

const SELECT_COLUMNS: &str = "id, participant_low, participant_high, listing_id, \
     last_message_at, is_active, created_at";

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn insert(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO conversations \
             (id, participant_low, participant_high, listing_id, last_message_at, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::from(conversation.id))
        .bind(Uuid::from(conversation.participants[0]))
        .bind(Uuid::from(conversation.participants[1]))
        .bind(conversation.listing_id.map(Uuid::from))
        .bind(conversation.last_message_at)
        .bind(conversation.is_active)
        .bind(conversation.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(conversation),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepositoryError::Conflict)
            }
            Err(err) => Err(storage(err)),
        }
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query_as::<_, DbConversation>(&format!(
            "SELECT {SELECT_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        Ok(row.map(DbConversation::into_domain))
    }

    async fn find_by_participants(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let (low, high) = if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };

        let row = sqlx::query_as::<_, DbConversation>(&format!(
            "SELECT {SELECT_COLUMNS} FROM conversations \
             WHERE participant_low = $1 AND participant_high = $2"
        ))
        .bind(Uuid::from(low))
        .bind(Uuid::from(high))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        Ok(row.map(DbConversation::into_domain))
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query_as::<_, DbConversation>(&format!(
            "SELECT {SELECT_COLUMNS} FROM conversations \
             WHERE participant_low = $1 OR participant_high = $1 \
             ORDER BY COALESCE(last_message_at, created_at) DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(Uuid::from(user_id))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(DbConversation::into_domain).collect())
    }

    async fn touch(&self, id: ConversationId, at: Timestamp) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversations \
             SET last_message_at = GREATEST(COALESCE(last_message_at, $2), $2), is_active = TRUE \
             WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
