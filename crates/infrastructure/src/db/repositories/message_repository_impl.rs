//! 消息存储的 PostgreSQL 实现
//!
//! seq 列由数据库自增分配，只用于给相同 created_at 的消息一个
//! 稳定的次序，不对外暴露。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use application::MessageRepository;
use domain::{
    ConversationId, Message, MessageContent, MessageId, RepositoryError, Timestamp, UserId,
};

use crate::db::DbPool;

pub struct PgMessageRepository {
    pool: DbPool,
}

impl PgMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct DbMessage {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    images: Vec<String>,
    created_at: DateTime<Utc>,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    is_recalled: bool,
    recalled_at: Option<DateTime<Utc>>,
}

impl DbMessage {
    fn into_domain(self) -> Result<Message, RepositoryError> {
        // 行内容在写入时已通过校验，这里失败说明存储被绕过写坏了
        let content = MessageContent::new(self.content)
            .map_err(|err| RepositoryError::storage(format!("corrupt message content: {err}")))?;
        Ok(Message {
            id: MessageId::from(self.id),
            conversation_id: ConversationId::from(self.conversation_id),
            sender_id: UserId::from(self.sender_id),
            content,
            images: self.images,
            created_at: self.created_at,
            is_read: self.is_read,
            read_at: self.read_at,
            is_recalled: self.is_recalled,
            recalled_at: self.recalled_at,
        })
    }
}

fn storage(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

const SELECT_COLUMNS: &str = "id, conversation_id, sender_id, content, images, \
     created_at, is_read, read_at, is_recalled, recalled_at";

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        sqlx::query(
            "INSERT INTO messages \
             (id, conversation_id, sender_id, content, images, created_at, \
              is_read, read_at, is_recalled, recalled_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.conversation_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(&message.images)
        .bind(message.created_at)
        .bind(message.is_read)
        .bind(message.read_at)
        .bind(message.is_recalled)
        .bind(message.recalled_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query_as::<_, DbMessage>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(DbMessage::into_domain).transpose()
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query_as::<_, DbMessage>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages \
             WHERE conversation_id = $1 \
             ORDER BY created_at ASC, seq ASC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(Uuid::from(conversation_id))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter().map(DbMessage::into_domain).collect()
    }

    async fn update(&self, message: Message) -> Result<Message, RepositoryError> {
        let result = sqlx::query(
            "UPDATE messages \
             SET content = $2, images = $3, is_read = $4, read_at = $5, \
                 is_recalled = $6, recalled_at = $7 \
             WHERE id = $1",
        )
        .bind(Uuid::from(message.id))
        .bind(message.content.as_str())
        .bind(&message.images)
        .bind(message.is_read)
        .bind(message.read_at)
        .bind(message.is_recalled)
        .bind(message.recalled_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(message)
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
        at: Timestamp,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE, read_at = $3 \
             WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE",
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(reader_id))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected())
    }

    async fn count_unread(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE",
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(reader_id))
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        Ok(count as u64)
    }

    async fn delete_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(Uuid::from(conversation_id))
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}
