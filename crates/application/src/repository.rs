//! 存储契约
//!
//! 会话与消息是两个独立的集合，消息外键到所属会话。
//! 级联删除由服务层编排：先清空消息，再删除会话。

use async_trait::async_trait;
use domain::{Conversation, ConversationId, Message, MessageId, RepositoryError, Timestamp, UserId};

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// 插入新会话。同一对参与者已存在会话时返回 `Conflict`。
    async fn insert(&self, conversation: Conversation) -> Result<Conversation, RepositoryError>;

    async fn find_by_id(&self, id: ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;

    /// 按参与者对查找。实现负责对参与者做归一化比较。
    async fn find_by_participants(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// 用户参与的会话，按最近活动时间倒序。
    async fn list_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError>;

    /// 记录一次新活动：last_message_at 单调推进，is_active 置真。
    async fn touch(&self, id: ConversationId, at: Timestamp) -> Result<(), RepositoryError>;

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    /// 会话内消息，按创建时间升序（聊天顺序）。
    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 覆盖保存已读/撤回等状态变更。消息不存在返回 `NotFound`。
    async fn update(&self, message: Message) -> Result<Message, RepositoryError>;

    /// 将会话内所有"对方发给 reader 且未读"的消息批量置为已读，
    /// 返回实际迁移的条数。
    async fn mark_conversation_read(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
        at: Timestamp,
    ) -> Result<u64, RepositoryError>;

    /// reader 在该会话中的未读条数（不含自己发送的消息）。
    async fn count_unread(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
    ) -> Result<u64, RepositoryError>;

    /// 删除会话下全部消息（会话删除的级联步骤）。
    async fn delete_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), RepositoryError>;
}
