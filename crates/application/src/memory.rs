//! 内存实现
//!
//! 与存储契约同形的内存版本，供测试与本地演示使用，
//! 语义与数据库实现保持一致（唯一参与者对、排序、批量已读）。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use domain::{
    Conversation, ConversationId, ListingDirectory, ListingId, Message, MessageId,
    RepositoryError, Timestamp, UserDirectory, UserId, UserStatus,
};

use crate::repository::{ConversationRepository, MessageRepository};

#[derive(Default)]
struct ConversationStore {
    by_id: HashMap<ConversationId, Conversation>,
    by_pair: HashMap<(UserId, UserId), ConversationId>,
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    inner: RwLock<ConversationStore>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn insert(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let mut store = self.inner.write().await;
        let pair = (conversation.participants[0], conversation.participants[1]);
        if store.by_pair.contains_key(&pair) {
            return Err(RepositoryError::Conflict);
        }
        store.by_pair.insert(pair, conversation.id);
        store.by_id.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn find_by_participants(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let pair = if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };
        let store = self.inner.read().await;
        Ok(store
            .by_pair
            .get(&pair)
            .and_then(|id| store.by_id.get(id))
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let store = self.inner.read().await;
        let mut conversations: Vec<Conversation> = store
            .by_id
            .values()
            .filter(|conversation| conversation.is_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
        Ok(conversations
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn touch(&self, id: ConversationId, at: Timestamp) -> Result<(), RepositoryError> {
        let mut store = self.inner.write().await;
        let conversation = store.by_id.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        conversation.touch(at);
        Ok(())
    }

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let mut store = self.inner.write().await;
        let conversation = store.by_id.remove(&id).ok_or(RepositoryError::NotFound)?;
        store
            .by_pair
            .remove(&(conversation.participants[0], conversation.participants[1]));
        Ok(())
    }
}

#[derive(Default)]
struct MessageStore {
    by_id: HashMap<MessageId, Message>,
    // 每个会话内按插入顺序保存，created_at 相同也能保持稳定次序
    by_conversation: HashMap<ConversationId, Vec<MessageId>>,
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    inner: RwLock<MessageStore>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut store = self.inner.write().await;
        store
            .by_conversation
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        store.by_id.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let store = self.inner.read().await;
        let Some(ids) = store.by_conversation.get(&conversation_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|id| store.by_id.get(id))
            .cloned()
            .collect())
    }

    async fn update(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut store = self.inner.write().await;
        if !store.by_id.contains_key(&message.id) {
            return Err(RepositoryError::NotFound);
        }
        store.by_id.insert(message.id, message.clone());
        Ok(message)
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
        at: Timestamp,
    ) -> Result<u64, RepositoryError> {
        let mut store = self.inner.write().await;
        let ids = store
            .by_conversation
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();
        let mut transitioned = 0;
        for id in ids {
            if let Some(message) = store.by_id.get_mut(&id) {
                if message.sender_id != reader_id && message.mark_read(at) {
                    transitioned += 1;
                }
            }
        }
        Ok(transitioned)
    }

    async fn count_unread(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let store = self.inner.read().await;
        let Some(ids) = store.by_conversation.get(&conversation_id) else {
            return Ok(0);
        };
        Ok(ids
            .iter()
            .filter_map(|id| store.by_id.get(id))
            .filter(|message| message.sender_id != reader_id && !message.is_read)
            .count() as u64)
    }

    async fn delete_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), RepositoryError> {
        let mut store = self.inner.write().await;
        if let Some(ids) = store.by_conversation.remove(&conversation_id) {
            for id in ids {
                store.by_id.remove(&id);
            }
        }
        Ok(())
    }
}

/// 固定名册的用户目录，测试时预置用户状态。
#[derive(Default)]
pub struct StaticUserDirectory {
    users: RwLock<HashMap<UserId, UserStatus>>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: UserId, status: UserStatus) {
        self.users.write().await.insert(user_id, status);
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn find_status(&self, user_id: UserId) -> Result<Option<UserStatus>, RepositoryError> {
        Ok(self.users.read().await.get(&user_id).copied())
    }
}

/// 固定名册的商品目录。
#[derive(Default)]
pub struct StaticListingDirectory {
    listings: RwLock<HashSet<ListingId>>,
}

impl StaticListingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_listing(&self, listing_id: ListingId) {
        self.listings.write().await.insert(listing_id);
    }
}

#[async_trait]
impl ListingDirectory for StaticListingDirectory {
    async fn exists(&self, listing_id: ListingId) -> Result<bool, RepositoryError> {
        Ok(self.listings.read().await.contains(&listing_id))
    }
}
