//! 会话服务
//!
//! 所有会话/消息用例的编排入口。持久化经由存储契约，推送经由
//! 投递路由，时间经由时钟接口，因此全部用例都可以在内存中测试。
//!
//! 并发模型：每个会话持有一把异步互斥锁，写路径（发送、撤回、
//! 标记已读、删除）在锁内完成"读改写 + 广播"，保证同一会话内
//! 消息追加与事件扇出的次序一致；不同会话之间完全并行。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use config::ChatConfig;
use domain::{
    ChatEvent, ConnectionId, Conversation, ConversationId, DomainError, ListingDirectory,
    ListingId, Message, MessageContent, MessageId, RepositoryError, UserDirectory, UserId,
    UserStatus,
};

use crate::clock::Clock;
use crate::delivery::DeliveryRouter;
use crate::dto::ConversationSummary;
use crate::error::{ApplicationError, ApplicationResult};
use crate::presence::{PresenceInfo, PresenceRegistry, PresenceTransition};
use crate::repository::{ConversationRepository, MessageRepository};

/// 业务策略参数，从配置派生。
#[derive(Debug, Clone)]
pub struct ChatPolicy {
    /// 消息发出后允许撤回的时间窗口
    pub recall_window: Duration,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// 每个连接的推送缓冲容量
    pub event_buffer: usize,
}

impl ChatPolicy {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            recall_window: Duration::minutes(config.recall_window_minutes),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            event_buffer: config.event_buffer,
        }
    }
}

impl Default for ChatPolicy {
    fn default() -> Self {
        Self {
            recall_window: Duration::minutes(15),
            default_page_size: 20,
            max_page_size: 100,
            event_buffer: 256,
        }
    }
}

/// 服务的全部外部依赖，组合根负责装配。
pub struct ChatServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_directory: Arc<dyn UserDirectory>,
    pub listing_directory: Arc<dyn ListingDirectory>,
    pub clock: Arc<dyn Clock>,
    pub presence: Arc<PresenceRegistry>,
    pub router: Arc<DeliveryRouter>,
    pub policy: ChatPolicy,
}

#[derive(Debug, Clone)]
pub struct CreateConversationRequest {
    pub initiator_id: Uuid,
    pub peer_id: Uuid,
    /// 发起会话时关联的商品，可选
    pub listing_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub images: Vec<String>,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
    // 会话标识 -> 会话写锁。条目随会话删除而移除。
    conversation_locks: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self {
            deps,
            conversation_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &ChatPolicy {
        &self.deps.policy
    }

    /// 创建（或返回已有的）两人会话。
    ///
    /// 同一对用户的创建是幂等的：无论谁发起、参数顺序如何，
    /// 得到的都是同一个会话。关联的商品不存在时降级为无商品
    /// 会话而不是失败。
    pub async fn create_conversation(
        &self,
        request: CreateConversationRequest,
    ) -> ApplicationResult<Conversation> {
        let initiator = UserId::from(request.initiator_id);
        let peer = UserId::from(request.peer_id);

        self.ensure_active_user(initiator).await?;
        self.ensure_active_user(peer).await?;

        // 归一化参与者对，自聊在这里被拒绝
        let (low, high) = Conversation::participant_pair(initiator, peer)?;

        if let Some(existing) = self
            .deps
            .conversation_repository
            .find_by_participants(low, high)
            .await?
        {
            return Ok(existing);
        }

        let listing_id = self.resolve_listing(request.listing_id).await?;
        let conversation = Conversation::new(
            ConversationId::from(Uuid::new_v4()),
            low,
            high,
            listing_id,
            self.deps.clock.now(),
        )?;

        match self.deps.conversation_repository.insert(conversation).await {
            Ok(created) => {
                tracing::info!(
                    conversation_id = %created.id,
                    initiator = %initiator,
                    peer = %peer,
                    "会话已创建"
                );
                Ok(created)
            }
            // 并发创建撞上唯一约束：返回赢家写入的那个会话
            Err(RepositoryError::Conflict) => self
                .deps
                .conversation_repository
                .find_by_participants(low, high)
                .await?
                .ok_or(ApplicationError::Repository(RepositoryError::Conflict)),
            Err(err) => Err(err.into()),
        }
    }

    /// 用户的会话列表，按最近活动倒序，并带上每个会话的未读条数。
    pub async fn list_conversations(
        &self,
        user_id: Uuid,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> ApplicationResult<Vec<ConversationSummary>> {
        let user_id = UserId::from(user_id);
        let (limit, offset) = self.page(limit, offset);

        let conversations = self
            .deps
            .conversation_repository
            .list_for_user(user_id, limit, offset)
            .await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let unread_count = self
                .deps
                .message_repository
                .count_unread(conversation.id, user_id)
                .await?;
            summaries.push(ConversationSummary {
                conversation,
                unread_count,
            });
        }
        Ok(summaries)
    }

    /// 删除会话及其全部消息。只有参与者可以删除。
    pub async fn delete_conversation(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> ApplicationResult<()> {
        let conversation_id = ConversationId::from(conversation_id);
        let conversation = self.require_conversation(conversation_id).await?;
        self.require_participant(&conversation, UserId::from(user_id))?;

        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        // 先清消息再删会话，两步之间没有别的写者（持有会话锁）
        self.deps
            .message_repository
            .delete_by_conversation(conversation_id)
            .await?;
        self.deps
            .conversation_repository
            .delete(conversation_id)
            .await?;
        self.conversation_locks
            .lock()
            .await
            .remove(&conversation_id);

        tracing::info!(conversation_id = %conversation_id, user_id = %user_id, "会话已删除");
        Ok(())
    }

    /// 发送消息：持久化、推进会话活动时间、向双方在线连接广播。
    pub async fn send_message(&self, request: SendMessageRequest) -> ApplicationResult<Message> {
        let conversation_id = ConversationId::from(request.conversation_id);
        let sender_id = UserId::from(request.sender_id);

        let content = MessageContent::new(request.content)?;
        self.ensure_active_user(sender_id).await?;

        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        // 锁内重读，会话可能在拿锁前被删除
        let conversation = self.require_conversation(conversation_id).await?;
        self.require_participant(&conversation, sender_id)?;

        let now = self.deps.clock.now();
        let message = Message::new(
            MessageId::from(Uuid::new_v4()),
            conversation_id,
            sender_id,
            content,
            request.images,
            now,
        )?;

        let message = self.deps.message_repository.insert(message).await?;
        self.deps
            .conversation_repository
            .touch(conversation_id, now)
            .await?;

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            sender_id = %sender_id,
            "消息已发送"
        );

        self.deps
            .router
            .broadcast_to_conversation(
                &conversation,
                ChatEvent::MessageCreated {
                    conversation_id,
                    message: message.clone(),
                },
            )
            .await;

        Ok(message)
    }

    /// 撤回消息。只有发送者本人可以撤回，且必须在撤回窗口内；
    /// 窗口以处理时刻为准，不以请求发出时刻为准。
    pub async fn recall_message(
        &self,
        message_id: Uuid,
        requester_id: Uuid,
    ) -> ApplicationResult<Message> {
        let message_id = MessageId::from(message_id);
        let requester_id = UserId::from(requester_id);

        let located = self.require_message(message_id).await?;
        let conversation = self.require_conversation(located.conversation_id).await?;

        let lock = self.lock_for(conversation.id).await;
        let _guard = lock.lock().await;

        // 锁内重读消息，避免覆盖并发的已读/撤回迁移
        let mut message = self.require_message(message_id).await?;
        if message.sender_id != requester_id {
            return Err(DomainError::NotSender.into());
        }

        message.recall(self.deps.clock.now(), self.deps.policy.recall_window)?;
        let message = self.deps.message_repository.update(message).await?;

        tracing::info!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            "消息已撤回"
        );

        self.deps
            .router
            .broadcast_to_conversation(
                &conversation,
                ChatEvent::MessageRecalled {
                    conversation_id: conversation.id,
                    message: message.clone(),
                },
            )
            .await;

        Ok(message)
    }

    /// 将单条消息标记为已读。幂等：重复标记直接返回当前状态，
    /// 只有实际发生迁移时才广播 message_read。
    pub async fn mark_as_read(
        &self,
        message_id: Uuid,
        reader_id: Uuid,
    ) -> ApplicationResult<Message> {
        let message_id = MessageId::from(message_id);
        let reader_id = UserId::from(reader_id);

        let located = self.require_message(message_id).await?;
        let conversation = self.require_conversation(located.conversation_id).await?;
        self.require_participant(&conversation, reader_id)?;

        let lock = self.lock_for(conversation.id).await;
        let _guard = lock.lock().await;

        let mut message = self.require_message(message_id).await?;
        // 自己发的消息不存在"已读"迁移
        if message.sender_id == reader_id || !message.mark_read(self.deps.clock.now()) {
            return Ok(message);
        }

        let message = self.deps.message_repository.update(message).await?;
        self.deps
            .router
            .broadcast_to_conversation(
                &conversation,
                ChatEvent::MessageRead {
                    conversation_id: conversation.id,
                    message: message.clone(),
                },
            )
            .await;

        Ok(message)
    }

    /// 拉取会话消息（聊天顺序，升序）。查看即已读：拉取前先把
    /// 对方发来的未读消息批量置为已读。
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> ApplicationResult<Vec<Message>> {
        let conversation_id = ConversationId::from(conversation_id);
        let reader_id = UserId::from(reader_id);

        let conversation = self.require_conversation(conversation_id).await?;
        self.require_participant(&conversation, reader_id)?;

        let (limit, offset) = self.page(limit, offset);

        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let transitioned = self
            .deps
            .message_repository
            .mark_conversation_read(conversation_id, reader_id, self.deps.clock.now())
            .await?;
        if transitioned > 0 {
            tracing::debug!(
                conversation_id = %conversation_id,
                reader_id = %reader_id,
                count = transitioned,
                "拉取时批量标记已读"
            );
        }

        Ok(self
            .deps
            .message_repository
            .list_by_conversation(conversation_id, limit, offset)
            .await?)
    }

    /// 登记一个新的在线连接。返回连接标识，供断开时注销。
    /// 首个连接会让用户转为在线，并向其全部会话对端广播。
    pub async fn connect_user(
        &self,
        user_id: Uuid,
        sender: mpsc::Sender<ChatEvent>,
    ) -> ApplicationResult<ConnectionId> {
        let user_id = UserId::from(user_id);
        self.ensure_active_user(user_id).await?;

        let (connection_id, transition) = self
            .deps
            .presence
            .register_connection(user_id, sender)
            .await;
        if let Some(transition) = transition {
            self.fanout_presence(transition).await?;
        }
        Ok(connection_id)
    }

    /// 注销连接。最后一个连接断开时用户转为离线并广播。
    pub async fn disconnect_user(
        &self,
        user_id: Uuid,
        connection_id: ConnectionId,
    ) -> ApplicationResult<()> {
        let user_id = UserId::from(user_id);
        if let Some(transition) = self
            .deps
            .presence
            .unregister_connection(user_id, connection_id)
            .await
        {
            self.fanout_presence(transition).await?;
        }
        Ok(())
    }

    pub async fn presence_of(&self, user_id: Uuid) -> PresenceInfo {
        self.deps.presence.presence_of(UserId::from(user_id)).await
    }

    /// 向该用户全部会话的对端推送上下线事件。
    async fn fanout_presence(&self, transition: PresenceTransition) -> ApplicationResult<()> {
        let conversations = self
            .deps
            .conversation_repository
            .list_for_user(transition.user_id, u32::MAX, 0)
            .await?;
        let event = ChatEvent::from(transition.clone());
        for conversation in conversations {
            if let Some(peer) = conversation.other_participant(transition.user_id) {
                self.deps.router.push_to_user(peer, event.clone()).await;
            }
        }
        Ok(())
    }

    async fn ensure_active_user(&self, user_id: UserId) -> ApplicationResult<()> {
        match self.deps.user_directory.find_status(user_id).await? {
            Some(UserStatus::Active) => Ok(()),
            Some(UserStatus::Locked) => Err(DomainError::UserLocked.into()),
            None => Err(DomainError::UserNotFound.into()),
        }
    }

    /// 校验商品引用。不存在的商品降级为 None 并记录告警，
    /// 会话创建本身不因此失败。
    async fn resolve_listing(
        &self,
        listing_id: Option<Uuid>,
    ) -> ApplicationResult<Option<ListingId>> {
        let Some(listing_id) = listing_id else {
            return Ok(None);
        };
        let listing_id = ListingId::from(listing_id);
        if self.deps.listing_directory.exists(listing_id).await? {
            Ok(Some(listing_id))
        } else {
            tracing::warn!(listing_id = %listing_id, "商品不存在，忽略会话的商品关联");
            Ok(None)
        }
    }

    async fn require_conversation(
        &self,
        id: ConversationId,
    ) -> ApplicationResult<Conversation> {
        self.deps
            .conversation_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::ConversationNotFound.into())
    }

    async fn require_message(&self, id: MessageId) -> ApplicationResult<Message> {
        self.deps
            .message_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::MessageNotFound.into())
    }

    fn require_participant(
        &self,
        conversation: &Conversation,
        user_id: UserId,
    ) -> ApplicationResult<()> {
        if conversation.is_participant(user_id) {
            Ok(())
        } else {
            Err(DomainError::NotParticipant.into())
        }
    }

    fn page(&self, limit: Option<u32>, offset: Option<u32>) -> (u32, u32) {
        let limit = limit
            .unwrap_or(self.deps.policy.default_page_size)
            .clamp(1, self.deps.policy.max_page_size);
        (limit, offset.unwrap_or(0))
    }

    async fn lock_for(&self, conversation_id: ConversationId) -> Arc<Mutex<()>> {
        let mut locks = self.conversation_locks.lock().await;
        Arc::clone(locks.entry(conversation_id).or_default())
    }
}
