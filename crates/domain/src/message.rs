use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConversationId, MessageContent, MessageId, Timestamp, UserId};

/// 单条消息最多携带的图片引用数量。
pub const MAX_IMAGES: usize = 9;

/// 会话消息。已读与撤回是两条相互独立的状态轴，都只允许 false→true
/// 一次性迁移；撤回后内容被占位符不可逆替换，图片引用被清空。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: MessageContent,
    /// 图片引用（由外部上传子系统持有的不透明键）。
    pub images: Vec<String>,
    pub created_at: Timestamp,
    pub is_read: bool,
    pub read_at: Option<Timestamp>,
    pub is_recalled: bool,
    pub recalled_at: Option<Timestamp>,
}

impl Message {
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: MessageContent,
        images: Vec<String>,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if images.len() > MAX_IMAGES {
            return Err(DomainError::invalid_argument("images", "too many images"));
        }
        Ok(Self {
            id,
            conversation_id,
            sender_id,
            content,
            images,
            created_at,
            is_read: false,
            read_at: None,
            is_recalled: false,
            recalled_at: None,
        })
    }

    /// 标记为已读。幂等：返回是否发生了实际迁移，重复调用不改动 read_at。
    pub fn mark_read(&mut self, at: Timestamp) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(at);
        true
    }

    /// 在限定时间窗口内撤回消息。
    ///
    /// 窗口边界以调用时刻的 `now` 与不可变的 `created_at` 比较，
    /// 恰好等于窗口长度时仍然允许撤回。
    pub fn recall(&mut self, now: Timestamp, window: Duration) -> Result<(), DomainError> {
        if self.is_recalled {
            return Err(DomainError::AlreadyRecalled);
        }
        if now - self.created_at > window {
            return Err(DomainError::RecallWindowExpired);
        }
        self.content = MessageContent::recalled_placeholder();
        self.images.clear();
        self.is_recalled = true;
        self.recalled_at = Some(now);
        Ok(())
    }
}
