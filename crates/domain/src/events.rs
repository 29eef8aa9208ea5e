//! 领域事件
//!
//! 服务层产生事件，投递路由负责向在线连接扇出。每个事件都携带
//! 变更后实体的完整状态，客户端无需回查。

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::value_objects::{ConversationId, Timestamp, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    MessageCreated {
        conversation_id: ConversationId,
        message: Message,
    },
    MessageRecalled {
        conversation_id: ConversationId,
        message: Message,
    },
    MessageRead {
        conversation_id: ConversationId,
        message: Message,
    },
    PresenceChanged {
        user_id: UserId,
        is_online: bool,
        last_seen: Option<Timestamp>,
    },
}

impl ChatEvent {
    /// 事件名，用于日志。
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageCreated { .. } => "message_created",
            Self::MessageRecalled { .. } => "message_recalled",
            Self::MessageRead { .. } => "message_read",
            Self::PresenceChanged { .. } => "presence_changed",
        }
    }
}
