use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConversationId, ListingId, Timestamp, UserId};

/// 两人会话。参与者对是无序的：同一对用户最多只存在一个会话，
/// 内部按标识归一化存储以便用作唯一键。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    /// 归一化后的参与者对，participants[0] < participants[1]。
    pub participants: [UserId; 2],
    pub listing_id: Option<ListingId>,
    pub last_message_at: Option<Timestamp>,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl Conversation {
    pub fn new(
        id: ConversationId,
        user_a: UserId,
        user_b: UserId,
        listing_id: Option<ListingId>,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let participants = Self::participant_pair(user_a, user_b)?;
        Ok(Self {
            id,
            participants: [participants.0, participants.1],
            listing_id,
            last_message_at: None,
            is_active: true,
            created_at,
        })
    }

    /// 将两个用户归一化为有序对，自聊被拒绝。
    pub fn participant_pair(a: UserId, b: UserId) -> Result<(UserId, UserId), DomainError> {
        if a == b {
            return Err(DomainError::InvalidParticipants);
        }
        if a < b {
            Ok((a, b))
        } else {
            Ok((b, a))
        }
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    /// 会话中的另一方。
    pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    /// 记录一次新活动。last_message_at 单调不减。
    pub fn touch(&mut self, at: Timestamp) {
        self.last_message_at = Some(match self.last_message_at {
            Some(current) => current.max(at),
            None => at,
        });
        self.is_active = true;
    }

    /// 用于会话列表排序的活动时间：还没有消息时退回创建时间。
    pub fn activity_at(&self) -> Timestamp {
        self.last_message_at.unwrap_or(self.created_at)
    }
}
