//! 事件投递路由
//!
//! 把聊天事件推送到参与者当前的全部在线连接。推送是尽力而为：
//! 失败只记录日志，永远不向调用方返回错误，持久状态不受影响。

use std::sync::Arc;

use domain::{ChatEvent, Conversation, UserId};

use crate::presence::{PresenceRegistry, PushError};

pub struct DeliveryRouter {
    presence: Arc<PresenceRegistry>,
}

impl DeliveryRouter {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self { presence }
    }

    /// 推送给会话双方的全部在线连接。
    pub async fn broadcast_to_conversation(&self, conversation: &Conversation, event: ChatEvent) {
        self.broadcast_to_users(&conversation.participants, event)
            .await;
    }

    pub async fn broadcast_to_users(&self, users: &[UserId], event: ChatEvent) {
        for user_id in users {
            self.push_to_user(*user_id, event.clone()).await;
        }
    }

    /// 定向推送。对端已关闭的陈旧句柄顺手从登记表注销；
    /// 缓冲满则丢弃该连接的这一条事件。
    pub async fn push_to_user(&self, user_id: UserId, event: ChatEvent) {
        let handles = self.presence.connections_for(user_id).await;
        if handles.is_empty() {
            tracing::debug!(user_id = %user_id, kind = event.kind(), "用户不在线，跳过推送");
            return;
        }

        for handle in handles {
            match handle.push(event.clone()) {
                Ok(()) => {}
                Err(PushError::Closed) => {
                    tracing::info!(
                        user_id = %user_id,
                        connection_id = %handle.id,
                        "连接已关闭，清理陈旧句柄"
                    );
                    self.presence.unregister_connection(user_id, handle.id).await;
                }
                Err(PushError::Full) => {
                    tracing::warn!(
                        user_id = %user_id,
                        connection_id = %handle.id,
                        kind = event.kind(),
                        "连接缓冲已满，丢弃事件"
                    );
                }
            }
        }
    }
}
