//! 在线状态登记
//!
//! 维护 用户 -> 在线连接集合 的映射。外层读写锁只保护条目表，
//! 每个用户持有自己的条目锁，登记/注销/快照都经过同一把条目锁，
//! 因此对单个用户是线性一致的，不同用户之间互不阻塞。
//!
//! 登记表是显式构造的实例，由服务层与投递路由共同引用；
//! 进程退出前可调用 [`PresenceRegistry::clear`] 释放全部连接。

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};

use domain::{ChatEvent, ConnectionId, Timestamp, UserId};

use crate::clock::Clock;

/// 单个在线连接的推送句柄。
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    sender: mpsc::Sender<ChatEvent>,
}

/// 推送失败的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// 对端已关闭，句柄应被清理。
    Closed,
    /// 缓冲已满，事件被丢弃（推送只是延迟优化，不影响持久状态）。
    Full,
}

impl ConnectionHandle {
    /// 非阻塞推送：连接写缓冲满或已关闭都不会阻塞调用方。
    pub fn push(&self, event: ChatEvent) -> Result<(), PushError> {
        self.sender.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
            mpsc::error::TrySendError::Full(_) => PushError::Full,
        })
    }
}

/// 在线标志发生翻转时产生的状态迁移，用于对外广播 presence_changed。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceTransition {
    pub user_id: UserId,
    pub is_online: bool,
    pub last_seen: Option<Timestamp>,
}

impl From<PresenceTransition> for ChatEvent {
    fn from(value: PresenceTransition) -> Self {
        ChatEvent::PresenceChanged {
            user_id: value.user_id,
            is_online: value.is_online,
            last_seen: value.last_seen,
        }
    }
}

/// 对外查询用的在线状态快照。
#[derive(Debug, Clone, Serialize)]
pub struct PresenceInfo {
    pub user_id: UserId,
    pub is_online: bool,
    pub last_seen: Option<Timestamp>,
}

#[derive(Default)]
struct UserEntry {
    connections: HashMap<ConnectionId, mpsc::Sender<ChatEvent>>,
    is_online: bool,
    last_seen: Option<Timestamp>,
}

pub struct PresenceRegistry {
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<UserId, Arc<Mutex<UserEntry>>>>,
}

impl PresenceRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn entry(&self, user_id: UserId) -> Arc<Mutex<UserEntry>> {
        if let Some(entry) = self.entries.read().await.get(&user_id) {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write().await;
        Arc::clone(entries.entry(user_id).or_default())
    }

    /// 登记一个新连接。返回分配的连接标识；
    /// 如果这是该用户的第一个连接，额外返回一次"上线"迁移。
    pub async fn register_connection(
        &self,
        user_id: UserId,
        sender: mpsc::Sender<ChatEvent>,
    ) -> (ConnectionId, Option<PresenceTransition>) {
        let entry = self.entry(user_id).await;
        let mut entry = entry.lock().await;

        let connection_id = ConnectionId::generate();
        entry.connections.insert(connection_id, sender);

        let transition = if entry.is_online {
            None
        } else {
            entry.is_online = true;
            // 在线期间 last_seen 没有意义，离线时重新盖戳
            entry.last_seen = None;
            tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户上线");
            Some(PresenceTransition {
                user_id,
                is_online: true,
                last_seen: None,
            })
        };

        (connection_id, transition)
    }

    /// 注销连接。移除最后一个连接时翻转为离线并盖上 last_seen；
    /// 对已不存在的连接是安全的空操作（路由的陈旧句柄清理和
    /// 连接任务的正常退出可能先后处理同一个句柄）。
    pub async fn unregister_connection(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Option<PresenceTransition> {
        let entry = self.entry(user_id).await;
        let mut entry = entry.lock().await;

        if entry.connections.remove(&connection_id).is_none() {
            return None;
        }

        if entry.connections.is_empty() && entry.is_online {
            entry.is_online = false;
            entry.last_seen = Some(self.clock.now());
            tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户离线");
            return Some(PresenceTransition {
                user_id,
                is_online: false,
                last_seen: entry.last_seen,
            });
        }

        None
    }

    /// 当前连接集合的快照，供定向投递使用。快照之后连接仍可能
    /// 并发关闭，推送到陈旧句柄由调用方静默清理。
    pub async fn connections_for(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        let entry = self.entry(user_id).await;
        let entry = entry.lock().await;
        entry
            .connections
            .iter()
            .map(|(id, sender)| ConnectionHandle {
                id: *id,
                sender: sender.clone(),
            })
            .collect()
    }

    pub async fn presence_of(&self, user_id: UserId) -> PresenceInfo {
        let entry = self.entry(user_id).await;
        let entry = entry.lock().await;
        PresenceInfo {
            user_id,
            is_online: entry.is_online,
            last_seen: entry.last_seen,
        }
    }

    /// 清空全部登记（进程关闭时调用），已连接的接收端会随发送端
    /// 释放而收到通道关闭。
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
