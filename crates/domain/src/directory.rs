//! 外部协作方契约
//!
//! 用户与商品由市场主系统持有，这里只依赖按标识的只读查询，
//! 不在本子系统内重复实现任何 CRUD。

use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::value_objects::{ListingId, UserId};

/// 外部用户系统中的账号状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    Locked,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 查询用户状态；不存在返回 `None`。
    async fn find_status(&self, user_id: UserId) -> Result<Option<UserStatus>, RepositoryError>;
}

#[async_trait]
pub trait ListingDirectory: Send + Sync {
    /// 商品是否仍然存在（下架/删除的商品返回 false）。
    async fn exists(&self, listing_id: ListingId) -> Result<bool, RepositoryError>;
}
