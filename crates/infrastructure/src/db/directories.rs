//! 外部协作方目录的数据库适配
//!
//! 用户与商品归别的子系统所有，这里只读它们的表做状态判定。

use async_trait::async_trait;
use uuid::Uuid;

use domain::{ListingDirectory, ListingId, RepositoryError, UserDirectory, UserId, UserStatus};

use crate::db::DbPool;

pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_status(&self, user_id: UserId) -> Result<Option<UserStatus>, RepositoryError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM users WHERE id = $1")
                .bind(Uuid::from(user_id))
                .fetch_optional(&self.pool)
                .await
                .map_err(|err| RepositoryError::storage(err.to_string()))?;

        // 除 active 外的一切状态（锁定、封禁、注销中）都按不可用处理
        Ok(status.map(|status| match status.as_str() {
            "active" => UserStatus::Active,
            _ => UserStatus::Locked,
        }))
    }
}

pub struct PgListingDirectory {
    pool: DbPool,
}

impl PgListingDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingDirectory for PgListingDirectory {
    async fn exists(&self, listing_id: ListingId) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM listings WHERE id = $1)")
                .bind(Uuid::from(listing_id))
                .fetch_one(&self.pool)
                .await
                .map_err(|err| RepositoryError::storage(err.to_string()))?;
        Ok(exists)
    }
}
