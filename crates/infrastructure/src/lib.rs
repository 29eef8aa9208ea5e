//! 基础设施层：PostgreSQL 存储实现与外部目录适配。

pub mod db;

pub use db::directories::{PgListingDirectory, PgUserDirectory};
pub use db::repositories::{PgConversationRepository, PgMessageRepository};
pub use db::{create_pg_pool, DbPool};
