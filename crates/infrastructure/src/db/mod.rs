pub mod directories;
pub mod repositories;

use config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;

pub type DbPool = sqlx::PgPool;

/// 按配置建立 PostgreSQL 连接池。
pub async fn create_pg_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    tracing::info!(max_connections = config.max_connections, "数据库连接池就绪");
    Ok(pool)
}
