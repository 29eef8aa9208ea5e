//! 服务入口：装配配置、存储、在线状态登记与路由并启动监听。

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use application::{
    ChatPolicy, ChatService, ChatServiceDependencies, DeliveryRouter, PresenceRegistry,
    SystemClock,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, PgConversationRepository, PgListingDirectory, PgMessageRepository,
    PgUserDirectory,
};
use web_api::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    let pool = create_pg_pool(&config.database).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let clock = Arc::new(SystemClock);
    let presence = Arc::new(PresenceRegistry::new(clock.clone()));
    let router = Arc::new(DeliveryRouter::new(Arc::clone(&presence)));

    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        conversation_repository: Arc::new(PgConversationRepository::new(pool.clone())),
        message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
        user_directory: Arc::new(PgUserDirectory::new(pool.clone())),
        listing_directory: Arc::new(PgListingDirectory::new(pool.clone())),
        clock,
        presence: Arc::clone(&presence),
        router,
        policy: ChatPolicy::from_config(&config.chat),
    }));

    let app = create_router(AppState::new(chat_service));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "会话服务已启动");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 退出前释放全部在线连接登记
    presence.clear().await;
    tracing::info!("会话服务已退出");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "监听退出信号失败");
    }
}
