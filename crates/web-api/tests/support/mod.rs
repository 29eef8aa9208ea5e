//! 集成测试基座：内存依赖 + 随机端口上的真实 HTTP/WS 服务。

use std::net::SocketAddr;
use std::sync::Arc;

use uuid::Uuid;

use application::{
    ChatPolicy, ChatService, ChatServiceDependencies, DeliveryRouter,
    InMemoryConversationRepository, InMemoryMessageRepository, PresenceRegistry,
    StaticListingDirectory, StaticUserDirectory, SystemClock,
};
use domain::UserStatus;
use web_api::{create_router, AppState};

pub struct TestServer {
    pub addr: SocketAddr,
    pub users: Arc<StaticUserDirectory>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let users = Arc::new(StaticUserDirectory::new());
        let listings = Arc::new(StaticListingDirectory::new());
        let clock = Arc::new(SystemClock);
        let presence = Arc::new(PresenceRegistry::new(clock.clone()));
        let router = Arc::new(DeliveryRouter::new(Arc::clone(&presence)));

        let service = Arc::new(ChatService::new(ChatServiceDependencies {
            conversation_repository: Arc::new(InMemoryConversationRepository::new()),
            message_repository: Arc::new(InMemoryMessageRepository::new()),
            user_directory: users.clone(),
            listing_directory: listings,
            clock,
            presence,
            router,
            policy: ChatPolicy::default(),
        }));

        let app = create_router(AppState::new(service));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });

        Self { addr, users }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws_url(&self, user_id: Uuid) -> String {
        format!("ws://{}/ws?user_id={user_id}", self.addr)
    }

    pub async fn active_user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.users.add_user(id.into(), UserStatus::Active).await;
        id
    }
}
