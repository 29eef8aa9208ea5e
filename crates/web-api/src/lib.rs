//! Web API 层：HTTP 路由、WebSocket 推送与错误映射。

pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

pub use routes::create_router;
pub use state::AppState;
