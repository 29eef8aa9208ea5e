//! 应用层：会话/消息编排、在线状态登记与事件投递。

pub mod clock;
pub mod delivery;
pub mod dto;
pub mod error;
pub mod memory;
pub mod presence;
pub mod repository;
pub mod services;

pub use clock::{Clock, ManualClock, SystemClock};
pub use delivery::DeliveryRouter;
pub use dto::ConversationSummary;
pub use error::{ApplicationError, ApplicationResult};
pub use memory::{
    InMemoryConversationRepository, InMemoryMessageRepository, StaticListingDirectory,
    StaticUserDirectory,
};
pub use presence::{
    ConnectionHandle, PresenceInfo, PresenceRegistry, PresenceTransition, PushError,
};
pub use repository::{ConversationRepository, MessageRepository};
pub use services::{
    ChatPolicy, ChatService, ChatServiceDependencies, CreateConversationRequest,
    SendMessageRequest,
};
