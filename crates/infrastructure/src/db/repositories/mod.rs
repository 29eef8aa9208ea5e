mod conversation_repository_impl;
mod message_repository_impl;

pub use conversation_repository_impl::PgConversationRepository;
pub use message_repository_impl::PgMessageRepository;
