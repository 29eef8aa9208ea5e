use domain::Conversation;
use serde::Serialize;

/// 会话列表项：会话本体加上查询方的未读条数。
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: u64,
}
