//! 领域错误定义
//!
//! 调用方可以根据错误种类区分"重试无用"（权限、已撤回、窗口过期）
//! 与"重试可能成功"（存储故障）两类失败。

use thiserror::Error;

/// 领域规则错误。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("conversation not found")]
    ConversationNotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("user account is locked")]
    UserLocked,

    #[error("user is not a participant of this conversation")]
    NotParticipant,

    #[error("only the original sender may recall a message")]
    NotSender,

    #[error("a conversation requires two distinct participants")]
    InvalidParticipants,

    #[error("message has already been recalled")]
    AlreadyRecalled,

    #[error("recall window has expired")]
    RecallWindowExpired,

    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 终态错误：重试同一请求不可能成功。
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InvalidArgument { .. })
    }
}

/// 领域结果类型。
pub type DomainResult<T> = Result<T, DomainError>;

/// 存储层错误，业务含义由上层按上下文补全。
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("resource not found")]
    NotFound,

    #[error("resource already exists")]
    Conflict,

    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
