//! 应用错误到 HTTP 响应的映射。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use application::ApplicationError;
use domain::{DomainError, RepositoryError};

pub struct ApiError(ApplicationError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ApplicationError> for ApiError {
    fn from(err: ApplicationError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            ApplicationError::Domain(err) => match err {
                DomainError::ConversationNotFound => {
                    (StatusCode::NOT_FOUND, "CONVERSATION_NOT_FOUND")
                }
                DomainError::MessageNotFound => (StatusCode::NOT_FOUND, "MESSAGE_NOT_FOUND"),
                DomainError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
                DomainError::UserLocked => (StatusCode::FORBIDDEN, "USER_LOCKED"),
                DomainError::NotParticipant => (StatusCode::FORBIDDEN, "NOT_PARTICIPANT"),
                DomainError::NotSender => (StatusCode::FORBIDDEN, "NOT_SENDER"),
                DomainError::InvalidParticipants => {
                    (StatusCode::BAD_REQUEST, "INVALID_PARTICIPANTS")
                }
                DomainError::InvalidArgument { .. } => {
                    (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT")
                }
                DomainError::AlreadyRecalled => (StatusCode::CONFLICT, "ALREADY_RECALLED"),
                DomainError::RecallWindowExpired => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "RECALL_WINDOW_EXPIRED")
                }
            },
            ApplicationError::Repository(err) => match err {
                RepositoryError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                RepositoryError::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
                RepositoryError::Storage { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
                }
            },
            ApplicationError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        // 内部错误细节不回给客户端
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "请求处理失败");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(json!({ "code": code, "message": message }))).into_response()
    }
}
