//! API 错误类型
//!
//! 把引擎错误映射为 HTTP 状态码和统一响应体 `{success, code, message, data}`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use economy_engine::EconomyError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("未授权: {0}")]
    Unauthorized(String),
    #[error("禁止访问: {0}")]
    Forbidden(String),
    #[error("参数验证失败: {0}")]
    Validation(String),
    #[error("资源不存在: {0}")]
    NotFound(String),
    #[error(transparent)]
    Engine(#[from] EconomyError),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Engine(err) => engine_status(err),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Engine(err) => err.error_code(),
        }
    }
}

fn engine_status(err: &EconomyError) -> StatusCode {
    match err {
        EconomyError::InsufficientBalance(_)
        | EconomyError::SessionNotActive(_)
        | EconomyError::ConcurrencyConflict => StatusCode::CONFLICT,

        EconomyError::InvalidSession(_)
        | EconomyError::Validation(_)
        | EconomyError::InvalidDifficulty(_)
        | EconomyError::InvalidPackKey(_)
        | EconomyError::InvalidPaymentEvent(_)
        | EconomyError::PaymentEventMismatch { .. }
        | EconomyError::SignatureVerificationFailed(_) => StatusCode::BAD_REQUEST,

        EconomyError::PurchaseNotFound(_) => StatusCode::NOT_FOUND,
        EconomyError::PaymentProcessor(_) => StatusCode::BAD_GATEWAY,

        EconomyError::WalletNotFound(_)
        | EconomyError::Database(_)
        | EconomyError::Serialization(_)
        | EconomyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详情进日志
        let message = if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "请求处理失败");
            "服务内部错误，请稍后重试".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
