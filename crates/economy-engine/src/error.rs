//! 经济引擎错误类型
//!
//! 定义业务错误和系统错误。重复的支付回调不是错误，由 `ReconcileOutcome::Duplicate` 表达。

use thiserror::Error;
use uuid::Uuid;

/// 经济引擎错误类型
#[derive(Debug, Error)]
pub enum EconomyError {
    // === 钱包相关错误 ===
    #[error("提示余额不足: user_id={0}")]
    InsufficientBalance(String),

    /// 仅在仓储层内部出现，服务层会自动开户后重试
    #[error("钱包不存在: user_id={0}")]
    WalletNotFound(String),

    // === 排位赛相关错误 ===
    #[error("无效的排位赛会话: session_id={0}")]
    InvalidSession(Uuid),

    #[error("排位赛会话已结束: session_id={0}")]
    SessionNotActive(Uuid),

    #[error("难度超出范围 1..=5: {0}")]
    InvalidDifficulty(i32),

    // === 购买相关错误 ===
    #[error("未知的提示包: {0}")]
    InvalidPackKey(String),

    #[error("支付回调签名校验失败: {0}")]
    SignatureVerificationFailed(String),

    #[error("无法解析的支付事件: {0}")]
    InvalidPaymentEvent(String),

    #[error("支付事件与购买记录不一致: payment_session_id={payment_session_id}, 字段={field}")]
    PaymentEventMismatch {
        payment_session_id: String,
        field: &'static str,
    },

    #[error("购买记录不存在: {0}")]
    PurchaseNotFound(String),

    #[error("支付服务调用失败: {0}")]
    PaymentProcessor(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("并发冲突，请重试")]
    ConcurrencyConflict,
}

/// 经济引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, EconomyError>;

impl EconomyError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::PaymentProcessor(_) | Self::ConcurrencyConflict
        )
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_)
                | Self::Serialization(_)
                | Self::Internal(_)
                | Self::PaymentProcessor(_)
                | Self::ConcurrencyConflict
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            Self::WalletNotFound(_) => "WALLET_NOT_FOUND",
            Self::InvalidSession(_) => "INVALID_SESSION",
            Self::SessionNotActive(_) => "SESSION_NOT_ACTIVE",
            Self::InvalidDifficulty(_) => "INVALID_DIFFICULTY",
            Self::InvalidPackKey(_) => "INVALID_PACK_KEY",
            Self::SignatureVerificationFailed(_) => "SIGNATURE_VERIFICATION_FAILED",
            Self::InvalidPaymentEvent(_) => "INVALID_PAYMENT_EVENT",
            Self::PaymentEventMismatch { .. } => "PAYMENT_EVENT_MISMATCH",
            Self::PurchaseNotFound(_) => "PURCHASE_NOT_FOUND",
            Self::PaymentProcessor(_) => "PAYMENT_PROCESSOR_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EconomyError::InsufficientBalance("user-1".to_string());
        assert_eq!(err.to_string(), "提示余额不足: user_id=user-1");

        let err = EconomyError::PaymentEventMismatch {
            payment_session_id: "cs_1".to_string(),
            field: "user_id",
        };
        assert!(err.to_string().contains("cs_1"));
        assert!(err.to_string().contains("user_id"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(EconomyError::ConcurrencyConflict.is_retryable());
        assert!(EconomyError::PaymentProcessor("timeout".to_string()).is_retryable());
        assert!(EconomyError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!EconomyError::InsufficientBalance("u".to_string()).is_retryable());
        assert!(!EconomyError::SignatureVerificationFailed("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_is_business_error() {
        assert!(EconomyError::InsufficientBalance("u".to_string()).is_business_error());
        assert!(EconomyError::InvalidSession(Uuid::nil()).is_business_error());
        assert!(EconomyError::InvalidPackKey("x".to_string()).is_business_error());
        assert!(!EconomyError::Internal("x".to_string()).is_business_error());
        assert!(!EconomyError::ConcurrencyConflict.is_business_error());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            EconomyError::InsufficientBalance("u".to_string()).error_code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(
            EconomyError::SessionNotActive(Uuid::nil()).error_code(),
            "SESSION_NOT_ACTIVE"
        );
        assert_eq!(EconomyError::InvalidDifficulty(9).error_code(), "INVALID_DIFFICULTY");
        assert_eq!(
            EconomyError::ConcurrencyConflict.error_code(),
            "CONCURRENCY_CONFLICT"
        );
    }
}
