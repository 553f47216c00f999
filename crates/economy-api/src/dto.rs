//! 请求与响应 DTO
//!
//! 响应体直接承载引擎的领域模型，字段名与模型保持一致（snake_case）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use economy_engine::{AnswerInput, ConsentMetadata, Difficulty, RankedAttempt};

use crate::error::ApiError;

/// API 统一响应
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }
}

/// 学习模式答题
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    #[validate(range(min = 1, max = 5, message = "难度必须在 1-5 之间"))]
    pub difficulty: i32,
    #[serde(default)]
    #[validate(range(max = 100, message = "提示次数过大"))]
    pub hints_used: u32,
    pub elapsed_ms: u64,
    pub correct: bool,
}

impl RecordAnswerRequest {
    pub fn into_input(self) -> Result<AnswerInput, ApiError> {
        self.validate()?;
        Ok(AnswerInput {
            difficulty: Difficulty::new(self.difficulty)?,
            hints_used: self.hints_used,
            elapsed_ms: self.elapsed_ms,
            correct: self.correct,
        })
    }
}

/// 排位赛答题
#[derive(Debug, Deserialize, Validate)]
pub struct RankedAttemptRequest {
    #[validate(range(min = 1, max = 5, message = "难度必须在 1-5 之间"))]
    pub difficulty: i32,
    #[serde(default)]
    #[validate(range(max = 100, message = "提示次数过大"))]
    pub hints_used: u32,
    pub elapsed_ms: u64,
    pub correct: bool,
}

impl RankedAttemptRequest {
    pub fn into_attempt(self) -> Result<RankedAttempt, ApiError> {
        self.validate()?;
        Ok(RankedAttempt {
            difficulty: Difficulty::new(self.difficulty)?,
            elapsed_ms: self.elapsed_ms,
            hints_used: self.hints_used,
            correct: self.correct,
        })
    }
}

/// 购买同意信息
#[derive(Debug, Deserialize, Validate)]
pub struct ConsentRequest {
    #[validate(length(min = 1, max = 64, message = "条款版本长度必须在1-64个字符之间"))]
    pub terms_version: String,
    pub waived_withdrawal_right: bool,
    /// 客户端未提供时取服务端时间
    pub accepted_at: Option<DateTime<Utc>>,
}

impl ConsentRequest {
    pub fn into_metadata(self, now: DateTime<Utc>) -> ConsentMetadata {
        ConsentMetadata {
            terms_version: self.terms_version,
            waived_withdrawal_right: self.waived_withdrawal_right,
            accepted_at: self.accepted_at.unwrap_or(now),
        }
    }
}

/// 发起购买
#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePurchaseRequest {
    #[validate(length(min = 1, max = 64, message = "提示包标识长度必须在1-64个字符之间"))]
    pub pack_key: String,
    #[validate(nested)]
    pub consent: Option<ConsentRequest>,
}

/// 运营补发提示
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreditRequest {
    #[validate(length(min = 1, max = 128, message = "用户 ID 长度必须在1-128个字符之间"))]
    pub user_id: String,
    #[validate(range(min = 1, max = 100000, message = "补发数量必须在 1-100000 之间"))]
    pub amount: i64,
    #[validate(length(max = 255, message = "引用长度不能超过255个字符"))]
    pub reference: Option<String>,
}

/// 列表查询参数
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    pub fn limit_or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_request_rejects_bad_difficulty() {
        let req = RecordAnswerRequest {
            difficulty: 6,
            hints_used: 0,
            elapsed_ms: 1_000,
            correct: true,
        };
        assert!(matches!(req.into_input(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_consent_defaults_accepted_at() {
        let now = Utc::now();
        let consent = ConsentRequest {
            terms_version: "2026-01".to_string(),
            waived_withdrawal_right: true,
            accepted_at: None,
        }
        .into_metadata(now);
        assert_eq!(consent.accepted_at, now);
    }

    #[test]
    fn test_admin_credit_amount_must_be_positive() {
        let req = AdminCreditRequest {
            user_id: "u1".to_string(),
            amount: 0,
            reference: None,
        };
        assert!(req.validate().is_err());
    }
}
