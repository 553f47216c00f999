//! 购买记录模型
//!
//! 支付会话 ID 全局唯一，是支付回调的幂等键。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::enums::PurchaseStatus;
use crate::error::{EconomyError, Result};

/// 购买时记录的同意信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentMetadata {
    pub terms_version: String,
    /// 是否放弃数字内容的撤回权
    pub waived_withdrawal_right: bool,
    pub accepted_at: DateTime<Utc>,
}

/// 购买记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: String,
    pub payment_session_id: String,
    pub pack_key: String,
    /// 到账的提示数量
    pub quantity: i64,
    /// 金额（最小货币单位）
    pub amount: i64,
    pub currency: String,
    pub status: PurchaseStatus,
    pub consent: Option<Json<ConsentMetadata>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 回调中回传的下单元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseMetadata {
    pub user_id: String,
    pub pack_key: String,
    pub quantity: i64,
}

impl Purchase {
    /// 创建待支付记录
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        user_id: impl Into<String>,
        payment_session_id: impl Into<String>,
        pack_key: impl Into<String>,
        quantity: i64,
        amount: i64,
        currency: impl Into<String>,
        consent: Option<ConsentMetadata>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let payment_session_id = payment_session_id.into();
        if payment_session_id.trim().is_empty() {
            return Err(EconomyError::Validation(
                "payment_session_id 不能为空".to_string(),
            ));
        }
        if quantity <= 0 {
            return Err(EconomyError::Validation(format!(
                "提示包数量必须为正: {}",
                quantity
            )));
        }
        if amount < 0 {
            return Err(EconomyError::Validation(format!("金额不能为负: {}", amount)));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            payment_session_id,
            pack_key: pack_key.into(),
            quantity,
            amount,
            currency: currency.into(),
            status: PurchaseStatus::Pending,
            consent: consent.map(Json),
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[cfg(test)]
    pub fn metadata(&self) -> PurchaseMetadata {
        PurchaseMetadata {
            user_id: self.user_id.clone(),
            pack_key: self.pack_key.clone(),
            quantity: self.quantity,
        }
    }

    /// 校验回调回传的元数据与本地记录一致，数量以本地记录为准
    pub fn check_metadata(&self, metadata: &PurchaseMetadata) -> Result<()> {
        let field = if metadata.user_id != self.user_id {
            "user_id"
        } else if metadata.pack_key != self.pack_key {
            "pack_key"
        } else if metadata.quantity != self.quantity {
            "quantity"
        } else {
            return Ok(());
        };
        Err(EconomyError::PaymentEventMismatch {
            payment_session_id: self.payment_session_id.clone(),
            field,
        })
    }

    pub fn mark_succeeded(&mut self, now: DateTime<Utc>) {
        self.status = PurchaseStatus::Succeeded;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = PurchaseStatus::Failed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

/// 支付成功回调的落账结果
#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentOutcome {
    /// 本次回调完成了入账
    Credited { purchase: Purchase, balance_after: i64 },
    /// 已入账过，幂等命中
    AlreadySucceeded(Purchase),
    /// 购买已失败，不再入账
    AlreadyFailed(Purchase),
    /// 不是本系统创建的支付会话
    UnknownPurchase,
}

/// 支付失败回调的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    MarkedFailed(Purchase),
    /// 已处于终态，不回退
    AlreadyTerminal(Purchase),
    UnknownPurchase,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Purchase {
        Purchase::new_pending("u1", "cs_1", "hints_50", 50, 799, "usd", None, Utc::now()).unwrap()
    }

    #[test]
    fn test_new_pending_validation() {
        let now = Utc::now();
        assert!(Purchase::new_pending("u", "", "hints_50", 50, 799, "usd", None, now).is_err());
        assert!(Purchase::new_pending("u", "cs", "hints_50", 0, 799, "usd", None, now).is_err());
        assert!(Purchase::new_pending("u", "cs", "hints_50", 50, -1, "usd", None, now).is_err());

        let p = pending();
        assert_eq!(p.status, PurchaseStatus::Pending);
        assert!(p.completed_at.is_none());
    }

    #[test]
    fn test_check_metadata() {
        let p = pending();
        assert!(p.check_metadata(&p.metadata()).is_ok());

        let mut forged = p.metadata();
        forged.quantity = 5_000;
        assert!(matches!(
            p.check_metadata(&forged),
            Err(EconomyError::PaymentEventMismatch { field: "quantity", .. })
        ));

        let mut other_user = p.metadata();
        other_user.user_id = "u2".to_string();
        assert!(matches!(
            p.check_metadata(&other_user),
            Err(EconomyError::PaymentEventMismatch { field: "user_id", .. })
        ));
    }

    #[test]
    fn test_status_transitions() {
        let now = Utc::now();
        let mut p = pending();
        p.mark_succeeded(now);
        assert_eq!(p.status, PurchaseStatus::Succeeded);
        assert_eq!(p.completed_at, Some(now));

        let mut f = pending();
        f.mark_failed(now);
        assert!(f.status.is_terminal());
    }

    #[test]
    fn test_consent_serialization() {
        let consent = ConsentMetadata {
            terms_version: "2026-01".to_string(),
            waived_withdrawal_right: true,
            accepted_at: Utc::now(),
        };
        let p = Purchase::new_pending(
            "u1",
            "cs_2",
            "hints_10",
            10,
            199,
            "usd",
            Some(consent.clone()),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(p.consent.as_ref().map(|c| &c.0), Some(&consent));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["consent"]["terms_version"], "2026-01");
    }
}
