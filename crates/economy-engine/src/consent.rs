//! 同意记录
//!
//! 下单时把用户对条款和撤回权的确认交给 `ConsentLogger`。
//! 记录失败只打日志，不影响下单。

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::ConsentMetadata;

/// 同意记录器
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsentLogger: Send + Sync {
    async fn log_purchase_consent(
        &self,
        user_id: &str,
        purchase_id: Uuid,
        consent: &ConsentMetadata,
    ) -> Result<()>;
}

/// 写入 consent_logs 表
pub struct PgConsentLogger {
    pool: PgPool,
}

impl PgConsentLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConsentLogger for PgConsentLogger {
    async fn log_purchase_consent(
        &self,
        user_id: &str,
        purchase_id: Uuid,
        consent: &ConsentMetadata,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consent_logs
                (user_id, purchase_id, consent_type, terms_version, waived_withdrawal_right, accepted_at)
            VALUES ($1, $2, 'DIGITAL_PURCHASE', $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(purchase_id)
        .bind(&consent.terms_version)
        .bind(consent.waived_withdrawal_right)
        .bind(consent.accepted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
