//! 购买记录仓储
//!
//! 支付回调的幂等性由 `payment_session_id` 唯一约束加行锁保证：
//! 同一会话的并发回调在 `FOR UPDATE` 处串行化，只有第一个看到 pending 状态。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::warn;

use super::traits::PurchaseRepositoryTrait;
use super::unique_violation_as_conflict;
use super::wallet_repo::WalletRepository;
use crate::error::Result;
use crate::models::{
    CreditSource, FailureOutcome, FulfillmentOutcome, Purchase, PurchaseMetadata, PurchaseStatus,
};

const PURCHASE_COLUMNS: &str = r#"
    id, user_id, payment_session_id, pack_key, quantity, amount, currency, status,
    consent, completed_at, created_at, updated_at
"#;

pub struct PurchaseRepository {
    pool: PgPool,
}

impl PurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_in_tx(
        tx: &mut PgConnection,
        payment_session_id: &str,
    ) -> Result<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE payment_session_id = $1 FOR UPDATE"
        ))
        .bind(payment_session_id)
        .fetch_optional(tx)
        .await?;

        Ok(purchase)
    }

    async fn update_status_in_tx(tx: &mut PgConnection, purchase: &Purchase) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE purchases
            SET status = $2, completed_at = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(purchase.id)
        .bind(purchase.status)
        .bind(purchase.completed_at)
        .bind(purchase.updated_at)
        .execute(tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PurchaseRepositoryTrait for PurchaseRepository {
    async fn create_pending(&self, purchase: &Purchase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO purchases
                (id, user_id, payment_session_id, pack_key, quantity, amount, currency, status,
                 consent, completed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(purchase.id)
        .bind(&purchase.user_id)
        .bind(&purchase.payment_session_id)
        .bind(&purchase.pack_key)
        .bind(purchase.quantity)
        .bind(purchase.amount)
        .bind(&purchase.currency)
        .bind(purchase.status)
        .bind(&purchase.consent)
        .bind(purchase.completed_at)
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unique_violation_as_conflict)?;

        Ok(())
    }

    async fn get_by_session_id(&self, payment_session_id: &str) -> Result<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE payment_session_id = $1"
        ))
        .bind(payment_session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(purchase)
    }

    async fn fulfill(
        &self,
        payment_session_id: &str,
        metadata: &PurchaseMetadata,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<FulfillmentOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(mut purchase) = Self::lock_in_tx(&mut tx, payment_session_id).await? else {
            return Ok(FulfillmentOutcome::UnknownPurchase);
        };

        match purchase.status {
            PurchaseStatus::Succeeded => return Ok(FulfillmentOutcome::AlreadySucceeded(purchase)),
            PurchaseStatus::Failed => {
                warn!(payment_session_id, "购买已失败，忽略成功回调");
                return Ok(FulfillmentOutcome::AlreadyFailed(purchase));
            }
            PurchaseStatus::Pending => {}
        }

        purchase.check_metadata(metadata)?;
        purchase.mark_succeeded(now);
        Self::update_status_in_tx(&mut tx, &purchase).await?;

        let source = CreditSource::Purchase {
            payment_session_id: purchase.payment_session_id.clone(),
        };
        let wallet = WalletRepository::credit_in_tx(
            &mut tx,
            &purchase.user_id,
            purchase.quantity,
            &source,
            today,
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(FulfillmentOutcome::Credited {
            purchase,
            balance_after: wallet.balance,
        })
    }

    async fn mark_failed(
        &self,
        payment_session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(mut purchase) = Self::lock_in_tx(&mut tx, payment_session_id).await? else {
            return Ok(FailureOutcome::UnknownPurchase);
        };
        if purchase.status.is_terminal() {
            return Ok(FailureOutcome::AlreadyTerminal(purchase));
        }

        purchase.mark_failed(now);
        Self::update_status_in_tx(&mut tx, &purchase).await?;

        tx.commit().await?;
        Ok(FailureOutcome::MarkedFailed(purchase))
    }
}
