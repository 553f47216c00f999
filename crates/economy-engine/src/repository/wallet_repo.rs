//! 钱包仓储
//!
//! 余额变动和流水写入在同一事务内完成，流水的 balance_after 与钱包行始终一致。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};

use super::traits::WalletRepositoryTrait;
use crate::error::{EconomyError, Result};
use crate::models::{CreditSource, HintDebit, LedgerChangeType, Wallet, WalletLedgerEntry};

const WALLET_COLUMNS: &str =
    "user_id, balance, free_used_today, last_reset_date, created_at, updated_at";

pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中入账：钱包不存在时以入账数量开户，存在时原子累加
    pub async fn credit_in_tx(
        tx: &mut PgConnection,
        user_id: &str,
        amount: i64,
        source: &CreditSource,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Wallet> {
        if amount <= 0 {
            return Err(EconomyError::Validation(format!(
                "入账数量必须为正: {}",
                amount
            )));
        }

        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            r#"
            INSERT INTO wallets (user_id, balance, free_used_today, last_reset_date, created_at, updated_at)
            VALUES ($1, $2, 0, $3, $4, $4)
            ON CONFLICT (user_id) DO UPDATE
                SET balance = wallets.balance + EXCLUDED.balance,
                    updated_at = EXCLUDED.updated_at
            RETURNING {WALLET_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(amount)
        .bind(today)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        Self::append_ledger_in_tx(
            tx,
            user_id,
            source.change_type(),
            amount,
            wallet.balance,
            source.reference_id().as_deref(),
            now,
        )
        .await?;

        Ok(wallet)
    }

    /// 在事务中写一条流水，返回流水 ID
    pub async fn append_ledger_in_tx(
        tx: &mut PgConnection,
        user_id: &str,
        change_type: LedgerChangeType,
        quantity: i64,
        balance_after: i64,
        reference_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO wallet_ledger (user_id, change_type, quantity, balance_after, reference_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(change_type)
        .bind(quantity)
        .bind(balance_after)
        .bind(reference_id)
        .bind(now)
        .fetch_one(tx)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl WalletRepositoryTrait for WalletRepository {
    async fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    async fn provision_wallet(
        &self,
        user_id: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Wallet> {
        let initial = Wallet::provision(user_id, today, now);
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, balance, free_used_today, last_reset_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(&initial.user_id)
        .bind(initial.balance)
        .bind(initial.free_used_today)
        .bind(initial.last_reset_date)
        .bind(initial.created_at)
        .bind(initial.updated_at)
        .execute(&self.pool)
        .await?;

        self.get_wallet(user_id)
            .await?
            .ok_or_else(|| EconomyError::WalletNotFound(user_id.to_string()))
    }

    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        source: &CreditSource,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Wallet> {
        let mut tx = self.pool.begin().await?;
        let wallet = Self::credit_in_tx(&mut tx, user_id, amount, source, today, now).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    async fn debit_hint(
        &self,
        user_id: &str,
        today: NaiveDate,
        daily_free_limit: i32,
        now: DateTime<Utc>,
    ) -> Result<HintDebit> {
        let mut tx = self.pool.begin().await?;

        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| EconomyError::WalletNotFound(user_id.to_string()))?;

        // 余额不足时直接返回，事务随 drop 回滚
        let debit = wallet.plan_hint_debit(today, daily_free_limit, now)?;

        sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $2, free_used_today = $3, last_reset_date = $4, updated_at = $5
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(debit.wallet.balance)
        .bind(debit.wallet.free_used_today)
        .bind(debit.wallet.last_reset_date)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Self::append_ledger_in_tx(
            &mut tx,
            user_id,
            debit.change_type(),
            1,
            debit.wallet.balance,
            None,
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(debit)
    }

    async fn list_ledger(&self, user_id: &str, limit: i64) -> Result<Vec<WalletLedgerEntry>> {
        let entries = sqlx::query_as::<_, WalletLedgerEntry>(
            r#"
            SELECT id, user_id, change_type, quantity, balance_after, reference_id, created_at
            FROM wallet_ledger
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
