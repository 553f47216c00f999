//! 钱包服务
//!
//! 钱包对已认证用户视为永远存在：读写时发现缺失就自动开户，WalletNotFound 不会返回给调用方。

use std::sync::Arc;

use tracing::{debug, info, instrument};

use quiz_shared::observability::metrics as app_metrics;

use crate::clock::{Clock, LocalCalendar};
use crate::error::{EconomyError, Result};
use crate::models::{CreditSource, HintUsage, Wallet, WalletLedgerEntry, WalletSummary};
use crate::repository::WalletRepositoryTrait;

/// 流水查询单次上限
pub const MAX_HISTORY_LIMIT: i64 = 100;

pub struct WalletService {
    repo: Arc<dyn WalletRepositoryTrait>,
    clock: Arc<dyn Clock>,
    calendar: LocalCalendar,
    daily_free_limit: i32,
}

impl WalletService {
    pub fn new(
        repo: Arc<dyn WalletRepositoryTrait>,
        clock: Arc<dyn Clock>,
        calendar: LocalCalendar,
        daily_free_limit: i32,
    ) -> Self {
        Self {
            repo,
            clock,
            calendar,
            daily_free_limit: daily_free_limit.max(0),
        }
    }

    async fn load_or_provision(&self, user_id: &str) -> Result<Wallet> {
        if let Some(wallet) = self.repo.get_wallet(user_id).await? {
            return Ok(wallet);
        }
        let now = self.clock.now();
        info!(user_id, "钱包不存在，自动开户");
        self.repo
            .provision_wallet(user_id, self.calendar.date_of(now), now)
            .await
    }

    /// 查询钱包，跨天时免费额度按已恢复展示
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_wallet(&self, user_id: &str) -> Result<WalletSummary> {
        let wallet = self.load_or_provision(user_id).await?;
        let today = self.calendar.date_of(self.clock.now());
        Ok(WalletSummary::from_wallet(
            &wallet.as_of(today),
            self.daily_free_limit,
        ))
    }

    /// 使用一次提示：先免费额度后付费余额
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn use_hint(&self, user_id: &str) -> Result<HintUsage> {
        let now = self.clock.now();
        let today = self.calendar.date_of(now);

        let debit = match self
            .repo
            .debit_hint(user_id, today, self.daily_free_limit, now)
            .await
        {
            Err(EconomyError::WalletNotFound(_)) => {
                self.repo.provision_wallet(user_id, today, now).await?;
                self.repo
                    .debit_hint(user_id, today, self.daily_free_limit, now)
                    .await?
            }
            other => other?,
        };

        if debit.reset_applied {
            debug!(user_id, %today, "免费额度已跨天重置");
        }
        app_metrics::record_hint_used(debit.source.as_str());

        Ok(HintUsage {
            source: debit.source,
            wallet: WalletSummary::from_wallet(&debit.wallet, self.daily_free_limit),
        })
    }

    /// 入账，数量必须为正
    #[instrument(skip(self, source), fields(user_id = %user_id))]
    pub async fn credit_wallet(
        &self,
        user_id: &str,
        amount: i64,
        source: CreditSource,
    ) -> Result<WalletSummary> {
        if amount <= 0 {
            return Err(EconomyError::Validation(format!(
                "入账数量必须为正: {}",
                amount
            )));
        }
        let now = self.clock.now();
        let today = self.calendar.date_of(now);

        let wallet = self
            .repo
            .credit(user_id, amount, &source, today, now)
            .await?;

        app_metrics::record_wallet_credit(source.metric_label(), amount);
        info!(user_id, amount, balance = wallet.balance, "钱包入账完成");

        Ok(WalletSummary::from_wallet(
            &wallet.as_of(today),
            self.daily_free_limit,
        ))
    }

    /// 最近的钱包流水
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_history(&self, user_id: &str, limit: i64) -> Result<Vec<WalletLedgerEntry>> {
        self.repo
            .list_ledger(user_id, limit.clamp(1, MAX_HISTORY_LIMIT))
            .await
    }
}
