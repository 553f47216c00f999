//! 钱包模型
//!
//! 钱包记录付费提示余额和当日免费额度使用量。
//! 所有状态变化先在这里算出结果，再由仓储层在同一事务内落库。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{HintSource, LedgerChangeType};
use crate::error::{EconomyError, Result};

/// 用户钱包
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wallet {
    pub user_id: String,
    /// 付费提示余额，永不为负
    pub balance: i64,
    /// 当日已用免费次数
    pub free_used_today: i32,
    /// 免费额度最近一次重置的本地日期
    pub last_reset_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 一次提示扣费的计算结果
#[derive(Debug, Clone, PartialEq)]
pub struct HintDebit {
    pub source: HintSource,
    /// 本次扣费前是否先做了跨天重置
    pub reset_applied: bool,
    /// 扣费后的钱包状态
    pub wallet: Wallet,
}

impl HintDebit {
    pub fn change_type(&self) -> LedgerChangeType {
        match self.source {
            HintSource::Free => LedgerChangeType::HintFree,
            HintSource::Paid => LedgerChangeType::HintPaid,
        }
    }
}

impl Wallet {
    /// 校验后构造钱包
    pub fn new(
        user_id: impl Into<String>,
        balance: i64,
        free_used_today: i32,
        last_reset_date: NaiveDate,
        daily_free_limit: i32,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(EconomyError::Validation("user_id 不能为空".to_string()));
        }
        if balance < 0 {
            return Err(EconomyError::Validation(format!(
                "钱包余额不能为负: {}",
                balance
            )));
        }
        if !(0..=daily_free_limit).contains(&free_used_today) {
            return Err(EconomyError::Validation(format!(
                "免费次数 {} 超出范围 0..={}",
                free_used_today, daily_free_limit
            )));
        }
        Ok(Self {
            user_id,
            balance,
            free_used_today,
            last_reset_date,
            created_at: now,
            updated_at: now,
        })
    }

    /// 新开钱包：余额 0，当日额度未使用
    pub fn provision(user_id: impl Into<String>, today: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            balance: 0,
            free_used_today: 0,
            last_reset_date: today,
            created_at: now,
            updated_at: now,
        }
    }

    /// 按日期比较：上次重置日期早于今天才需要重置
    pub fn needs_reset(&self, today: NaiveDate) -> bool {
        self.last_reset_date < today
    }

    /// 读路径使用的视图：跨天后免费额度显示为已恢复，但不落库
    pub fn as_of(&self, today: NaiveDate) -> Self {
        let mut view = self.clone();
        if view.needs_reset(today) {
            view.free_used_today = 0;
            view.last_reset_date = today;
        }
        view
    }

    /// 当日剩余免费次数（不考虑跨天重置）
    pub fn free_remaining(&self, daily_free_limit: i32) -> i32 {
        (daily_free_limit - self.free_used_today).max(0)
    }

    /// 计算一次提示扣费
    ///
    /// 顺序：先跨天重置，再扣免费额度，最后扣付费余额；都不够时返回余额不足。
    pub fn plan_hint_debit(
        &self,
        today: NaiveDate,
        daily_free_limit: i32,
        now: DateTime<Utc>,
    ) -> Result<HintDebit> {
        let reset_applied = self.needs_reset(today);
        let mut next = if reset_applied {
            self.as_of(today)
        } else {
            self.clone()
        };

        let source = if next.free_remaining(daily_free_limit) > 0 {
            next.free_used_today += 1;
            HintSource::Free
        } else if next.balance > 0 {
            next.balance -= 1;
            HintSource::Paid
        } else {
            return Err(EconomyError::InsufficientBalance(self.user_id.clone()));
        };

        next.updated_at = now;
        Ok(HintDebit {
            source,
            reset_applied,
            wallet: next,
        })
    }

    /// 入账后的钱包状态
    pub fn with_credit(&self, amount: i64, now: DateTime<Utc>) -> Result<Self> {
        if amount <= 0 {
            return Err(EconomyError::Validation(format!(
                "入账数量必须为正: {}",
                amount
            )));
        }
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| EconomyError::Validation("余额溢出".to_string()))?;
        Ok(Self {
            balance,
            updated_at: now,
            ..self.clone()
        })
    }
}

/// 入账来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditSource {
    /// 支付成功，引用支付会话 ID
    Purchase { payment_session_id: String },
    /// 运营补发，可带工单号等引用
    Manual { reference: Option<String> },
}

impl CreditSource {
    pub fn change_type(&self) -> LedgerChangeType {
        match self {
            Self::Purchase { .. } => LedgerChangeType::PurchaseCredit,
            Self::Manual { .. } => LedgerChangeType::ManualCredit,
        }
    }

    pub fn reference_id(&self) -> Option<String> {
        match self {
            Self::Purchase { payment_session_id } => Some(payment_session_id.clone()),
            Self::Manual { reference } => reference.clone(),
        }
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Purchase { .. } => "purchase",
            Self::Manual { .. } => "manual",
        }
    }
}

/// 钱包流水（审计记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WalletLedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub change_type: LedgerChangeType,
    /// 变动数量（免费额度消耗记为 1，余额不变）
    pub quantity: i64,
    /// 变动后的付费余额
    pub balance_after: i64,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 钱包对外展示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub user_id: String,
    pub balance: i64,
    pub free_used_today: i32,
    pub free_remaining: i32,
    pub daily_free_limit: i32,
    pub last_reset_date: NaiveDate,
}

impl WalletSummary {
    pub fn from_wallet(wallet: &Wallet, daily_free_limit: i32) -> Self {
        Self {
            user_id: wallet.user_id.clone(),
            balance: wallet.balance,
            free_used_today: wallet.free_used_today,
            free_remaining: wallet.free_remaining(daily_free_limit),
            daily_free_limit,
            last_reset_date: wallet.last_reset_date,
        }
    }
}

/// 使用提示的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintUsage {
    pub source: HintSource,
    pub wallet: WalletSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn wallet(balance: i64, free_used: i32, last_reset: NaiveDate) -> Wallet {
        Wallet::new("user-1", balance, free_used, last_reset, 3, Utc::now()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_state() {
        let now = Utc::now();
        assert!(Wallet::new("u", -1, 0, day(1), 3, now).is_err());
        assert!(Wallet::new("u", 0, 4, day(1), 3, now).is_err());
        assert!(Wallet::new("u", 0, -1, day(1), 3, now).is_err());
        assert!(Wallet::new(" ", 0, 0, day(1), 3, now).is_err());
        assert!(Wallet::new("u", 5, 3, day(1), 3, now).is_ok());
    }

    #[test]
    fn test_free_allowance_is_used_first() {
        let debit = wallet(10, 0, day(1))
            .plan_hint_debit(day(1), 3, Utc::now())
            .unwrap();
        assert_eq!(debit.source, HintSource::Free);
        assert_eq!(debit.wallet.balance, 10);
        assert_eq!(debit.wallet.free_used_today, 1);
        assert!(!debit.reset_applied);
        assert_eq!(debit.change_type(), LedgerChangeType::HintFree);
    }

    #[test]
    fn test_paid_balance_after_allowance_exhausted() {
        let debit = wallet(10, 3, day(1))
            .plan_hint_debit(day(1), 3, Utc::now())
            .unwrap();
        assert_eq!(debit.source, HintSource::Paid);
        assert_eq!(debit.wallet.balance, 9);
        assert_eq!(debit.wallet.free_used_today, 3);
    }

    #[test]
    fn test_insufficient_balance() {
        // 余额 0、已用 2、每日上限 2
        let w = Wallet::new("user-1", 0, 2, day(1), 2, Utc::now()).unwrap();
        let err = w.plan_hint_debit(day(1), 2, Utc::now()).unwrap_err();
        assert!(matches!(err, EconomyError::InsufficientBalance(_)));
    }

    #[test]
    fn test_reset_applies_before_debit_on_new_day() {
        let debit = wallet(0, 3, day(1))
            .plan_hint_debit(day(2), 3, Utc::now())
            .unwrap();
        assert!(debit.reset_applied);
        assert_eq!(debit.source, HintSource::Free);
        assert_eq!(debit.wallet.free_used_today, 1);
        assert_eq!(debit.wallet.last_reset_date, day(2));
    }

    #[test]
    fn test_reset_uses_calendar_date_not_elapsed_hours() {
        let w = wallet(0, 3, day(2));
        // 同一天内不重置
        assert!(!w.needs_reset(day(2)));
        assert!(w.needs_reset(day(3)));
        // 时钟回拨也不会重置
        assert!(!w.needs_reset(day(1)));
    }

    #[test]
    fn test_as_of_is_a_view() {
        let w = wallet(4, 3, day(1));
        let view = w.as_of(day(5));
        assert_eq!(view.free_used_today, 0);
        assert_eq!(view.balance, 4);
        assert_eq!(w.free_used_today, 3);
    }

    #[test]
    fn test_with_credit() {
        let w = wallet(4, 0, day(1));
        assert_eq!(w.with_credit(50, Utc::now()).unwrap().balance, 54);
        assert!(w.with_credit(0, Utc::now()).is_err());
        assert!(w.with_credit(-5, Utc::now()).is_err());
        assert!(wallet(i64::MAX, 0, day(1)).with_credit(1, Utc::now()).is_err());
    }

    #[test]
    fn test_credit_source() {
        let source = CreditSource::Purchase {
            payment_session_id: "cs_1".to_string(),
        };
        assert_eq!(source.change_type(), LedgerChangeType::PurchaseCredit);
        assert_eq!(source.reference_id().as_deref(), Some("cs_1"));
        assert_eq!(
            CreditSource::Manual { reference: None }.change_type(),
            LedgerChangeType::ManualCredit
        );
    }

    #[test]
    fn test_summary_free_remaining() {
        let summary = WalletSummary::from_wallet(&wallet(1, 2, day(1)), 3);
        assert_eq!(summary.free_remaining, 1);
        assert_eq!(summary.daily_free_limit, 3);
    }
}
