//! 仓储 Trait 定义
//!
//! 每个方法对应一个原子单元：要么全部生效，要么全部不生效。
//! PostgreSQL 实现用事务和行锁保证，内存实现用单把互斥锁保证。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AttemptOutcome, CreditSource, FailureOutcome, FulfillmentOutcome, HintDebit, LeaderboardEntry,
    MilestoneLadder, Purchase, PurchaseMetadata, RankedAttempt, RankedSession, StreakCheck,
    StreakMilestone, StreakPolicy, UserProgress, Wallet, WalletLedgerEntry, XpAward, XpMilestone,
};

/// 新开排位赛会话的结果
#[derive(Debug, Clone, PartialEq)]
pub struct StartedSession {
    pub session: RankedSession,
    /// 被强制关闭并结算的旧会话
    pub force_closed: Vec<Uuid>,
}

/// 结束排位赛会话的结果
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettlement {
    pub session: RankedSession,
    pub entry: LeaderboardEntry,
}

/// 钱包仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletRepositoryTrait: Send + Sync {
    async fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>>;

    /// 不存在则创建，已存在直接返回
    async fn provision_wallet(
        &self,
        user_id: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Wallet>;

    /// 原子入账并写流水，钱包不存在时一并创建
    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        source: &CreditSource,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Wallet>;

    /// 原子扣一次提示（含跨天重置）并写流水；钱包不存在时返回 WalletNotFound
    async fn debit_hint(
        &self,
        user_id: &str,
        today: NaiveDate,
        daily_free_limit: i32,
        now: DateTime<Utc>,
    ) -> Result<HintDebit>;

    /// 最近的流水，按时间倒序
    async fn list_ledger(&self, user_id: &str, limit: i64) -> Result<Vec<WalletLedgerEntry>>;
}

/// 用户进度仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressRepositoryTrait: Send + Sync {
    async fn get_progress(&self, user_id: &str) -> Result<Option<UserProgress>>;

    /// 锁定进度行，推进连续打卡并发放里程碑
    async fn check_streak(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        policy: &StreakPolicy,
        ladder: &MilestoneLadder<StreakMilestone>,
    ) -> Result<StreakCheck>;

    /// 锁定进度行，按当前加成发放经验值并检查经验值里程碑
    async fn award_xp(
        &self,
        user_id: &str,
        base_xp: i64,
        now: DateTime<Utc>,
        ladder: &MilestoneLadder<XpMilestone>,
    ) -> Result<XpAward>;
}

/// 里程碑配置仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MilestoneRepositoryTrait: Send + Sync {
    async fn list_streak_milestones(&self) -> Result<Vec<StreakMilestone>>;
    async fn list_xp_milestones(&self) -> Result<Vec<XpMilestone>>;
}

/// 排位赛仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RankedRepositoryTrait: Send + Sync {
    /// 强制关闭并结算旧会话，再以最新终身累计分开新会话
    async fn start_session(&self, user_id: &str, now: DateTime<Utc>) -> Result<StartedSession>;

    async fn record_attempt(
        &self,
        session_id: Uuid,
        user_id: &str,
        attempt: &RankedAttempt,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome>;

    /// 关闭会话、并入终身累计、更新排行榜
    async fn end_session(
        &self,
        session_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionSettlement>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<RankedSession>>;

    async fn active_session_count(&self, user_id: &str) -> Result<i64>;

    /// 按排行榜顺序取前 limit 名
    async fn top_entries(&self, limit: i64) -> Result<Vec<LeaderboardEntry>>;

    async fn get_entry(&self, user_id: &str) -> Result<Option<LeaderboardEntry>>;

    /// 严格排在 entry 之前的条目数
    async fn count_ahead(&self, entry: &LeaderboardEntry) -> Result<i64>;
}

/// 购买仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PurchaseRepositoryTrait: Send + Sync {
    async fn create_pending(&self, purchase: &Purchase) -> Result<()>;

    async fn get_by_session_id(&self, payment_session_id: &str) -> Result<Option<Purchase>>;

    /// 锁定购买记录；待支付时标记成功并入账，二者同一事务
    async fn fulfill(
        &self,
        payment_session_id: &str,
        metadata: &PurchaseMetadata,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<FulfillmentOutcome>;

    /// 待支付时标记失败，终态不回退
    async fn mark_failed(
        &self,
        payment_session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome>;
}
