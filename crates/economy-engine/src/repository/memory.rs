//! 内存存储
//!
//! 单把互斥锁覆盖全部状态，每个仓储方法在锁内一次完成，
//! 原子性与 PostgreSQL 实现的单事务一致。用于测试和本地运行。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::traits::{
    MilestoneRepositoryTrait, ProgressRepositoryTrait, PurchaseRepositoryTrait,
    RankedRepositoryTrait, SessionSettlement, StartedSession, WalletRepositoryTrait,
};
use crate::consent::ConsentLogger;
use crate::error::{EconomyError, Result};
use crate::models::{
    AttemptOutcome, ConsentMetadata, CreditSource, FailureOutcome, FulfillmentOutcome, HintDebit,
    LeaderboardEntry, LedgerChangeType, MilestoneLadder, Purchase, PurchaseMetadata,
    PurchaseStatus, RankedAttempt, RankedSession, StreakCheck, StreakMilestone, StreakPolicy,
    UserProgress, Wallet, WalletLedgerEntry, XpAward, XpMilestone, settle_session,
};

/// 一条同意记录
#[derive(Debug, Clone, PartialEq)]
pub struct ConsentRecord {
    pub user_id: String,
    pub purchase_id: Uuid,
    pub consent: ConsentMetadata,
}

#[derive(Default)]
struct MemoryState {
    wallets: HashMap<String, Wallet>,
    ledger: Vec<WalletLedgerEntry>,
    next_ledger_id: i64,
    progress: HashMap<String, UserProgress>,
    streak_milestones: Vec<StreakMilestone>,
    xp_milestones: Vec<XpMilestone>,
    sessions: HashMap<Uuid, RankedSession>,
    leaderboard: HashMap<String, LeaderboardEntry>,
    /// 以支付会话 ID 为键
    purchases: HashMap<String, Purchase>,
    consents: Vec<ConsentRecord>,
}

impl MemoryState {
    fn append_ledger(
        &mut self,
        user_id: &str,
        change_type: LedgerChangeType,
        quantity: i64,
        balance_after: i64,
        reference_id: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.next_ledger_id += 1;
        self.ledger.push(WalletLedgerEntry {
            id: self.next_ledger_id,
            user_id: user_id.to_string(),
            change_type,
            quantity,
            balance_after,
            reference_id,
            created_at: now,
        });
    }

    fn credit(
        &mut self,
        user_id: &str,
        amount: i64,
        source: &CreditSource,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Wallet> {
        let current = self
            .wallets
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Wallet::provision(user_id, today, now));
        let next = current.with_credit(amount, now)?;
        self.wallets.insert(user_id.to_string(), next.clone());
        self.append_ledger(
            user_id,
            source.change_type(),
            amount,
            next.balance,
            source.reference_id(),
            now,
        );
        Ok(next)
    }
}

/// 内存版存储，实现全部仓储 trait 及同意记录器
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置与数据库迁移相同的里程碑配置
    pub fn with_default_milestones() -> Self {
        let store = Self::new();
        store.set_streak_milestones(default_streak_milestones());
        store.set_xp_milestones(default_xp_milestones());
        store
    }

    pub fn set_streak_milestones(&self, rows: Vec<StreakMilestone>) {
        self.state.lock().streak_milestones = rows;
    }

    pub fn set_xp_milestones(&self, rows: Vec<XpMilestone>) {
        self.state.lock().xp_milestones = rows;
    }

    /// 已写入的同意记录
    pub fn consent_records(&self) -> Vec<ConsentRecord> {
        self.state.lock().consents.clone()
    }
}

pub fn default_streak_milestones() -> Vec<StreakMilestone> {
    [
        (1, 3, "连续 3 天：经验值 1.1 倍，持续 24 小时", 1.1, 24),
        (2, 7, "连续 7 天：经验值 1.5 倍，持续 48 小时", 1.5, 48),
        (3, 14, "连续 14 天：经验值 1.75 倍，持续 48 小时", 1.75, 48),
        (4, 30, "连续 30 天：经验值 2 倍，持续 72 小时", 2.0, 72),
    ]
    .into_iter()
    .map(
        |(id, days, reward, multiplier, hours)| StreakMilestone {
            id,
            days,
            reward_description: reward.to_string(),
            boost_multiplier: multiplier,
            boost_duration_hours: hours,
            is_active: true,
        },
    )
    .collect()
}

pub fn default_xp_milestones() -> Vec<XpMilestone> {
    [
        (1, 100, "累计 100 经验值：入门徽章", 1.0, 0),
        (2, 500, "累计 500 经验值：经验值 1.2 倍，持续 24 小时", 1.2, 24),
        (3, 1_000, "累计 1000 经验值：经验值 1.25 倍，持续 24 小时", 1.25, 24),
        (4, 5_000, "累计 5000 经验值：经验值 1.5 倍，持续 48 小时", 1.5, 48),
    ]
    .into_iter()
    .map(|(id, threshold, reward, multiplier, hours)| XpMilestone {
        id,
        xp_threshold: threshold,
        reward_description: reward.to_string(),
        boost_multiplier: multiplier,
        boost_duration_hours: hours,
        is_active: true,
    })
    .collect()
}

#[async_trait]
impl WalletRepositoryTrait for MemoryStore {
    async fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>> {
        Ok(self.state.lock().wallets.get(user_id).cloned())
    }

    async fn provision_wallet(
        &self,
        user_id: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Wallet> {
        let mut state = self.state.lock();
        let wallet = state
            .wallets
            .entry(user_id.to_string())
            .or_insert_with(|| Wallet::provision(user_id, today, now));
        Ok(wallet.clone())
    }

    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        source: &CreditSource,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Wallet> {
        self.state.lock().credit(user_id, amount, source, today, now)
    }

    async fn debit_hint(
        &self,
        user_id: &str,
        today: NaiveDate,
        daily_free_limit: i32,
        now: DateTime<Utc>,
    ) -> Result<HintDebit> {
        let mut state = self.state.lock();
        let wallet = state
            .wallets
            .get(user_id)
            .ok_or_else(|| EconomyError::WalletNotFound(user_id.to_string()))?;
        let debit = wallet.plan_hint_debit(today, daily_free_limit, now)?;
        state
            .wallets
            .insert(user_id.to_string(), debit.wallet.clone());
        state.append_ledger(
            user_id,
            debit.change_type(),
            1,
            debit.wallet.balance,
            None,
            now,
        );
        Ok(debit)
    }

    async fn list_ledger(&self, user_id: &str, limit: i64) -> Result<Vec<WalletLedgerEntry>> {
        let state = self.state.lock();
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(state
            .ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProgressRepositoryTrait for MemoryStore {
    async fn get_progress(&self, user_id: &str) -> Result<Option<UserProgress>> {
        Ok(self.state.lock().progress.get(user_id).cloned())
    }

    async fn check_streak(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        policy: &StreakPolicy,
        ladder: &MilestoneLadder<StreakMilestone>,
    ) -> Result<StreakCheck> {
        let mut state = self.state.lock();
        let progress = state
            .progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id, now));
        Ok(progress.check_streak(now, policy, ladder))
    }

    async fn award_xp(
        &self,
        user_id: &str,
        base_xp: i64,
        now: DateTime<Utc>,
        ladder: &MilestoneLadder<XpMilestone>,
    ) -> Result<XpAward> {
        let mut state = self.state.lock();
        let progress = state
            .progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id, now));
        Ok(progress.award_xp(base_xp, now, ladder))
    }
}

#[async_trait]
impl MilestoneRepositoryTrait for MemoryStore {
    async fn list_streak_milestones(&self) -> Result<Vec<StreakMilestone>> {
        Ok(self.state.lock().streak_milestones.clone())
    }

    async fn list_xp_milestones(&self) -> Result<Vec<XpMilestone>> {
        Ok(self.state.lock().xp_milestones.clone())
    }
}

#[async_trait]
impl RankedRepositoryTrait for MemoryStore {
    async fn start_session(&self, user_id: &str, now: DateTime<Utc>) -> Result<StartedSession> {
        let mut guard = self.state.lock();
        let MemoryState {
            progress,
            sessions,
            leaderboard,
            ..
        } = &mut *guard;

        let progress = progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id, now));

        let mut stale: Vec<&mut RankedSession> = sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.is_active)
            .collect();
        stale.sort_by_key(|s| s.started_at);

        let mut force_closed = Vec::with_capacity(stale.len());
        for session in stale {
            let entry = settle_session(session, progress, leaderboard.get(user_id), now);
            leaderboard.insert(user_id.to_string(), entry);
            force_closed.push(session.id);
        }

        let session = RankedSession::open(user_id, progress.ranked_total_score, now);
        sessions.insert(session.id, session.clone());

        Ok(StartedSession {
            session,
            force_closed,
        })
    }

    async fn record_attempt(
        &self,
        session_id: Uuid,
        user_id: &str,
        attempt: &RankedAttempt,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome> {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(EconomyError::InvalidSession(session_id))?;
        session.ensure_accepts_attempt(user_id)?;
        Ok(session.apply_attempt(attempt, now))
    }

    async fn end_session(
        &self,
        session_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionSettlement> {
        let mut guard = self.state.lock();
        let MemoryState {
            progress,
            sessions,
            leaderboard,
            ..
        } = &mut *guard;

        let session = sessions
            .get_mut(&session_id)
            .ok_or(EconomyError::InvalidSession(session_id))?;
        session.ensure_can_end(user_id)?;

        let progress = progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id, now));
        let entry = settle_session(session, progress, leaderboard.get(user_id), now);
        leaderboard.insert(user_id.to_string(), entry.clone());

        Ok(SessionSettlement {
            session: session.clone(),
            entry,
        })
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<RankedSession>> {
        Ok(self.state.lock().sessions.get(&session_id).cloned())
    }

    async fn active_session_count(&self, user_id: &str) -> Result<i64> {
        let state = self.state.lock();
        Ok(state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active)
            .count() as i64)
    }

    async fn top_entries(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let state = self.state.lock();
        let mut entries: Vec<LeaderboardEntry> = state.leaderboard.values().cloned().collect();
        entries.sort_by(|a, b| a.rank_cmp(b));
        entries.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(entries)
    }

    async fn get_entry(&self, user_id: &str) -> Result<Option<LeaderboardEntry>> {
        Ok(self.state.lock().leaderboard.get(user_id).cloned())
    }

    async fn count_ahead(&self, entry: &LeaderboardEntry) -> Result<i64> {
        let state = self.state.lock();
        Ok(state
            .leaderboard
            .values()
            .filter(|other| other.is_ranked_above(entry))
            .count() as i64)
    }
}

#[async_trait]
impl PurchaseRepositoryTrait for MemoryStore {
    async fn create_pending(&self, purchase: &Purchase) -> Result<()> {
        let mut state = self.state.lock();
        if state.purchases.contains_key(&purchase.payment_session_id) {
            return Err(EconomyError::ConcurrencyConflict);
        }
        state
            .purchases
            .insert(purchase.payment_session_id.clone(), purchase.clone());
        Ok(())
    }

    async fn get_by_session_id(&self, payment_session_id: &str) -> Result<Option<Purchase>> {
        Ok(self.state.lock().purchases.get(payment_session_id).cloned())
    }

    async fn fulfill(
        &self,
        payment_session_id: &str,
        metadata: &PurchaseMetadata,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<FulfillmentOutcome> {
        let mut state = self.state.lock();
        let Some(current) = state.purchases.get(payment_session_id).cloned() else {
            return Ok(FulfillmentOutcome::UnknownPurchase);
        };

        match current.status {
            PurchaseStatus::Succeeded => return Ok(FulfillmentOutcome::AlreadySucceeded(current)),
            PurchaseStatus::Failed => return Ok(FulfillmentOutcome::AlreadyFailed(current)),
            PurchaseStatus::Pending => {}
        }

        current.check_metadata(metadata)?;
        let mut purchase = current;
        let source = CreditSource::Purchase {
            payment_session_id: purchase.payment_session_id.clone(),
        };
        // 先入账再改状态，入账失败时购买仍是 pending
        let wallet = state.credit(&purchase.user_id, purchase.quantity, &source, today, now)?;
        purchase.mark_succeeded(now);
        state
            .purchases
            .insert(purchase.payment_session_id.clone(), purchase.clone());

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
        let mut state = self.state.lock();
        let Some(purchase) = state.purchases.get_mut(payment_session_id) else {
            return Ok(FailureOutcome::UnknownPurchase);
        };
        if purchase.status.is_terminal() {
            return Ok(FailureOutcome::AlreadyTerminal(purchase.clone()));
        }
        purchase.mark_failed(now);
        Ok(FailureOutcome::MarkedFailed(purchase.clone()))
    }
}

#[async_trait]
impl ConsentLogger for MemoryStore {
    async fn log_purchase_consent(
        &self,
        user_id: &str,
        purchase_id: Uuid,
        consent: &ConsentMetadata,
    ) -> Result<()> {
        self.state.lock().consents.push(ConsentRecord {
            user_id: user_id.to_string(),
            purchase_id,
            consent: consent.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn test_debit_requires_provisioned_wallet() {
        let store = MemoryStore::new();
        let err = store
            .debit_hint("u1", today(), 3, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EconomyError::WalletNotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_debit_leaves_no_ledger_row() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.provision_wallet("u1", today(), now).await.unwrap();
        for _ in 0..3 {
            store.debit_hint("u1", today(), 3, now).await.unwrap();
        }
        let err = store.debit_hint("u1", today(), 3, now).await.unwrap_err();
        assert!(matches!(err, EconomyError::InsufficientBalance(_)));
        assert_eq!(store.list_ledger("u1", 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_ledger_is_newest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let source = CreditSource::Manual { reference: None };
        store.credit("u1", 5, &source, today(), now).await.unwrap();
        store
            .credit("u1", 7, &source, today(), now + Duration::seconds(1))
            .await
            .unwrap();

        let ledger = store.list_ledger("u1", 1).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].quantity, 7);
        assert_eq!(ledger[0].balance_after, 12);
    }

    #[tokio::test]
    async fn test_duplicate_payment_session_rejected() {
        let store = MemoryStore::new();
        let purchase =
            Purchase::new_pending("u1", "cs_1", "hints_10", 10, 199, "usd", None, Utc::now())
                .unwrap();
        store.create_pending(&purchase).await.unwrap();
        let err = store.create_pending(&purchase).await.unwrap_err();
        assert!(matches!(err, EconomyError::ConcurrencyConflict));
    }

    #[tokio::test]
    async fn test_mark_failed_does_not_regress_success() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let purchase =
            Purchase::new_pending("u1", "cs_1", "hints_10", 10, 199, "usd", None, now).unwrap();
        store.create_pending(&purchase).await.unwrap();
        store
            .fulfill("cs_1", &purchase.metadata(), today(), now)
            .await
            .unwrap();

        let outcome = store.mark_failed("cs_1", now).await.unwrap();
        assert!(matches!(outcome, FailureOutcome::AlreadyTerminal(p) if p.status == PurchaseStatus::Succeeded));
    }
}
