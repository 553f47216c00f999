//! 排位赛服务
//!
//! ## 排行榜策略
//!
//! - 每个用户一条，按终身累计排位分排名
//! - 同分时先达到该分数者在前，再按用户 ID 升序
//! - 榜单读缓存按 limit 分键，任一会话结算后整体失效

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use quiz_shared::cache::TtlCache;
use quiz_shared::observability::metrics as app_metrics;

use crate::clock::Clock;
use crate::error::{EconomyError, Result};
use crate::models::{
    AttemptOutcome, LeaderboardEntry, RankedAttempt, RankedLeaderboardEntry, RankedSession,
    SessionSummary, number_entries,
};
use crate::repository::RankedRepositoryTrait;

pub type LeaderboardCache = TtlCache<i64, Vec<LeaderboardEntry>>;

pub struct RankedService {
    repo: Arc<dyn RankedRepositoryTrait>,
    clock: Arc<dyn Clock>,
    leaderboard_cache: Arc<LeaderboardCache>,
    max_limit: i64,
}

impl RankedService {
    pub fn new(
        repo: Arc<dyn RankedRepositoryTrait>,
        clock: Arc<dyn Clock>,
        leaderboard_cache: Arc<LeaderboardCache>,
        max_limit: i64,
    ) -> Self {
        Self {
            repo,
            clock,
            leaderboard_cache,
            max_limit: max_limit.max(1),
        }
    }

    /// 开始新会话，旧的活跃会话会被强制结算
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn start_session(&self, user_id: &str) -> Result<RankedSession> {
        let started = self.repo.start_session(user_id, self.clock.now()).await?;

        if !started.force_closed.is_empty() {
            warn!(
                user_id,
                closed = ?started.force_closed,
                "强制结束未关闭的排位赛会话"
            );
            for _ in &started.force_closed {
                app_metrics::record_ranked_session("force_closed");
            }
            self.leaderboard_cache.clear();
        }
        app_metrics::record_ranked_session("started");
        info!(
            user_id,
            session_id = %started.session.id,
            starting_score = started.session.starting_score,
            "排位赛会话已开始"
        );

        Ok(started.session)
    }

    #[instrument(skip(self, attempt), fields(user_id = %user_id, session_id = %session_id))]
    pub async fn record_attempt(
        &self,
        session_id: Uuid,
        user_id: &str,
        attempt: RankedAttempt,
    ) -> Result<AttemptOutcome> {
        self.repo
            .record_attempt(session_id, user_id, &attempt, self.clock.now())
            .await
    }

    /// 结束会话并返回结算结果（含结算后名次）
    #[instrument(skip(self), fields(user_id = %user_id, session_id = %session_id))]
    pub async fn end_session(&self, session_id: Uuid, user_id: &str) -> Result<SessionSummary> {
        let settlement = self
            .repo
            .end_session(session_id, user_id, self.clock.now())
            .await?;
        self.leaderboard_cache.clear();
        app_metrics::record_ranked_session("ended");

        let rank = self.repo.count_ahead(&settlement.entry).await? + 1;
        info!(
            user_id,
            final_score = settlement.session.total_score,
            rank,
            "排位赛会话已结算"
        );

        Ok(SessionSummary::new(&settlement.session, Some(rank)))
    }

    /// 查询会话，他人的会话按不存在处理
    pub async fn get_session(&self, session_id: Uuid, user_id: &str) -> Result<RankedSession> {
        match self.repo.get_session(session_id).await? {
            Some(session) if session.user_id == user_id => Ok(session),
            _ => Err(EconomyError::InvalidSession(session_id)),
        }
    }

    /// 排行榜前 limit 名，limit 限制在 1..=max_limit
    #[instrument(skip(self))]
    pub async fn get_leaderboard(&self, limit: i64) -> Result<Vec<RankedLeaderboardEntry>> {
        let limit = self.clamp_limit(limit);
        let entries = self
            .leaderboard_cache
            .get_or_try_insert_with(limit, || self.repo.top_entries(limit))
            .await?;
        Ok(number_entries(entries))
    }

    /// 用户自己的名次，与榜单使用同一排序
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user_rank(&self, user_id: &str) -> Result<Option<RankedLeaderboardEntry>> {
        let Some(entry) = self.repo.get_entry(user_id).await? else {
            return Ok(None);
        };
        let rank = self.repo.count_ahead(&entry).await? + 1;
        Ok(Some(RankedLeaderboardEntry { rank, entry }))
    }

    fn clamp_limit(&self, limit: i64) -> i64 {
        limit.clamp(1, self.max_limit)
    }
}
