//! 答题进度服务
//!
//! 一次答题的完整流水线：先推进连续打卡（加成资格基于最新连续天数），
//! 再按当前加成发放经验值并检查经验值里程碑。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use quiz_shared::observability::metrics as app_metrics;

use super::milestone_service::MilestoneService;
use super::streak_service::StreakService;
use crate::clock::Clock;
use crate::error::Result;
use crate::models::{
    Milestone, ProgressSummary, StreakCheck, UserProgress, XpAward, XpMilestone,
};
use crate::repository::ProgressRepositoryTrait;
use crate::scoring::{Difficulty, compute_learning_xp};

/// 一次学习模式答题
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerInput {
    pub difficulty: Difficulty,
    pub hints_used: u32,
    pub elapsed_ms: u64,
    pub correct: bool,
}

/// 答题结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub streak: StreakCheck,
    pub xp: XpAward,
}

pub struct ProgressionService {
    streaks: Arc<StreakService>,
    milestones: Arc<MilestoneService>,
    repo: Arc<dyn ProgressRepositoryTrait>,
    clock: Arc<dyn Clock>,
}

impl ProgressionService {
    pub fn new(
        streaks: Arc<StreakService>,
        milestones: Arc<MilestoneService>,
        repo: Arc<dyn ProgressRepositoryTrait>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            streaks,
            milestones,
            repo,
            clock,
        }
    }

    /// 记录一次答题；答错也算有效活动，但不发经验值
    #[instrument(skip(self, input), fields(user_id = %user_id, correct = input.correct))]
    pub async fn record_answer(&self, user_id: &str, input: AnswerInput) -> Result<AnswerOutcome> {
        let streak = self.streaks.check_streak(user_id).await?;
        let ladder = self.milestones.xp_ladder().await?;

        let xp = if input.correct {
            let base_xp = compute_learning_xp(input.difficulty, input.hints_used, input.elapsed_ms);
            let award = self
                .repo
                .award_xp(user_id, base_xp, self.clock.now(), &ladder)
                .await?;

            app_metrics::record_xp_awarded(award.awarded_xp);
            for grant in &award.milestones_crossed {
                app_metrics::record_milestone_boost(XpMilestone::KIND.as_str());
                info!(user_id, threshold = grant.threshold, "跨过经验值里程碑");
            }
            award
        } else {
            let total_xp = self
                .repo
                .get_progress(user_id)
                .await?
                .map(|p| p.total_xp)
                .unwrap_or(0);
            XpAward {
                base_xp: 0,
                multiplier_applied: 1.0,
                awarded_xp: 0,
                total_xp,
                milestones_crossed: Vec::new(),
                next_milestone: ladder.next_after(total_xp),
            }
        };

        Ok(AnswerOutcome { streak, xp })
    }

    /// 进度概览；从未活动的用户返回初始状态
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_progress(&self, user_id: &str) -> Result<ProgressSummary> {
        let now = self.clock.now();
        let progress = self
            .repo
            .get_progress(user_id)
            .await?
            .unwrap_or_else(|| UserProgress::new(user_id, now));
        let streak_ladder = self.milestones.streak_ladder().await?;
        let xp_ladder = self.milestones.xp_ladder().await?;

        Ok(ProgressSummary::build(
            &progress,
            now,
            &streak_ladder,
            &xp_ladder,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::StreakPolicy;
    use crate::repository::MemoryStore;
    use chrono::{DateTime, Duration, Utc};
    use std::time::Duration as StdDuration;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn build(clock: Arc<ManualClock>) -> ProgressionService {
        let store = Arc::new(MemoryStore::with_default_milestones());
        let milestones = Arc::new(MilestoneService::new(store.clone(), StdDuration::from_secs(60)));
        let streaks = Arc::new(StreakService::new(
            store.clone(),
            milestones.clone(),
            clock.clone(),
            StreakPolicy::default(),
        ));
        ProgressionService::new(streaks, milestones, store, clock)
    }

    fn answer(difficulty: i32, correct: bool) -> AnswerInput {
        AnswerInput {
            difficulty: Difficulty::new(difficulty).unwrap(),
            hints_used: 0,
            elapsed_ms: 60_000,
            correct,
        }
    }

    #[tokio::test]
    async fn test_wrong_answer_counts_for_streak_without_xp() {
        let clock = Arc::new(ManualClock::new(at("2026-01-01T09:00:00Z")));
        let service = build(clock);

        let outcome = service.record_answer("u1", answer(3, false)).await.unwrap();
        assert_eq!(outcome.streak.current_streak, 1);
        assert_eq!(outcome.xp.awarded_xp, 0);
        assert_eq!(outcome.xp.total_xp, 0);
        assert_eq!(outcome.xp.next_milestone.unwrap().remaining, 100);
    }

    #[tokio::test]
    async fn test_streak_boost_applies_to_same_answer() {
        let clock = Arc::new(ManualClock::new(at("2026-01-01T09:00:00Z")));
        let service = build(clock.clone());

        // 第 1、2 天
        for _ in 0..2 {
            service.record_answer("u1", answer(1, true)).await.unwrap();
            clock.advance(Duration::days(1));
        }
        // 第 3 天达成里程碑，本题即享受 1.1 倍
        let outcome = service.record_answer("u1", answer(5, true)).await.unwrap();
        assert!(outcome.streak.milestone_granted.is_some());
        assert_eq!(outcome.xp.base_xp, 50);
        assert_eq!(outcome.xp.multiplier_applied, 1.1);
        assert_eq!(outcome.xp.awarded_xp, 55);
    }

    #[tokio::test]
    async fn test_progress_for_new_user() {
        let clock = Arc::new(ManualClock::new(at("2026-01-01T09:00:00Z")));
        let service = build(clock);

        let summary = service.get_progress("fresh").await.unwrap();
        assert_eq!(summary.current_streak, 0);
        assert_eq!(summary.total_xp, 0);
        assert!(!summary.boost.active);
        assert_eq!(summary.next_streak_milestone.unwrap().threshold, 3);
    }
}
