//! 连续打卡与经验值加成服务

use std::sync::Arc;

use tracing::{info, instrument};

use quiz_shared::observability::metrics as app_metrics;

use super::milestone_service::MilestoneService;
use crate::clock::Clock;
use crate::error::Result;
use crate::models::{Milestone, StreakCheck, StreakMilestone, StreakPolicy, XpBoost};
use crate::repository::ProgressRepositoryTrait;

pub struct StreakService {
    repo: Arc<dyn ProgressRepositoryTrait>,
    milestones: Arc<MilestoneService>,
    clock: Arc<dyn Clock>,
    policy: StreakPolicy,
}

impl StreakService {
    pub fn new(
        repo: Arc<dyn ProgressRepositoryTrait>,
        milestones: Arc<MilestoneService>,
        clock: Arc<dyn Clock>,
        policy: StreakPolicy,
    ) -> Self {
        Self {
            repo,
            milestones,
            clock,
            policy,
        }
    }

    /// 记录一次有效活动并推进连续打卡
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn check_streak(&self, user_id: &str) -> Result<StreakCheck> {
        let ladder = self.milestones.streak_ladder().await?;
        let now = self.clock.now();
        let check = self
            .repo
            .check_streak(user_id, now, &self.policy, &ladder)
            .await?;

        app_metrics::record_streak_update(check.transition.as_str());
        if let Some(grant) = &check.milestone_granted {
            app_metrics::record_milestone_boost(StreakMilestone::KIND.as_str());
            info!(
                user_id,
                days = grant.threshold,
                multiplier = grant.boost_multiplier,
                expires_at = %grant.boost_expires_at,
                "达成连续打卡里程碑"
            );
        }

        Ok(check)
    }

    /// 查询当前经验值加成
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_active_xp_boost(&self, user_id: &str) -> Result<XpBoost> {
        let now = self.clock.now();
        Ok(self
            .repo
            .get_progress(user_id)
            .await?
            .map(|p| p.active_boost(now))
            .unwrap_or_else(XpBoost::inactive))
    }
}
