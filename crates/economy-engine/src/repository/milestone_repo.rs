//! 里程碑配置仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::MilestoneRepositoryTrait;
use crate::error::Result;
use crate::models::{StreakMilestone, XpMilestone};

/// 里程碑配置仓储
///
/// 只读；停用的里程碑也会返回，由阶梯构造时过滤。
pub struct MilestoneRepository {
    pool: PgPool,
}

impl MilestoneRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MilestoneRepositoryTrait for MilestoneRepository {
    async fn list_streak_milestones(&self) -> Result<Vec<StreakMilestone>> {
        let rows = sqlx::query_as::<_, StreakMilestone>(
            r#"
            SELECT id, days, reward_description, boost_multiplier, boost_duration_hours, is_active
            FROM streak_milestones
            ORDER BY days ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_xp_milestones(&self) -> Result<Vec<XpMilestone>> {
        let rows = sqlx::query_as::<_, XpMilestone>(
            r#"
            SELECT id, xp_threshold, reward_description, boost_multiplier, boost_duration_hours, is_active
            FROM xp_milestones
            ORDER BY xp_threshold ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
