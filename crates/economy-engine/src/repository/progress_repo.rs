//! 用户进度仓储
//!
//! 所有写路径先锁定进度行（不存在则创建），在内存中推进状态后整行写回。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use super::traits::ProgressRepositoryTrait;
use crate::error::Result;
use crate::models::{
    MilestoneLadder, StreakCheck, StreakMilestone, StreakPolicy, UserProgress, XpAward,
    XpMilestone,
};

const PROGRESS_COLUMNS: &str = r#"
    user_id, current_streak, longest_streak, last_activity_date, last_activity_at,
    streak_start_date, total_xp, ranked_total_score, ranked_questions_answered,
    ranked_correct_answers, ranked_sessions_played, xp_boost_multiplier,
    xp_boost_expires_at, boost_reward, last_streak_milestone, last_xp_milestone,
    created_at, updated_at
"#;

pub struct ProgressRepository {
    pool: PgPool,
}

impl ProgressRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中锁定用户进度行，不存在时先插入初始行
    pub async fn lock_or_create_in_tx(
        tx: &mut PgConnection,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserProgress> {
        sqlx::query(
            r#"
            INSERT INTO user_progress (user_id, created_at, updated_at)
            VALUES ($1, $2, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let progress = sqlx::query_as::<_, UserProgress>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_progress WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_one(tx)
        .await?;

        Ok(progress)
    }

    /// 在事务中整行写回
    pub async fn save_in_tx(tx: &mut PgConnection, progress: &UserProgress) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_progress SET
                current_streak = $2,
                longest_streak = $3,
                last_activity_date = $4,
                last_activity_at = $5,
                streak_start_date = $6,
                total_xp = $7,
                ranked_total_score = $8,
                ranked_questions_answered = $9,
                ranked_correct_answers = $10,
                ranked_sessions_played = $11,
                xp_boost_multiplier = $12,
                xp_boost_expires_at = $13,
                boost_reward = $14,
                last_streak_milestone = $15,
                last_xp_milestone = $16,
                updated_at = $17
            WHERE user_id = $1
            "#,
        )
        .bind(&progress.user_id)
        .bind(progress.current_streak)
        .bind(progress.longest_streak)
        .bind(progress.last_activity_date)
        .bind(progress.last_activity_at)
        .bind(progress.streak_start_date)
        .bind(progress.total_xp)
        .bind(progress.ranked_total_score)
        .bind(progress.ranked_questions_answered)
        .bind(progress.ranked_correct_answers)
        .bind(progress.ranked_sessions_played)
        .bind(progress.xp_boost_multiplier)
        .bind(progress.xp_boost_expires_at)
        .bind(&progress.boost_reward)
        .bind(progress.last_streak_milestone)
        .bind(progress.last_xp_milestone)
        .bind(progress.updated_at)
        .execute(tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ProgressRepositoryTrait for ProgressRepository {
    async fn get_progress(&self, user_id: &str) -> Result<Option<UserProgress>> {
        let progress = sqlx::query_as::<_, UserProgress>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_progress WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(progress)
    }

    async fn check_streak(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        policy: &StreakPolicy,
        ladder: &MilestoneLadder<StreakMilestone>,
    ) -> Result<StreakCheck> {
        let mut tx = self.pool.begin().await?;
        let mut progress = Self::lock_or_create_in_tx(&mut tx, user_id, now).await?;
        let check = progress.check_streak(now, policy, ladder);
        Self::save_in_tx(&mut tx, &progress).await?;
        tx.commit().await?;
        Ok(check)
    }

    async fn award_xp(
        &self,
        user_id: &str,
        base_xp: i64,
        now: DateTime<Utc>,
        ladder: &MilestoneLadder<XpMilestone>,
    ) -> Result<XpAward> {
        let mut tx = self.pool.begin().await?;
        let mut progress = Self::lock_or_create_in_tx(&mut tx, user_id, now).await?;
        let award = progress.award_xp(base_xp, now, ladder);
        Self::save_in_tx(&mut tx, &progress).await?;
        tx.commit().await?;
        Ok(award)
    }
}
