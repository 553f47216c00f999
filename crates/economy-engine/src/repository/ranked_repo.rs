//! 排位赛仓储
//!
//! 锁顺序固定为：用户进度行 -> 会话行 -> 排行榜行，避免并发开场与结算互相死锁。
//! 部分唯一索引 `uq_ranked_sessions_one_active` 兜底保证每个用户至多一个活跃会话。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::progress_repo::ProgressRepository;
use super::traits::{RankedRepositoryTrait, SessionSettlement, StartedSession};
use super::unique_violation_as_conflict;
use crate::error::{EconomyError, Result};
use crate::models::{
    AttemptOutcome, LeaderboardEntry, RankedAttempt, RankedSession, UserProgress, settle_session,
};

const SESSION_COLUMNS: &str = r#"
    id, user_id, is_active, started_at, ended_at, starting_score, total_score,
    questions_answered, correct_answers, total_time_ms, updated_at
"#;

const ENTRY_COLUMNS: &str = r#"
    user_id, total_score, questions_answered, correct_answers, sessions_played,
    accuracy, achieved_at, updated_at
"#;

pub struct RankedRepository {
    pool: PgPool,
}

impl RankedRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_entry_in_tx(
        tx: &mut PgConnection,
        user_id: &str,
    ) -> Result<Option<LeaderboardEntry>> {
        let entry = sqlx::query_as::<_, LeaderboardEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM leaderboard_entries WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(tx)
        .await?;

        Ok(entry)
    }

    async fn upsert_entry_in_tx(tx: &mut PgConnection, entry: &LeaderboardEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leaderboard_entries
                (user_id, total_score, questions_answered, correct_answers, sessions_played,
                 accuracy, achieved_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                total_score = EXCLUDED.total_score,
                questions_answered = EXCLUDED.questions_answered,
                correct_answers = EXCLUDED.correct_answers,
                sessions_played = EXCLUDED.sessions_played,
                accuracy = EXCLUDED.accuracy,
                achieved_at = EXCLUDED.achieved_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&entry.user_id)
        .bind(entry.total_score)
        .bind(entry.questions_answered)
        .bind(entry.correct_answers)
        .bind(entry.sessions_played)
        .bind(entry.accuracy)
        .bind(entry.achieved_at)
        .bind(entry.updated_at)
        .execute(tx)
        .await?;

        Ok(())
    }

    async fn save_session_in_tx(tx: &mut PgConnection, session: &RankedSession) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ranked_sessions SET
                is_active = $2,
                ended_at = $3,
                total_score = $4,
                questions_answered = $5,
                correct_answers = $6,
                total_time_ms = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.is_active)
        .bind(session.ended_at)
        .bind(session.total_score)
        .bind(session.questions_answered)
        .bind(session.correct_answers)
        .bind(session.total_time_ms)
        .bind(session.updated_at)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 结算一个会话：关闭会话、并入进度、写排行榜
    ///
    /// 调用方必须已持有该用户进度行的锁。
    async fn settle_in_tx(
        tx: &mut PgConnection,
        session: &mut RankedSession,
        progress: &mut UserProgress,
        now: DateTime<Utc>,
    ) -> Result<LeaderboardEntry> {
        let previous = Self::lock_entry_in_tx(&mut *tx, &session.user_id).await?;
        let entry = settle_session(session, progress, previous.as_ref(), now);
        Self::save_session_in_tx(&mut *tx, session).await?;
        Self::upsert_entry_in_tx(&mut *tx, &entry).await?;
        Ok(entry)
    }
}

#[async_trait]
impl RankedRepositoryTrait for RankedRepository {
    async fn start_session(&self, user_id: &str, now: DateTime<Utc>) -> Result<StartedSession> {
        let mut tx = self.pool.begin().await?;
        let mut progress = ProgressRepository::lock_or_create_in_tx(&mut tx, user_id, now).await?;

        let stale = sqlx::query_as::<_, RankedSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM ranked_sessions
            WHERE user_id = $1 AND is_active
            ORDER BY started_at ASC
            FOR UPDATE
            "#
        ))
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut force_closed = Vec::with_capacity(stale.len());
        for mut session in stale {
            Self::settle_in_tx(&mut tx, &mut session, &mut progress, now).await?;
            force_closed.push(session.id);
        }
        if !force_closed.is_empty() {
            ProgressRepository::save_in_tx(&mut tx, &progress).await?;
        }

        let session = RankedSession::open(user_id, progress.ranked_total_score, now);
        sqlx::query(
            r#"
            INSERT INTO ranked_sessions
                (id, user_id, is_active, started_at, ended_at, starting_score, total_score,
                 questions_answered, correct_answers, total_time_ms, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.id)
        .bind(&session.user_id)
        .bind(session.is_active)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.starting_score)
        .bind(session.total_score)
        .bind(session.questions_answered)
        .bind(session.correct_answers)
        .bind(session.total_time_ms)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(unique_violation_as_conflict)?;

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;

        let mut session = sqlx::query_as::<_, RankedSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM ranked_sessions WHERE id = $1 FOR UPDATE"
        ))
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EconomyError::InvalidSession(session_id))?;

        session.ensure_accepts_attempt(user_id)?;
        let outcome = session.apply_attempt(attempt, now);
        Self::save_session_in_tx(&mut tx, &session).await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn end_session(
        &self,
        session_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionSettlement> {
        let mut tx = self.pool.begin().await?;
        let mut progress = ProgressRepository::lock_or_create_in_tx(&mut tx, user_id, now).await?;

        let mut session = sqlx::query_as::<_, RankedSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM ranked_sessions WHERE id = $1 FOR UPDATE"
        ))
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EconomyError::InvalidSession(session_id))?;

        session.ensure_can_end(user_id)?;
        let entry = Self::settle_in_tx(&mut tx, &mut session, &mut progress, now).await?;
        ProgressRepository::save_in_tx(&mut tx, &progress).await?;

        tx.commit().await?;
        Ok(SessionSettlement { session, entry })
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<RankedSession>> {
        let session = sqlx::query_as::<_, RankedSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM ranked_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn active_session_count(&self, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ranked_sessions WHERE user_id = $1 AND is_active",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn top_entries(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM leaderboard_entries
            ORDER BY total_score DESC, achieved_at ASC, user_id COLLATE "C" ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn get_entry(&self, user_id: &str) -> Result<Option<LeaderboardEntry>> {
        let entry = sqlx::query_as::<_, LeaderboardEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM leaderboard_entries WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn count_ahead(&self, entry: &LeaderboardEntry) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM leaderboard_entries
            WHERE total_score > $1
               OR (total_score = $1 AND achieved_at < $2)
               OR (total_score = $1 AND achieved_at = $2 AND user_id COLLATE "C" < $3 COLLATE "C")
            "#,
        )
        .bind(entry.total_score)
        .bind(entry.achieved_at)
        .bind(&entry.user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
