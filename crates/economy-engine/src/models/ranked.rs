//! 排位赛模型
//!
//! 会话生命周期：active -> closed（终态）。
//! 会话分数以用户终身累计分为起点，结束时只把本场的增量并入终身累计。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::progress::UserProgress;
use crate::error::{EconomyError, Result};
use crate::scoring::{Difficulty, compute_ranked_delta};

/// 排位赛会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RankedSession {
    pub id: Uuid,
    pub user_id: String,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// 开场时的终身累计分
    pub starting_score: i64,
    /// 当前累计分（起点 + 本场增量）
    pub total_score: i64,
    pub questions_answered: i32,
    pub correct_answers: i32,
    pub total_time_ms: i64,
    pub updated_at: DateTime<Utc>,
}

/// 一次答题
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedAttempt {
    pub difficulty: Difficulty,
    pub elapsed_ms: u64,
    pub hints_used: u32,
    pub correct: bool,
}

/// 答题后的会话状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub session_id: Uuid,
    pub score_delta: i64,
    pub total_score: i64,
    pub questions_answered: i32,
    pub correct_answers: i32,
}

/// 本场对终身累计的贡献
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDelta {
    pub score: i64,
    pub questions_answered: i64,
    pub correct_answers: i64,
    pub total_time_ms: i64,
}

impl RankedSession {
    /// 以终身累计分为起点开场
    pub fn open(user_id: impl Into<String>, seed_score: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            is_active: true,
            started_at: now,
            ended_at: None,
            starting_score: seed_score,
            total_score: seed_score,
            questions_answered: 0,
            correct_answers: 0,
            total_time_ms: 0,
            updated_at: now,
        }
    }

    /// 答题前校验：非本人会话为无效会话，已结束为不可用
    pub fn ensure_accepts_attempt(&self, user_id: &str) -> Result<()> {
        if self.user_id != user_id {
            return Err(EconomyError::InvalidSession(self.id));
        }
        if !self.is_active {
            return Err(EconomyError::SessionNotActive(self.id));
        }
        Ok(())
    }

    /// 结束前校验：非本人或已结束都视为无效会话
    pub fn ensure_can_end(&self, user_id: &str) -> Result<()> {
        if self.user_id != user_id || !self.is_active {
            return Err(EconomyError::InvalidSession(self.id));
        }
        Ok(())
    }

    pub fn apply_attempt(&mut self, attempt: &RankedAttempt, now: DateTime<Utc>) -> AttemptOutcome {
        let score_delta = compute_ranked_delta(
            attempt.difficulty,
            attempt.elapsed_ms,
            attempt.hints_used,
            attempt.correct,
        );
        self.total_score = self.total_score.saturating_add(score_delta);
        self.questions_answered += 1;
        if attempt.correct {
            self.correct_answers += 1;
        }
        self.total_time_ms = self
            .total_time_ms
            .saturating_add(i64::try_from(attempt.elapsed_ms).unwrap_or(i64::MAX));
        self.updated_at = now;

        AttemptOutcome {
            session_id: self.id,
            score_delta,
            total_score: self.total_score,
            questions_answered: self.questions_answered,
            correct_answers: self.correct_answers,
        }
    }

    pub fn close(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.ended_at = Some(now);
        self.updated_at = now;
    }

    pub fn delta(&self) -> SessionDelta {
        SessionDelta {
            score: self.total_score - self.starting_score,
            questions_answered: i64::from(self.questions_answered),
            correct_answers: i64::from(self.correct_answers),
            total_time_ms: self.total_time_ms,
        }
    }

    /// 正确率，保留两位小数
    pub fn accuracy(&self) -> f64 {
        accuracy(
            i64::from(self.correct_answers),
            i64::from(self.questions_answered),
        )
    }

    /// 平均每题耗时（毫秒）
    pub fn average_time_ms(&self) -> i64 {
        if self.questions_answered == 0 {
            0
        } else {
            self.total_time_ms / i64::from(self.questions_answered)
        }
    }
}

fn accuracy(correct: i64, answered: i64) -> f64 {
    if answered <= 0 {
        return 0.0;
    }
    (correct as f64 / answered as f64 * 100.0).round() / 100.0
}

/// 把本场增量并入终身累计
pub fn fold_into_progress(progress: &mut UserProgress, delta: &SessionDelta, now: DateTime<Utc>) {
    progress.ranked_total_score = progress.ranked_total_score.saturating_add(delta.score);
    progress.ranked_questions_answered += delta.questions_answered;
    progress.ranked_correct_answers += delta.correct_answers;
    progress.ranked_sessions_played += 1;
    progress.updated_at = now;
}

/// 排行榜条目：每个用户一条，按终身累计分排名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub total_score: i64,
    pub questions_answered: i64,
    pub correct_answers: i64,
    pub sessions_played: i64,
    pub accuracy: f64,
    /// 达到当前分数的时间，同分时先达到者排前
    pub achieved_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaderboardEntry {
    /// 根据会话结算后的终身累计生成条目，分数未变时保留原达成时间
    pub fn from_progress(
        progress: &UserProgress,
        previous: Option<&LeaderboardEntry>,
        now: DateTime<Utc>,
    ) -> Self {
        let achieved_at = match previous {
            Some(prev) if prev.total_score == progress.ranked_total_score => prev.achieved_at,
            _ => now,
        };
        Self {
            user_id: progress.user_id.clone(),
            total_score: progress.ranked_total_score,
            questions_answered: progress.ranked_questions_answered,
            correct_answers: progress.ranked_correct_answers,
            sessions_played: progress.ranked_sessions_played,
            accuracy: accuracy(
                progress.ranked_correct_answers,
                progress.ranked_questions_answered,
            ),
            achieved_at,
            updated_at: now,
        }
    }

    /// 排行榜全序：分数降序，达成时间升序，用户 ID 升序
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .total_score
            .cmp(&self.total_score)
            .then_with(|| self.achieved_at.cmp(&other.achieved_at))
            .then_with(|| self.user_id.as_bytes().cmp(other.user_id.as_bytes()))
    }

    /// 当前条目是否排在 `other` 之前
    pub fn is_ranked_above(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Less
    }
}

/// 带名次的排行榜条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLeaderboardEntry {
    pub rank: i64,
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
}

/// 为已排序的条目编号（名次从 1 开始）
pub fn number_entries(entries: Vec<LeaderboardEntry>) -> Vec<RankedLeaderboardEntry> {
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| RankedLeaderboardEntry {
            rank: i as i64 + 1,
            entry,
        })
        .collect()
}

/// 会话结算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub user_id: String,
    pub final_score: i64,
    pub score_delta: i64,
    pub questions_answered: i32,
    pub correct_answers: i32,
    pub accuracy: f64,
    pub average_time_ms: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// 结算后的排行榜名次
    pub rank: Option<i64>,
}

impl SessionSummary {
    pub fn new(session: &RankedSession, rank: Option<i64>) -> Self {
        Self {
            session_id: session.id,
            user_id: session.user_id.clone(),
            final_score: session.total_score,
            score_delta: session.total_score - session.starting_score,
            questions_answered: session.questions_answered,
            correct_answers: session.correct_answers,
            accuracy: session.accuracy(),
            average_time_ms: session.average_time_ms(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            rank,
        }
    }
}

/// 结束会话的完整结算
///
/// 关闭会话、并入终身累计并生成新的排行榜条目。强制关闭和正常结束走同一逻辑。
pub fn settle_session(
    session: &mut RankedSession,
    progress: &mut UserProgress,
    previous_entry: Option<&LeaderboardEntry>,
    now: DateTime<Utc>,
) -> LeaderboardEntry {
    session.close(now);
    fold_into_progress(progress, &session.delta(), now);
    LeaderboardEntry::from_progress(progress, previous_entry, now)
}
