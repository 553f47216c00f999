//! 用户进度模型
//!
//! 连续打卡状态机、经验值累计、加成窗口以及排位赛终身累计都挂在这一行上。

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::enums::StreakTransition;
use super::milestone::{
    Milestone, MilestoneGrant, MilestoneLadder, NextMilestone, StreakMilestone, XpMilestone,
};
use crate::clock::LocalCalendar;
use crate::scoring::apply_xp_multiplier;

/// 连续打卡规则
#[derive(Debug, Clone, Copy)]
pub struct StreakPolicy {
    /// 超过该时长没有活动则重置
    pub reset_window: Duration,
    pub calendar: LocalCalendar,
}

impl Default for StreakPolicy {
    fn default() -> Self {
        Self {
            reset_window: Duration::hours(48),
            calendar: LocalCalendar::utc(),
        }
    }
}

/// 用户进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProgress {
    pub user_id: String,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_activity_date: Option<NaiveDate>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub streak_start_date: Option<NaiveDate>,
    pub total_xp: i64,
    pub ranked_total_score: i64,
    pub ranked_questions_answered: i64,
    pub ranked_correct_answers: i64,
    pub ranked_sessions_played: i64,
    pub xp_boost_multiplier: f64,
    pub xp_boost_expires_at: Option<DateTime<Utc>>,
    pub boost_reward: Option<String>,
    /// 本轮连续打卡中最近发放的里程碑天数，重置时清空
    pub last_streak_milestone: Option<i32>,
    /// 最近跨过的经验值里程碑阈值
    pub last_xp_milestone: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 经验值加成状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpBoost {
    pub active: bool,
    pub multiplier: f64,
    pub expires_at: Option<DateTime<Utc>>,
    pub reward_description: Option<String>,
}

impl XpBoost {
    pub fn inactive() -> Self {
        Self {
            active: false,
            multiplier: 1.0,
            expires_at: None,
            reward_description: None,
        }
    }
}

/// 一次打卡检查的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakCheck {
    pub transition: StreakTransition,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub streak_start_date: Option<NaiveDate>,
    pub milestone_granted: Option<MilestoneGrant>,
    pub boost: XpBoost,
    pub next_milestone: Option<NextMilestone>,
}

/// 一次经验值发放的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpAward {
    pub base_xp: i64,
    pub multiplier_applied: f64,
    pub awarded_xp: i64,
    pub total_xp: i64,
    pub milestones_crossed: Vec<MilestoneGrant>,
    pub next_milestone: Option<NextMilestone>,
}

impl UserProgress {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            last_activity_at: None,
            streak_start_date: None,
            total_xp: 0,
            ranked_total_score: 0,
            ranked_questions_answered: 0,
            ranked_correct_answers: 0,
            ranked_sessions_played: 0,
            xp_boost_multiplier: 1.0,
            xp_boost_expires_at: None,
            boost_reward: None,
            last_streak_milestone: None,
            last_xp_milestone: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 推进连续打卡状态机
    ///
    /// - 今天已有活动：不变
    /// - 昨天有活动：+1
    /// - 距上次活动超过重置窗口：从 1 重新开始
    /// - 中间空了天但仍在窗口内：+1
    /// - 从未活动：初始化为 1
    pub fn advance_streak(&mut self, now: DateTime<Utc>, policy: &StreakPolicy) -> StreakTransition {
        let today = policy.calendar.date_of(now);

        let transition = match self.last_activity_date {
            None => {
                self.current_streak = 1;
                self.streak_start_date = Some(today);
                StreakTransition::Started
            }
            Some(last) if last >= today => {
                // 时钟回拨时也按"今天已打卡"处理
                if self.last_activity_at.is_none_or(|at| at < now) {
                    self.last_activity_at = Some(now);
                }
                self.updated_at = now;
                return StreakTransition::Unchanged;
            }
            Some(last) if last.succ_opt() == Some(today) => {
                self.current_streak += 1;
                StreakTransition::Continued
            }
            Some(last) => {
                let last_at = self
                    .last_activity_at
                    .unwrap_or_else(|| policy.calendar.start_of_day_utc(last));
                if now - last_at > policy.reset_window {
                    self.current_streak = 1;
                    self.streak_start_date = Some(today);
                    self.last_streak_milestone = None;
                    StreakTransition::Reset
                } else {
                    self.current_streak += 1;
                    StreakTransition::Continued
                }
            }
        };

        if self.streak_start_date.is_none() {
            self.streak_start_date = Some(today);
        }
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.last_activity_date = Some(today);
        self.last_activity_at = Some(now);
        self.updated_at = now;
        transition
    }

    /// 打卡并检查连续天数里程碑
    ///
    /// 先推进连续天数，再判断里程碑，保证加成资格基于最新的连续天数。
    pub fn check_streak(
        &mut self,
        now: DateTime<Utc>,
        policy: &StreakPolicy,
        ladder: &MilestoneLadder<StreakMilestone>,
    ) -> StreakCheck {
        let transition = self.advance_streak(now, policy);

        let milestone_granted = if transition.advanced() {
            ladder
                .highest_reached(
                    i64::from(self.current_streak),
                    self.last_streak_milestone.map(i64::from),
                )
                .map(|m| {
                    let grant = m.grant(now);
                    self.last_streak_milestone = Some(m.days);
                    self.apply_grant(&grant);
                    grant
                })
        } else {
            None
        };

        StreakCheck {
            transition,
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            streak_start_date: self.streak_start_date,
            milestone_granted,
            boost: self.active_boost(now),
            next_milestone: ladder.next_after(i64::from(self.current_streak)),
        }
    }

    /// 发放经验值：应用当前加成、累计并检查经验值里程碑
    pub fn award_xp(
        &mut self,
        base_xp: i64,
        now: DateTime<Utc>,
        ladder: &MilestoneLadder<XpMilestone>,
    ) -> XpAward {
        let boost = self.active_boost(now);
        let awarded_xp = apply_xp_multiplier(base_xp, boost.multiplier);

        let previous = self.total_xp.max(self.last_xp_milestone.unwrap_or(0));
        self.total_xp = self.total_xp.saturating_add(awarded_xp);

        let milestones_crossed: Vec<MilestoneGrant> = ladder
            .crossed(previous, self.total_xp)
            .into_iter()
            .map(|m| m.grant(now))
            .collect();

        if let Some(highest) = milestones_crossed.last() {
            self.last_xp_milestone = Some(highest.threshold);
        }
        // 同时跨过多档时只激活最高一档的加成
        if let Some(grant) = milestones_crossed.iter().rev().find(|g| g.grants_boost()) {
            self.apply_grant(grant);
        }
        self.updated_at = now;

        XpAward {
            base_xp,
            multiplier_applied: boost.multiplier,
            awarded_xp,
            total_xp: self.total_xp,
            milestones_crossed,
            next_milestone: ladder.next_after(self.total_xp),
        }
    }

    /// 新加成覆盖旧加成
    fn apply_grant(&mut self, grant: &MilestoneGrant) {
        if grant.grants_boost() {
            self.xp_boost_multiplier = grant.boost_multiplier;
            self.xp_boost_expires_at = Some(grant.boost_expires_at);
        }
        self.boost_reward = Some(grant.reward_description.clone());
    }

    /// 当前是否处于加成窗口
    pub fn active_boost(&self, now: DateTime<Utc>) -> XpBoost {
        match self.xp_boost_expires_at {
            Some(expires_at) if expires_at > now && self.xp_boost_multiplier > 1.0 => XpBoost {
                active: true,
                multiplier: self.xp_boost_multiplier,
                expires_at: Some(expires_at),
                reward_description: self.boost_reward.clone(),
            },
            _ => XpBoost::inactive(),
        }
    }
}

/// 排位赛终身累计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTotals {
    pub total_score: i64,
    pub questions_answered: i64,
    pub correct_answers: i64,
    pub sessions_played: i64,
}

impl From<&UserProgress> for RankedTotals {
    fn from(p: &UserProgress) -> Self {
        Self {
            total_score: p.ranked_total_score,
            questions_answered: p.ranked_questions_answered,
            correct_answers: p.ranked_correct_answers,
            sessions_played: p.ranked_sessions_played,
        }
    }
}

/// 进度概览
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub user_id: String,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub streak_start_date: Option<NaiveDate>,
    pub last_activity_date: Option<NaiveDate>,
    pub total_xp: i64,
    pub boost: XpBoost,
    pub next_streak_milestone: Option<NextMilestone>,
    pub next_xp_milestone: Option<NextMilestone>,
    pub ranked: RankedTotals,
}

impl ProgressSummary {
    pub fn build(
        progress: &UserProgress,
        now: DateTime<Utc>,
        streak_ladder: &MilestoneLadder<StreakMilestone>,
        xp_ladder: &MilestoneLadder<XpMilestone>,
    ) -> Self {
        Self {
            user_id: progress.user_id.clone(),
            current_streak: progress.current_streak,
            longest_streak: progress.longest_streak,
            streak_start_date: progress.streak_start_date,
            last_activity_date: progress.last_activity_date,
            total_xp: progress.total_xp,
            boost: progress.active_boost(now),
            next_streak_milestone: streak_ladder.next_after(i64::from(progress.current_streak)),
            next_xp_milestone: xp_ladder.next_after(progress.total_xp),
            ranked: RankedTotals::from(progress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn streak_ladder() -> MilestoneLadder<StreakMilestone> {
        MilestoneLadder::new(vec![
            StreakMilestone {
                id: 1,
                days: 3,
                reward_description: "3 天".to_string(),
                boost_multiplier: 1.2,
                boost_duration_hours: 24,
                is_active: true,
            },
            StreakMilestone {
                id: 2,
                days: 7,
                reward_description: "7 天".to_string(),
                boost_multiplier: 1.5,
                boost_duration_hours: 48,
                is_active: true,
            },
        ])
    }

    fn xp_ladder() -> MilestoneLadder<XpMilestone> {
        MilestoneLadder::new(vec![
            XpMilestone {
                id: 1,
                xp_threshold: 100,
                reward_description: "新手".to_string(),
                boost_multiplier: 1.0,
                boost_duration_hours: 0,
                is_active: true,
            },
            XpMilestone {
                id: 2,
                xp_threshold: 500,
                reward_description: "学徒".to_string(),
                boost_multiplier: 1.25,
                boost_duration_hours: 24,
                is_active: true,
            },
        ])
    }

    #[test]
    fn test_first_activity_starts_streak() {
        let now = at("2026-03-01T10:00:00Z");
        let mut p = UserProgress::new("u", now);
        assert_eq!(p.advance_streak(now, &StreakPolicy::default()), StreakTransition::Started);
        assert_eq!(p.current_streak, 1);
        assert_eq!(p.longest_streak, 1);
        assert_eq!(p.streak_start_date, Some(now.date_naive()));
    }

    #[test]
    fn test_same_day_is_idempotent() {
        let policy = StreakPolicy::default();
        let mut p = UserProgress::new("u", at("2026-03-01T08:00:00Z"));
        p.advance_streak(at("2026-03-01T08:00:00Z"), &policy);
        assert_eq!(
            p.advance_streak(at("2026-03-01T22:00:00Z"), &policy),
            StreakTransition::Unchanged
        );
        assert_eq!(p.current_streak, 1);
        assert_eq!(p.last_activity_at, Some(at("2026-03-01T22:00:00Z")));
    }

    #[test]
    fn test_yesterday_continues_and_updates_longest() {
        let policy = StreakPolicy::default();
        let mut p = UserProgress::new("u", at("2026-03-01T23:50:00Z"));
        p.advance_streak(at("2026-03-01T23:50:00Z"), &policy);
        assert_eq!(
            p.advance_streak(at("2026-03-02T00:10:00Z"), &policy),
            StreakTransition::Continued
        );
        assert_eq!(p.current_streak, 2);
        assert_eq!(p.longest_streak, 2);
    }

    #[test]
    fn test_gap_inside_window_continues() {
        let policy = StreakPolicy::default();
        let mut p = UserProgress::new("u", at("2026-03-01T22:00:00Z"));
        p.advance_streak(at("2026-03-01T22:00:00Z"), &policy);
        // 跳过 3 月 2 日，但距上次活动 34 小时
        assert_eq!(
            p.advance_streak(at("2026-03-03T08:00:00Z"), &policy),
            StreakTransition::Continued
        );
        assert_eq!(p.current_streak, 2);
    }

    #[test]
    fn test_reset_after_window() {
        let policy = StreakPolicy::default();
        let mut p = UserProgress::new("u", at("2026-03-01T08:00:00Z"));
        p.advance_streak(at("2026-03-01T08:00:00Z"), &policy);
        p.advance_streak(at("2026-03-02T08:00:00Z"), &policy);
        p.last_streak_milestone = Some(3);

        assert_eq!(
            p.advance_streak(at("2026-03-05T09:00:00Z"), &policy),
            StreakTransition::Reset
        );
        assert_eq!(p.current_streak, 1);
        assert_eq!(p.longest_streak, 2);
        assert_eq!(p.streak_start_date, Some(at("2026-03-05T09:00:00Z").date_naive()));
        assert_eq!(p.last_streak_milestone, None);
    }

    #[test]
    fn test_day_seven_activates_boost() {
        let policy = StreakPolicy::default();
        let ladder = streak_ladder();
        let start = at("2026-03-01T09:00:00Z");
        let mut p = UserProgress::new("u", start);

        let mut now = start;
        for _ in 0..6 {
            p.check_streak(now, &policy, &ladder);
            now += Duration::days(1);
        }
        assert_eq!(p.current_streak, 6);
        // 第 3 天的 1.2 倍 24 小时加成已过期
        assert!(!p.active_boost(now - Duration::days(1)).active);

        let check = p.check_streak(now, &policy, &ladder);
        assert_eq!(check.current_streak, 7);
        let grant = check.milestone_granted.unwrap();
        assert_eq!(grant.threshold, 7);
        assert!(check.boost.active);
        assert_eq!(check.boost.multiplier, 1.5);
        assert_eq!(check.boost.expires_at, Some(now + Duration::hours(48)));
        assert!(check.next_milestone.is_none());
    }

    #[test]
    fn test_milestone_granted_once_per_run_and_re_earned_after_reset() {
        let policy = StreakPolicy::default();
        let ladder = streak_ladder();
        let mut now = at("2026-03-01T09:00:00Z");
        let mut p = UserProgress::new("u", now);

        let mut grants = 0;
        for _ in 0..5 {
            if p.check_streak(now, &policy, &ladder).milestone_granted.is_some() {
                grants += 1;
            }
            // 同一天重复打卡不会重复发放
            assert!(p.check_streak(now, &policy, &ladder).milestone_granted.is_none());
            now += Duration::days(1);
        }
        assert_eq!(grants, 1);

        now += Duration::days(5);
        for _ in 0..3 {
            p.check_streak(now, &policy, &ladder);
            now += Duration::days(1);
        }
        assert_eq!(p.current_streak, 3);
        assert_eq!(p.last_streak_milestone, Some(3));
    }

    #[test]
    fn test_award_xp_with_boost_and_milestones() {
        let now = at("2026-03-01T09:00:00Z");
        let ladder = xp_ladder();
        let mut p = UserProgress::new("u", now);
        p.total_xp = 90;

        let award = p.award_xp(20, now, &ladder);
        assert_eq!(award.awarded_xp, 20);
        assert_eq!(award.total_xp, 110);
        assert_eq!(award.milestones_crossed.len(), 1);
        assert_eq!(award.next_milestone.as_ref().unwrap().remaining, 390);
        // 100 档倍率为 1，不激活加成
        assert!(!p.active_boost(now).active);

        p.xp_boost_multiplier = 1.5;
        p.xp_boost_expires_at = Some(now + Duration::hours(1));
        let award = p.award_xp(33, now, &ladder);
        assert_eq!(award.multiplier_applied, 1.5);
        assert_eq!(award.awarded_xp, 50);
        assert!(award.milestones_crossed.is_empty());
    }

    #[test]
    fn test_xp_milestone_is_one_time() {
        let now = at("2026-03-01T09:00:00Z");
        let ladder = xp_ladder();
        let mut p = UserProgress::new("u", now);

        let first = p.award_xp(600, now, &ladder);
        assert_eq!(first.milestones_crossed.len(), 2);
        assert_eq!(p.last_xp_milestone, Some(500));
        assert!(p.active_boost(now).active);

        let second = p.award_xp(10, now, &ladder);
        assert!(second.milestones_crossed.is_empty());
    }

    #[test]
    fn test_boost_expiry() {
        let now = at("2026-03-01T09:00:00Z");
        let mut p = UserProgress::new("u", now);
        p.xp_boost_multiplier = 2.0;
        p.xp_boost_expires_at = Some(now + Duration::hours(2));
        assert!(p.active_boost(now).active);
        assert!(!p.active_boost(now + Duration::hours(2)).active);
        assert_eq!(p.active_boost(now + Duration::hours(3)).multiplier, 1.0);
    }
}
