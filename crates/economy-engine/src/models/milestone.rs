//! 里程碑配置与阶梯
//!
//! 两张独立的配置表：连续天数里程碑、累计经验值里程碑。
//! 引擎只读，加载后构造成按阈值升序排列的阶梯。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::enums::MilestoneKind;

/// 连续打卡里程碑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StreakMilestone {
    pub id: i64,
    pub days: i32,
    pub reward_description: String,
    pub boost_multiplier: f64,
    pub boost_duration_hours: i32,
    pub is_active: bool,
}

/// 累计经验值里程碑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct XpMilestone {
    pub id: i64,
    pub xp_threshold: i64,
    pub reward_description: String,
    pub boost_multiplier: f64,
    pub boost_duration_hours: i32,
    pub is_active: bool,
}

/// 两类里程碑的共同视图
pub trait Milestone: Clone + Send + Sync {
    const KIND: MilestoneKind;

    fn threshold(&self) -> i64;
    fn is_active(&self) -> bool;
    fn reward_description(&self) -> &str;
    fn boost_multiplier(&self) -> f64;
    fn boost_duration(&self) -> Duration;

    /// 达成后生成的奖励
    fn grant(&self, now: DateTime<Utc>) -> MilestoneGrant {
        MilestoneGrant {
            kind: Self::KIND,
            threshold: self.threshold(),
            reward_description: self.reward_description().to_string(),
            boost_multiplier: self.boost_multiplier(),
            boost_expires_at: now + self.boost_duration(),
        }
    }
}

impl Milestone for StreakMilestone {
    const KIND: MilestoneKind = MilestoneKind::Streak;

    fn threshold(&self) -> i64 {
        i64::from(self.days)
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn reward_description(&self) -> &str {
        &self.reward_description
    }
    fn boost_multiplier(&self) -> f64 {
        self.boost_multiplier
    }
    fn boost_duration(&self) -> Duration {
        Duration::hours(i64::from(self.boost_duration_hours.max(0)))
    }
}

impl Milestone for XpMilestone {
    const KIND: MilestoneKind = MilestoneKind::Xp;

    fn threshold(&self) -> i64 {
        self.xp_threshold
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn reward_description(&self) -> &str {
        &self.reward_description
    }
    fn boost_multiplier(&self) -> f64 {
        self.boost_multiplier
    }
    fn boost_duration(&self) -> Duration {
        Duration::hours(i64::from(self.boost_duration_hours.max(0)))
    }
}

/// 里程碑达成后的奖励
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneGrant {
    pub kind: MilestoneKind,
    pub threshold: i64,
    pub reward_description: String,
    pub boost_multiplier: f64,
    pub boost_expires_at: DateTime<Utc>,
}

impl MilestoneGrant {
    /// 倍率不大于 1 的里程碑只有展示意义，不激活加成
    pub fn grants_boost(&self) -> bool {
        self.boost_multiplier > 1.0 && self.boost_multiplier.is_finite()
    }
}

/// 下一个里程碑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextMilestone {
    pub threshold: i64,
    pub remaining: i64,
    pub reward_description: String,
}

/// 按阈值升序排列的里程碑阶梯，只包含启用的档位
#[derive(Debug, Clone)]
pub struct MilestoneLadder<M> {
    rungs: Vec<M>,
}

impl<M: Milestone> Default for MilestoneLadder<M> {
    fn default() -> Self {
        Self { rungs: Vec::new() }
    }
}

impl<M: Milestone> MilestoneLadder<M> {
    pub fn new(rows: Vec<M>) -> Self {
        let mut rungs: Vec<M> = rows
            .into_iter()
            .filter(|m| m.is_active() && m.threshold() > 0)
            .collect();
        rungs.sort_by_key(|m| m.threshold());
        rungs.dedup_by_key(|m| m.threshold());
        Self { rungs }
    }

    pub fn rungs(&self) -> &[M] {
        &self.rungs
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    /// 阈值不超过 value 且高于上次已发放阈值的最高一档
    pub fn highest_reached(&self, value: i64, already_granted: Option<i64>) -> Option<&M> {
        let floor = already_granted.unwrap_or(0);
        self.rungs
            .iter()
            .rev()
            .find(|m| m.threshold() <= value && m.threshold() > floor)
    }

    /// 从 previous 增长到 current 时跨过的档位（升序）
    pub fn crossed(&self, previous: i64, current: i64) -> Vec<&M> {
        self.rungs
            .iter()
            .filter(|m| m.threshold() > previous && m.threshold() <= current)
            .collect()
    }

    /// 严格高于 value 的第一档
    pub fn next_after(&self, value: i64) -> Option<NextMilestone> {
        self.rungs
            .iter()
            .find(|m| m.threshold() > value)
            .map(|m| NextMilestone {
                threshold: m.threshold(),
                remaining: m.threshold() - value,
                reward_description: m.reward_description().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streak(id: i64, days: i32, active: bool) -> StreakMilestone {
        StreakMilestone {
            id,
            days,
            reward_description: format!("{} 天连续打卡", days),
            boost_multiplier: 1.5,
            boost_duration_hours: 48,
            is_active: active,
        }
    }

    fn ladder() -> MilestoneLadder<StreakMilestone> {
        MilestoneLadder::new(vec![
            streak(3, 14, true),
            streak(1, 3, true),
            streak(4, 30, false),
            streak(2, 7, true),
        ])
    }

    #[test]
    fn test_ladder_sorted_and_active_only() {
        let thresholds: Vec<i64> = ladder().rungs().iter().map(|m| m.threshold()).collect();
        assert_eq!(thresholds, vec![3, 7, 14]);
    }

    #[test]
    fn test_highest_reached() {
        let ladder = ladder();
        assert!(ladder.highest_reached(2, None).is_none());
        assert_eq!(ladder.highest_reached(3, None).unwrap().days, 3);
        assert_eq!(ladder.highest_reached(10, None).unwrap().days, 7);
        // 已发放 7 天档后，10 天不再重复发放
        assert!(ladder.highest_reached(10, Some(7)).is_none());
        assert_eq!(ladder.highest_reached(14, Some(7)).unwrap().days, 14);
    }

    #[test]
    fn test_crossed_and_next() {
        let ladder = ladder();
        let crossed: Vec<i64> = ladder.crossed(2, 8).iter().map(|m| m.threshold()).collect();
        assert_eq!(crossed, vec![3, 7]);
        assert!(ladder.crossed(7, 7).is_empty());

        let next = ladder.next_after(7).unwrap();
        assert_eq!(next.threshold, 14);
        assert_eq!(next.remaining, 7);
        assert!(ladder.next_after(14).is_none());
    }

    #[test]
    fn test_grant_expiry() {
        let now = Utc::now();
        let grant = streak(2, 7, true).grant(now);
        assert_eq!(grant.kind, MilestoneKind::Streak);
        assert_eq!(grant.boost_expires_at, now + Duration::hours(48));
        assert!(grant.grants_boost());
    }

    #[test]
    fn test_display_only_milestone() {
        let xp = XpMilestone {
            id: 1,
            xp_threshold: 100,
            reward_description: "入门".to_string(),
            boost_multiplier: 1.0,
            boost_duration_hours: 0,
            is_active: true,
        };
        assert!(!xp.grant(Utc::now()).grants_boost());
    }
}
