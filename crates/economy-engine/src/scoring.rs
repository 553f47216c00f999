//! 计分引擎
//!
//! 纯函数：由难度、耗时、提示使用次数计算学习经验值和排位赛分数变化。
//! 无状态、无 I/O，相同输入永远得到相同输出。

use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, Result};

/// 每级难度的基础经验值
pub const XP_PER_DIFFICULTY: i64 = 10;
/// 每使用一次提示扣除的经验值
pub const XP_HINT_PENALTY: i64 = 3;
/// 经验值时间加成上限，单位为基点（2000 = +20%）
pub const XP_MAX_TIME_BONUS_BP: i64 = 2_000;
const BASIS_POINTS: i64 = 10_000;
/// 经验值时间加成衰减到 0 的耗时（毫秒）
pub const XP_TIME_BONUS_WINDOW_MS: u64 = 30_000;
/// 单题最少经验值
pub const MIN_LEARNING_XP: i64 = 1;

/// 排位赛每级难度的基础分
pub const RANKED_POINTS_PER_DIFFICULTY: i64 = 100;
/// 排位赛时间加成上限
pub const RANKED_MAX_TIME_BONUS: i64 = 50;
/// 排位赛时间加成衰减到 0 的耗时（毫秒）
pub const RANKED_TIME_BONUS_WINDOW_MS: u64 = 15_000;
/// 排位赛每次提示扣分
pub const RANKED_HINT_PENALTY: i64 = 25;

/// 题目难度，取值 1..=5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 5;

    pub fn new(value: i32) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(EconomyError::InvalidDifficulty(value))
        }
    }

    pub fn value(self) -> i64 {
        i64::from(self.0)
    }
}

impl TryFrom<i32> for Difficulty {
    type Error = EconomyError;

    fn try_from(value: i32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Difficulty> for i32 {
    fn from(d: Difficulty) -> Self {
        i32::from(d.0)
    }
}

/// 计算答对一题获得的学习经验值（加成前）
///
/// 基础值 = 难度 × 10，每次提示扣 3（最低扣到 0），
/// 再乘以时间加成（0 秒时 +20%，线性衰减至 30 秒为 0），向下取整，最低 1。
pub fn compute_learning_xp(difficulty: Difficulty, hints_used: u32, elapsed_ms: u64) -> i64 {
    let base = (difficulty.value() * XP_PER_DIFFICULTY
        - i64::from(hints_used) * XP_HINT_PENALTY)
        .max(0);

    let bonus_bp = if elapsed_ms < XP_TIME_BONUS_WINDOW_MS {
        XP_MAX_TIME_BONUS_BP * (XP_TIME_BONUS_WINDOW_MS - elapsed_ms) as i64
            / XP_TIME_BONUS_WINDOW_MS as i64
    } else {
        0
    };

    // 整数运算，避免浮点误差影响取整
    let xp = base * (BASIS_POINTS + bonus_bp) / BASIS_POINTS;
    xp.max(MIN_LEARNING_XP)
}

/// 计算排位赛单题分数变化
///
/// 答对：难度 × 100 + 时间加成（最多 50，15 秒内线性衰减）− 每次提示 25，不设下限。
/// 答错：固定扣除难度 × 50。
pub fn compute_ranked_delta(
    difficulty: Difficulty,
    elapsed_ms: u64,
    hints_used: u32,
    correct: bool,
) -> i64 {
    let base = difficulty.value() * RANKED_POINTS_PER_DIFFICULTY;
    if !correct {
        return -(base / 2);
    }

    let time_bonus = if elapsed_ms < RANKED_TIME_BONUS_WINDOW_MS {
        RANKED_MAX_TIME_BONUS * (RANKED_TIME_BONUS_WINDOW_MS - elapsed_ms) as i64
            / RANKED_TIME_BONUS_WINDOW_MS as i64
    } else {
        0
    };

    base + time_bonus - i64::from(hints_used) * RANKED_HINT_PENALTY
}

/// 按当前加成倍率放大经验值，四舍五入，最低 1
pub fn apply_xp_multiplier(base_xp: i64, multiplier: f64) -> i64 {
    if multiplier <= 1.0 || !multiplier.is_finite() {
        return base_xp.max(MIN_LEARNING_XP);
    }
    ((base_xp as f64 * multiplier).round() as i64).max(MIN_LEARNING_XP)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(value: i32) -> Difficulty {
        Difficulty::new(value).unwrap()
    }

    #[test]
    fn test_difficulty_bounds() {
        assert!(Difficulty::new(0).is_err());
        assert!(Difficulty::new(6).is_err());
        assert_eq!(d(1).value(), 1);
        assert_eq!(d(5).value(), 5);
        assert!(matches!(
            Difficulty::new(-3),
            Err(EconomyError::InvalidDifficulty(-3))
        ));
    }

    #[test]
    fn test_difficulty_serde_rejects_out_of_range() {
        let ok: Difficulty = serde_json::from_str("3").unwrap();
        assert_eq!(ok, d(3));
        assert!(serde_json::from_str::<Difficulty>("7").is_err());
        assert_eq!(serde_json::to_string(&d(4)).unwrap(), "4");
    }

    #[test]
    fn test_learning_xp_examples() {
        // 难度 3、无提示、无耗时：30 × 1.2
        assert_eq!(compute_learning_xp(d(3), 0, 0), 36);
        // 超过加成窗口
        assert_eq!(compute_learning_xp(d(3), 0, 30_000), 30);
        // 15 秒：30 × 1.1
        assert_eq!(compute_learning_xp(d(3), 0, 15_000), 33);
        // 两次提示：24 × 1.0
        assert_eq!(compute_learning_xp(d(3), 2, 60_000), 24);
    }

    #[test]
    fn test_learning_xp_never_below_one() {
        for difficulty in 1..=5 {
            for hints in [0u32, 1, 3, 10, 1_000] {
                for elapsed in [0u64, 1, 14_999, 30_000, 3_600_000, u64::MAX] {
                    assert!(compute_learning_xp(d(difficulty), hints, elapsed) >= 1);
                }
            }
        }
        assert_eq!(compute_learning_xp(d(1), 50, 0), 1);
    }

    #[test]
    fn test_ranked_delta_correct() {
        // 5 秒：300 + 50 × 10000 / 15000 = 333
        assert_eq!(compute_ranked_delta(d(3), 5_000, 0, true), 333);
        assert_eq!(compute_ranked_delta(d(3), 0, 0, true), 350);
        assert_eq!(compute_ranked_delta(d(3), 15_000, 0, true), 300);
        assert_eq!(compute_ranked_delta(d(3), 20_000, 2, true), 250);
    }

    #[test]
    fn test_ranked_delta_incorrect_costs_half_base() {
        for difficulty in 1..=5 {
            let delta = compute_ranked_delta(d(difficulty), 0, 0, false);
            assert_eq!(delta, -(i64::from(difficulty) * 50));
        }
        // 答错时提示和耗时不影响扣分
        assert_eq!(compute_ranked_delta(d(2), 99_999, 4, false), -100);
    }

    #[test]
    fn test_ranked_delta_monotonic_in_hints_and_time() {
        for difficulty in 1..=5 {
            let mut previous = i64::MAX;
            for hints in 0..10 {
                let delta = compute_ranked_delta(d(difficulty), 3_000, hints, true);
                assert!(delta <= previous);
                previous = delta;
            }

            let mut previous = i64::MAX;
            for elapsed in (0..40_000).step_by(500) {
                let delta = compute_ranked_delta(d(difficulty), elapsed, 1, true);
                assert!(delta <= previous);
                previous = delta;
            }
        }
    }

    #[test]
    fn test_apply_xp_multiplier() {
        assert_eq!(apply_xp_multiplier(33, 1.5), 50);
        assert_eq!(apply_xp_multiplier(30, 1.0), 30);
        assert_eq!(apply_xp_multiplier(1, 1.2), 1);
        assert_eq!(apply_xp_multiplier(10, f64::NAN), 10);
    }
}
