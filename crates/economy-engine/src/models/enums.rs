//! 经济引擎枚举类型定义
//!
//! 持久化的枚举同时支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 提示扣费来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintSource {
    /// 每日免费额度
    Free,
    /// 付费余额
    Paid,
}

impl HintSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
        }
    }
}

/// 钱包流水变动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerChangeType {
    /// 购买到账
    PurchaseCredit,
    /// 运营手工补发
    ManualCredit,
    /// 消耗免费额度（余额不变）
    HintFree,
    /// 消耗付费余额
    HintPaid,
}

impl LedgerChangeType {
    /// 对付费余额的影响方向
    pub fn sign(&self) -> i64 {
        match self {
            Self::PurchaseCredit | Self::ManualCredit => 1,
            Self::HintPaid => -1,
            Self::HintFree => 0,
        }
    }

    pub fn is_credit(&self) -> bool {
        self.sign() > 0
    }
}

/// 购买状态
///
/// pending -> succeeded | failed，终态不可回退
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum PurchaseStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

impl PurchaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// 一次打卡检查对连续天数的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreakTransition {
    /// 首次活动，连续天数从 1 开始
    Started,
    /// 昨天（或重置窗口内）有活动，连续天数 +1
    Continued,
    /// 今天已经打过卡
    Unchanged,
    /// 超过重置窗口，重新从 1 开始
    Reset,
}

impl StreakTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Continued => "continued",
            Self::Unchanged => "unchanged",
            Self::Reset => "reset",
        }
    }

    /// 连续天数是否发生变化
    pub fn advanced(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// 里程碑类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneKind {
    Streak,
    Xp,
}

impl MilestoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streak => "streak",
            Self::Xp => "xp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_change_sign() {
        assert_eq!(LedgerChangeType::PurchaseCredit.sign(), 1);
        assert_eq!(LedgerChangeType::ManualCredit.sign(), 1);
        assert_eq!(LedgerChangeType::HintPaid.sign(), -1);
        assert_eq!(LedgerChangeType::HintFree.sign(), 0);
        assert!(!LedgerChangeType::HintFree.is_credit());
    }

    #[test]
    fn test_purchase_status_terminal() {
        assert!(!PurchaseStatus::Pending.is_terminal());
        assert!(PurchaseStatus::Succeeded.is_terminal());
        assert!(PurchaseStatus::Failed.is_terminal());
    }

    #[test]
    fn test_serde_representation() {
        assert_eq!(
            serde_json::to_string(&PurchaseStatus::Succeeded).unwrap(),
            "\"succeeded\""
        );
        assert_eq!(
            serde_json::to_string(&LedgerChangeType::HintPaid).unwrap(),
            "\"HINT_PAID\""
        );
        assert_eq!(serde_json::to_string(&HintSource::Free).unwrap(), "\"free\"");
        assert_eq!(
            serde_json::to_string(&StreakTransition::Continued).unwrap(),
            "\"CONTINUED\""
        );
    }
}
