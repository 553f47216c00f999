//! 服务层
//!
//! 实现经济系统业务逻辑，协调仓储层、缓存和支付方。
//!
//! ## 模块结构
//!
//! - `wallet_service`: 钱包查询、提示扣费、入账
//! - `streak_service`: 连续打卡与经验值加成
//! - `milestone_service`: 里程碑配置缓存
//! - `progression_service`: 答题经验值流水线与进度概览
//! - `ranked_service`: 排位赛会话与排行榜
//! - `purchase_service`: 下单与支付回调对账

pub mod milestone_service;
pub mod progression_service;
pub mod purchase_service;
pub mod ranked_service;
pub mod streak_service;
pub mod wallet_service;

pub use milestone_service::MilestoneService;
pub use progression_service::{AnswerInput, AnswerOutcome, ProgressionService};
pub use purchase_service::{CheckoutSettings, PurchaseCheckout, PurchaseService, ReconcileOutcome};
pub use ranked_service::{LeaderboardCache, RankedService};
pub use streak_service::StreakService;
pub use wallet_service::WalletService;
