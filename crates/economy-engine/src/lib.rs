//! 答题经济引擎
//!
//! 管理提示钱包、连续打卡、里程碑加成、排位赛会话与付费提示包的到账。
//!
//! ## 核心功能
//!
//! - **钱包**：每日免费提示额度优先，其次付费余额；跨天惰性重置
//! - **连续打卡**：按本地自然日推进，超出重置窗口后重新计数
//! - **里程碑**：连续天数与累计经验值两条阶梯，达成后激活限时经验值加成
//! - **排位赛**：每个用户至多一个活跃会话，结算后并入终身累计并更新排行榜
//! - **购买到账**：支付回调验签后按支付会话 ID 幂等入账
//!
//! ## 模块结构
//!
//! - `models`: 领域模型与状态转换
//! - `scoring`: 经验值与排位分计算（纯函数）
//! - `error`: 错误类型定义
//! - `clock`: 时钟与本地日历
//! - `repository`: 仓储 trait、PostgreSQL 与内存实现
//! - `payment`: 提示包目录、回调事件、签名校验、支付方客户端
//! - `consent`: 购买同意记录
//! - `service`: 业务服务层
//! - `engine`: 服务装配

pub mod clock;
pub mod consent;
pub mod engine;
pub mod error;
pub mod models;
pub mod payment;
pub mod repository;
pub mod scoring;
pub mod service;

pub use clock::{Clock, LocalCalendar, ManualClock, SystemClock};
pub use engine::{EconomyEngine, EngineSettings, EngineStores, http_processor};
pub use error::{EconomyError, Result};
pub use models::*;
pub use repository::MemoryStore;
pub use scoring::{Difficulty, compute_learning_xp, compute_ranked_delta};
pub use service::{
    AnswerInput, AnswerOutcome, PurchaseCheckout, ReconcileOutcome, RankedService, WalletService,
};
