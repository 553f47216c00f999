//! 数据库仓储层
//!
//! 提供钱包、进度、里程碑、排位赛和购买记录的数据访问接口。
//!
//! ## 设计原则
//!
//! - 每个 trait 方法是一个原子单元，实现内部自行开启并提交事务
//! - 状态计算放在模型层，仓储只负责加锁、读写和提交
//! - 跨仓储的事务通过 `*_in_tx(&mut PgConnection, ..)` 静态方法组合
//! - 定义 trait 接口以支持 mock 测试和内存实现

mod memory;
mod milestone_repo;
mod progress_repo;
mod purchase_repo;
mod ranked_repo;
mod traits;
mod wallet_repo;

pub use memory::{ConsentRecord, MemoryStore, default_streak_milestones, default_xp_milestones};
pub use milestone_repo::MilestoneRepository;
pub use progress_repo::ProgressRepository;
pub use purchase_repo::PurchaseRepository;
pub use ranked_repo::RankedRepository;
pub use traits::*;
pub use wallet_repo::WalletRepository;

use crate::error::EconomyError;

/// 唯一约束冲突视为并发冲突，其余数据库错误原样上抛
pub(crate) fn unique_violation_as_conflict(err: sqlx::Error) -> EconomyError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => EconomyError::ConcurrencyConflict,
        _ => EconomyError::Database(err),
    }
}
