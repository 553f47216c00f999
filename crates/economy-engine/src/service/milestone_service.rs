//! 里程碑配置服务
//!
//! 配置表很少变动，读取后按 TTL 缓存整条阶梯。

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use quiz_shared::cache::TtlCache;

use crate::error::{EconomyError, Result};
use crate::models::{MilestoneLadder, StreakMilestone, XpMilestone};
use crate::repository::MilestoneRepositoryTrait;

pub struct MilestoneService {
    repo: Arc<dyn MilestoneRepositoryTrait>,
    streak_ladder: TtlCache<(), Arc<MilestoneLadder<StreakMilestone>>>,
    xp_ladder: TtlCache<(), Arc<MilestoneLadder<XpMilestone>>>,
}

impl MilestoneService {
    pub fn new(repo: Arc<dyn MilestoneRepositoryTrait>, cache_ttl: Duration) -> Self {
        Self {
            repo,
            streak_ladder: TtlCache::new(cache_ttl),
            xp_ladder: TtlCache::new(cache_ttl),
        }
    }

    pub async fn streak_ladder(&self) -> Result<Arc<MilestoneLadder<StreakMilestone>>> {
        self.streak_ladder
            .get_or_try_insert_with((), || async {
                let rows = self.repo.list_streak_milestones().await?;
                debug!(count = rows.len(), "加载连续打卡里程碑");
                Ok::<_, EconomyError>(Arc::new(MilestoneLadder::new(rows)))
            })
            .await
    }

    pub async fn xp_ladder(&self) -> Result<Arc<MilestoneLadder<XpMilestone>>> {
        self.xp_ladder
            .get_or_try_insert_with((), || async {
                let rows = self.repo.list_xp_milestones().await?;
                debug!(count = rows.len(), "加载经验值里程碑");
                Ok::<_, EconomyError>(Arc::new(MilestoneLadder::new(rows)))
            })
            .await
    }

    /// 丢弃缓存的阶梯，下次读取时重新加载
    pub fn invalidate(&self) {
        self.streak_ladder.clear();
        self.xp_ladder.clear();
    }
}
