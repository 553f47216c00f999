//! 引擎装配
//!
//! 把仓储、支付方、缓存和时钟组装成一组服务。缓存实例随引擎创建，
//! 关闭时由 `shutdown` 清空，不存在进程级全局状态。

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::info;

use quiz_shared::config::AppConfig;

use crate::clock::{Clock, LocalCalendar, SystemClock};
use crate::consent::{ConsentLogger, PgConsentLogger};
use crate::error::Result;
use crate::models::StreakPolicy;
use crate::payment::{HttpPaymentProcessor, PackCatalog, PaymentProcessor, SignatureVerifier};
use crate::repository::{
    MemoryStore, MilestoneRepository, MilestoneRepositoryTrait, ProgressRepository,
    ProgressRepositoryTrait, PurchaseRepository, PurchaseRepositoryTrait, RankedRepository,
    RankedRepositoryTrait, WalletRepository, WalletRepositoryTrait,
};
use crate::service::{
    CheckoutSettings, LeaderboardCache, MilestoneService, ProgressionService, PurchaseService,
    RankedService, StreakService, WalletService,
};

/// 引擎依赖的外部存储与协作方
#[derive(Clone)]
pub struct EngineStores {
    pub wallets: Arc<dyn WalletRepositoryTrait>,
    pub progress: Arc<dyn ProgressRepositoryTrait>,
    pub milestones: Arc<dyn MilestoneRepositoryTrait>,
    pub ranked: Arc<dyn RankedRepositoryTrait>,
    pub purchases: Arc<dyn PurchaseRepositoryTrait>,
    pub consent: Arc<dyn ConsentLogger>,
    pub processor: Arc<dyn PaymentProcessor>,
}

impl EngineStores {
    /// PostgreSQL 实现
    pub fn postgres(pool: PgPool, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            wallets: Arc::new(WalletRepository::new(pool.clone())),
            progress: Arc::new(ProgressRepository::new(pool.clone())),
            milestones: Arc::new(MilestoneRepository::new(pool.clone())),
            ranked: Arc::new(RankedRepository::new(pool.clone())),
            purchases: Arc::new(PurchaseRepository::new(pool.clone())),
            consent: Arc::new(PgConsentLogger::new(pool)),
            processor,
        }
    }

    /// 全部落在同一个内存存储上
    pub fn memory(store: Arc<MemoryStore>, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            wallets: store.clone(),
            progress: store.clone(),
            milestones: store.clone(),
            ranked: store.clone(),
            purchases: store.clone(),
            consent: store,
            processor,
        }
    }
}

/// 引擎规则参数
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub calendar: LocalCalendar,
    pub streak_policy: StreakPolicy,
    pub daily_free_hints: i32,
    pub leaderboard_max_limit: i64,
    pub leaderboard_cache_ttl: Duration,
    pub milestone_cache_ttl: Duration,
    pub catalog: PackCatalog,
    pub verifier: SignatureVerifier,
    pub checkout: CheckoutSettings,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let economy = &config.economy;
        let payment = &config.payment;
        let calendar = LocalCalendar::from_offset_minutes(economy.day_offset_minutes);

        Ok(Self {
            calendar,
            streak_policy: StreakPolicy {
                reset_window: chrono::Duration::hours(economy.streak_reset_hours.max(1)),
                calendar,
            },
            daily_free_hints: economy.daily_free_hints,
            leaderboard_max_limit: economy.leaderboard_max_limit,
            leaderboard_cache_ttl: Duration::from_secs(economy.leaderboard_cache_ttl_seconds),
            milestone_cache_ttl: Duration::from_secs(economy.milestone_cache_ttl_seconds),
            catalog: PackCatalog::from_config(&payment.packs)?,
            verifier: SignatureVerifier::new(
                &payment.webhook_secret,
                chrono::Duration::seconds(payment.signature_tolerance_seconds),
            ),
            checkout: CheckoutSettings {
                currency: payment.currency.clone(),
                success_url: payment.success_url.clone(),
                cancel_url: payment.cancel_url.clone(),
            },
        })
    }
}

/// 按配置创建 HTTP 支付方客户端
pub fn http_processor(config: &AppConfig) -> Result<Arc<dyn PaymentProcessor>> {
    let payment = &config.payment;
    Ok(Arc::new(HttpPaymentProcessor::new(
        &payment.api_base_url,
        &payment.api_key,
        Duration::from_secs(payment.request_timeout_seconds),
    )?))
}

/// 经济引擎
pub struct EconomyEngine {
    pub wallet: Arc<WalletService>,
    pub streaks: Arc<StreakService>,
    pub progression: Arc<ProgressionService>,
    pub ranked: Arc<RankedService>,
    pub purchases: Arc<PurchaseService>,
    pub milestones: Arc<MilestoneService>,
    leaderboard_cache: Arc<LeaderboardCache>,
}

impl EconomyEngine {
    pub fn new(stores: EngineStores, settings: EngineSettings, clock: Arc<dyn Clock>) -> Self {
        let milestones = Arc::new(MilestoneService::new(
            stores.milestones.clone(),
            settings.milestone_cache_ttl,
        ));
        let streaks = Arc::new(StreakService::new(
            stores.progress.clone(),
            milestones.clone(),
            clock.clone(),
            settings.streak_policy,
        ));
        let progression = Arc::new(ProgressionService::new(
            streaks.clone(),
            milestones.clone(),
            stores.progress.clone(),
            clock.clone(),
        ));
        let leaderboard_cache = Arc::new(LeaderboardCache::new(settings.leaderboard_cache_ttl));
        let ranked = Arc::new(RankedService::new(
            stores.ranked.clone(),
            clock.clone(),
            leaderboard_cache.clone(),
            settings.leaderboard_max_limit,
        ));
        let wallet = Arc::new(WalletService::new(
            stores.wallets.clone(),
            clock.clone(),
            settings.calendar,
            settings.daily_free_hints,
        ));
        let purchases = Arc::new(PurchaseService::new(
            stores.purchases.clone(),
            stores.processor.clone(),
            stores.consent.clone(),
            settings.catalog,
            settings.verifier,
            settings.checkout,
            clock,
            settings.calendar,
        ));

        info!(
            daily_free_hints = settings.daily_free_hints,
            leaderboard_max_limit = settings.leaderboard_max_limit,
            "经济引擎已初始化"
        );

        Self {
            wallet,
            streaks,
            progression,
            ranked,
            purchases,
            milestones,
            leaderboard_cache,
        }
    }

    /// 生产装配：PostgreSQL 仓储 + 系统时钟
    pub fn with_postgres(
        pool: PgPool,
        processor: Arc<dyn PaymentProcessor>,
        settings: EngineSettings,
    ) -> Self {
        Self::new(
            EngineStores::postgres(pool, processor),
            settings,
            Arc::new(SystemClock),
        )
    }

    /// 内存装配，返回底层存储便于测试检查状态
    pub fn in_memory(
        processor: Arc<dyn PaymentProcessor>,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_default_milestones());
        let engine = Self::new(
            EngineStores::memory(store.clone(), processor),
            settings,
            clock,
        );
        (engine, store)
    }

    /// 清空进程内缓存
    pub fn shutdown(&self) {
        self.leaderboard_cache.clear();
        self.milestones.invalidate();
        info!("经济引擎缓存已清空");
    }
}
