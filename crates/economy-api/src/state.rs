//! 应用状态定义
//!
//! 引擎、认证和限流器在启动时创建一次，通过 Arc 在 handler 间共享

use std::sync::Arc;

use sha2::{Digest, Sha256};

use economy_engine::EconomyEngine;
use quiz_shared::config::AppConfig;
use quiz_shared::database::Database;
use quiz_shared::rate_limit::RateLimiter;

use crate::auth::JwtVerifier;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EconomyEngine>,
    pub jwt: Arc<JwtVerifier>,
    pub limiter: Arc<RateLimiter>,
    /// 运营密钥的 SHA256，未配置时运营接口全部拒绝
    pub admin_key_hash: Option<String>,
    /// 内存装配时为空
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(engine: Arc<EconomyEngine>, config: &AppConfig, database: Option<Database>) -> Self {
        let limiter = RateLimiter::new(
            config.rate_limit.max_requests,
            std::time::Duration::from_secs(config.rate_limit.window_seconds.max(1)),
        );
        Self {
            engine,
            jwt: Arc::new(JwtVerifier::new(&config.auth)),
            limiter: Arc::new(limiter),
            admin_key_hash: config
                .auth
                .admin_api_key
                .as_deref()
                .filter(|key| !key.is_empty())
                .map(hash_api_key),
            database,
        }
    }

    /// 关闭时清空进程内状态
    pub fn shutdown(&self) {
        self.engine.shutdown();
        self.limiter.clear();
    }
}

/// 计算 API Key 的 SHA256 哈希
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
