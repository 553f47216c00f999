//! PostgreSQL 连接池
//!
//! 钱包、购买与排位赛的原子操作都依赖同一个池里的事务；
//! 迁移脚本编译期嵌入，启动时按配置执行。

use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::DatabaseConfig;
use crate::error::{Result, SharedError};

/// 连接池快照，供就绪探针展示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub max_connections: u32,
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    max_connections: u32,
}

impl Database {
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if config.min_connections > config.max_connections {
            warn!(
                min = config.min_connections,
                max = config.max_connections,
                "min_connections 大于 max_connections，按最大值处理"
            );
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections.min(config.max_connections))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!("经济库连接池就绪");

        Ok(Self {
            pool,
            max_connections: config.max_connections,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX),
            max_connections: self.max_connections,
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(SharedError::from)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("经济库连接池已关闭");
    }

    /// 执行 migrations/ 下的建表脚本
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("数据库迁移完成");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_connect_migrate_and_report_stats() {
        let config = DatabaseConfig {
            url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url),
            ..DatabaseConfig::default()
        };
        let db = Database::connect(&config).await.unwrap();
        db.health_check().await.unwrap();
        db.run_migrations().await.unwrap();

        let stats = db.stats();
        assert_eq!(stats.max_connections, config.max_connections);
        assert!(stats.size <= stats.max_connections);

        db.close().await;
    }
}
