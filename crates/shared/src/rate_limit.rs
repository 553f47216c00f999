//! 进程内固定窗口限流器
//!
//! 按 key（通常是用户 ID）计数，窗口到期后计数归零。
//! 单实例部署下替代外部计数器，作为应用状态注入。
//! 窗口数超过阈值时，下一次请求顺带清理过期窗口，内存随活跃用户数而不是历史用户数增长。

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// 限流判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// 当前窗口剩余可用次数
    pub remaining: u32,
    /// 距离窗口重置的时间
    pub retry_after: Duration,
}

struct Window {
    started_at: Instant,
    count: u32,
}

/// 默认清理阈值
const DEFAULT_PURGE_THRESHOLD: usize = 10_000;

/// 固定窗口限流器
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    max_requests: u32,
    window: Duration,
    purge_threshold: usize,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            purge_threshold: DEFAULT_PURGE_THRESHOLD,
        }
    }

    /// 调整触发清理的窗口数
    pub fn with_purge_threshold(mut self, threshold: usize) -> Self {
        self.purge_threshold = threshold.max(1);
        self
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// 记录一次请求并返回是否放行
    pub fn check(&self, key: &str) -> RateLimitDecision {
        if self.windows.len() >= self.purge_threshold {
            self.purge_expired();
        }

        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        let retry_after = self
            .window
            .saturating_sub(now.duration_since(entry.started_at));

        if entry.count >= self.max_requests {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: self.max_requests - entry.count,
            retry_after,
        }
    }

    /// 清空全部计数
    pub fn clear(&self) {
        self.windows.clear();
    }

    /// 当前跟踪的窗口数
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// 清理已过期的窗口
    fn purge_expired(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started_at) < self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert_eq!(limiter.check("u1").remaining, 2);
        assert_eq!(limiter.check("u1").remaining, 1);
        assert!(limiter.check("u1").allowed);

        let denied = limiter.check("u1");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after <= Duration::from_secs(60));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("u1").allowed);
        assert!(!limiter.check("u1").allowed);
        assert!(limiter.check("u2").allowed);
    }

    #[test]
    fn test_window_reset() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        assert!(limiter.check("u1").allowed);
        // 零长度窗口每次都重新开始
        assert!(limiter.check("u1").allowed);
    }

    #[test]
    fn test_expired_windows_are_purged_past_threshold() {
        let limiter = RateLimiter::new(5, Duration::ZERO).with_purge_threshold(3);
        for i in 0..3 {
            limiter.check(&format!("user-{i}"));
        }
        assert_eq!(limiter.tracked_keys(), 3);

        // 零长度窗口全部过期，超过阈值后只剩本次请求的窗口
        assert!(limiter.check("user-new").allowed);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_live_windows_survive_purge() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60)).with_purge_threshold(2);
        assert!(limiter.check("u1").allowed);
        assert!(limiter.check("u2").allowed);
        assert!(limiter.check("u3").allowed);
        assert_eq!(limiter.tracked_keys(), 3);
        assert!(!limiter.check("u1").allowed);
    }

    #[test]
    fn test_clear() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("u1").allowed);
        limiter.clear();
        assert!(limiter.check("u1").allowed);
    }
}
