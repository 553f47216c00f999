//! 进程内 TTL 缓存
//!
//! 以 DashMap 为底层存储，条目在写入时记录过期时刻，读取时惰性淘汰。
//! 缓存实例作为服务状态注入，不使用全局单例，测试和关闭流程可以直接清空。
//! 每次清空都会推进代数，加载期间发生过清空的结果不会再被读到。

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
    /// 写入时对应的加载代数
    generation: u64,
}

/// 带过期时间的键值缓存
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    generation: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            generation: AtomicU64::new(0),
        }
    }

    /// 读取未过期且属于当前代的值，其余条目顺带删除
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let generation = self.generation.load(Ordering::Acquire);
        let is_live = |e: &Entry<V>| e.expires_at > now && e.generation == generation;
        if let Some(entry) = self.entries.get(key) {
            if is_live(&entry) {
                return Some(entry.value.clone());
            }
        }
        // 读锁已释放，再按条件删除，避免并发写入的新值被误删
        self.entries.remove_if(key, |_, e| !is_live(e));
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let generation = self.generation.load(Ordering::Acquire);
        self.insert_at(key, value, generation);
    }

    fn insert_at(&self, key: K, value: V, generation: u64) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
                generation,
            },
        );
    }

    /// 读取缓存，未命中时调用 loader 并写入
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(cached) = self.get(&key) {
            return Ok(cached);
        }
        let generation = self.generation.load(Ordering::Acquire);
        let value = loader().await?;
        // 加载期间发生过失效时，旧代条目即使写入也不会被读到
        if self.generation.load(Ordering::Acquire) == generation {
            self.insert_at(key, value.clone(), generation);
        }
        Ok(value)
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    /// 当前条目数（包含尚未被淘汰的过期条目）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
