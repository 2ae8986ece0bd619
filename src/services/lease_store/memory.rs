use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::{LeaseStore, LeaseStoreError};

// 租约记录，deadline 为空表示永不过期
#[derive(Debug, Clone)]
struct LeaseEntry {
    value: String,
    deadline: Option<Instant>,
}

impl LeaseEntry {
    // 恰好到达 deadline 时仍视为存活
    fn is_live(&self, now: Instant) -> bool {
        self.deadline.is_none_or(|deadline| now <= deadline)
    }
}

/// 进程内租约存储，单机部署和测试使用
#[derive(Debug, Clone, Default)]
pub struct MemoryLeaseStore {
    entries: Arc<DashMap<String, LeaseEntry>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前存活的租约数量
    pub fn live_count(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|entry| entry.is_live(now)).count()
    }

    /// 清理过期租约，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed_count = removed, "Purged expired leases");
        }
        removed
    }

    /// 启动定期清理任务，读取时也会惰性清理
    pub fn start_purge_task(
        &self,
        interval: Duration,
        task_tracker: &TaskTracker,
        shutdown: CancellationToken,
    ) {
        let store = self.clone();
        task_tracker.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        store.purge_expired();
                    }
                }
            }
        });
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        None
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), LeaseStoreError> {
        self.entries.insert(
            key.to_string(),
            LeaseEntry {
                value: value.to_string(),
                deadline: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LeaseStoreError> {
        self.entries.insert(
            key.to_string(),
            LeaseEntry {
                value: value.to_string(),
                deadline: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LeaseStoreError> {
        Ok(self.live_value(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LeaseStoreError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.deadline = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> Result<bool, LeaseStoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expire_extends_live_lease_only() {
        let store = MemoryLeaseStore::new();
        store
            .set_ex("lease", "svc-orders", Duration::from_secs(2))
            .await
            .unwrap();

        assert!(store.expire("lease", Duration::from_secs(10)).await.unwrap());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            store.get("lease").await.unwrap().as_deref(),
            Some("svc-orders")
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!store.expire("lease", Duration::from_secs(10)).await.unwrap());
        assert_eq!(store.get("lease").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_removes_only_expired() {
        let store = MemoryLeaseStore::new();
        store.set("static", "1").await.unwrap();
        store
            .set_ex("short", "1", Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.live_count(), 1);
        assert!(store.del("static").await.unwrap());
        assert!(!store.del("static").await.unwrap());
    }
}
