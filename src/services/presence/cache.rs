use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use super::types::PresenceError;

type LoadResult = Result<Arc<Vec<String>>, PresenceError>;
type PendingLoad = Shared<BoxFuture<'static, LoadResult>>;

/// 不可变快照，刷新时整体替换
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub instances: Arc<Vec<String>>,
    pub fetched_at: Instant,
}

enum Slot {
    Ready(Snapshot),
    // 同一 key 的并发未命中共享这一次加载
    Loading(PendingLoad),
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Ready(snapshot) => f.debug_tuple("Ready").field(snapshot).finish(),
            Slot::Loading(_) => f.write_str("Loading"),
        }
    }
}

/// 带 TTL 的单飞缓存
#[derive(Debug, Clone)]
pub struct PresenceCache {
    slots: Arc<DashMap<String, Slot>>,
    ttl: Duration,
}

impl PresenceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 命中且未过期直接返回；否则加入进行中的加载或发起新的加载。
    /// 加载失败不缓存，错误分发给本次加载的所有等待者。
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> LoadResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>, PresenceError>> + Send + 'static,
    {
        // 新鲜快照只需读锁，读引用在进入 entry 之前释放
        if let Some(instances) = self.fresh(key) {
            return Ok(instances);
        }

        let pending = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let joined = match occupied.get() {
                    Slot::Ready(snapshot) if snapshot.fetched_at.elapsed() < self.ttl => {
                        return Ok(snapshot.instances.clone());
                    }
                    Slot::Ready(_) => None,
                    Slot::Loading(pending) => Some(pending.clone()),
                };
                match joined {
                    Some(pending) => pending,
                    None => {
                        tracing::debug!(cache_key = %key, "Presence cache entry expired");
                        let pending = Self::start_load(load);
                        occupied.insert(Slot::Loading(pending.clone()));
                        pending
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let pending = Self::start_load(load);
                vacant.insert(Slot::Loading(pending.clone()));
                pending
            }
        };

        let result = pending.clone().await;
        self.settle(key, &pending, &result);
        result
    }

    fn fresh(&self, key: &str) -> Option<Arc<Vec<String>>> {
        match self.slots.get(key).as_deref() {
            Some(Slot::Ready(snapshot)) if snapshot.fetched_at.elapsed() < self.ttl => {
                Some(snapshot.instances.clone())
            }
            _ => None,
        }
    }

    /// 丢弃某个 key 的缓存
    pub fn invalidate(&self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn start_load<F, Fut>(load: F) -> PendingLoad
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>, PresenceError>> + Send + 'static,
    {
        load().map(|result| result.map(Arc::new)).boxed().shared()
    }

    // 只处理仍属于本次加载的槽位，不覆盖之后发起的加载
    fn settle(&self, key: &str, pending: &PendingLoad, result: &LoadResult) {
        match result {
            Ok(instances) => {
                if let Some(mut slot) = self.slots.get_mut(key) {
                    if matches!(&*slot, Slot::Loading(current) if current.ptr_eq(pending)) {
                        *slot = Slot::Ready(Snapshot {
                            instances: instances.clone(),
                            fetched_at: Instant::now(),
                        });
                        tracing::debug!(
                            cache_key = %key,
                            instance_count = instances.len(),
                            "Presence cache populated"
                        );
                    }
                }
            }
            Err(e) => {
                let removed = self.slots.remove_if(key, |_, slot| {
                    matches!(slot, Slot::Loading(current) if current.ptr_eq(pending))
                });
                if removed.is_some() {
                    tracing::warn!(cache_key = %key, error = %e, "Presence cache load failed");
                }
            }
        }
    }
}
