use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::LeaseConfig;
use crate::services::lease_store::{LeaseStore, LeaseStoreError};
use crate::services::presence::lease_key;

/// 心跳错误，只记录日志，不影响路由
#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("Heartbeat write timed out after {0:?}")]
    Timeout(Duration),
    #[error("Heartbeat write failed: {0}")]
    Store(#[from] LeaseStoreError),
}

/// 心跳配置
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// 本实例的租约 key
    pub key: String,
    /// 租约值，即本服务的逻辑名
    pub value: String,
    pub interval: Duration,
    pub lease_ttl: Duration,
    pub initial_delay: Duration,
    pub write_timeout: Duration,
}

impl HeartbeatConfig {
    pub fn from_lease_config(lease: &LeaseConfig, service_name: &str, suffix: &str) -> Self {
        Self {
            key: lease_key(&lease.key_prefix, service_name, suffix),
            value: service_name.to_string(),
            interval: lease.heartbeat_interval(),
            lease_ttl: lease.lease_ttl(),
            initial_delay: lease.initial_delay(),
            write_timeout: lease.write_timeout(),
        }
    }
}

// 心跳统计信息
#[derive(Debug, Default)]
struct HeartbeatStats {
    published: AtomicU64,
    failed: AtomicU64,
}

/// 隔离实例的心跳发布器。
///
/// 固定延迟循环写入租约；某次失败只记日志，下一次继续。
/// 停止时不删除租约，由 TTL 到期表示实例下线。
#[derive(Debug)]
pub struct HeartbeatPublisher {
    store: Arc<dyn LeaseStore>,
    config: HeartbeatConfig,
    stats: Arc<HeartbeatStats>,
    task_tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl HeartbeatPublisher {
    pub fn new(store: Arc<dyn LeaseStore>, config: HeartbeatConfig) -> Self {
        Self {
            store,
            config,
            stats: Arc::new(HeartbeatStats::default()),
            task_tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    pub fn published_count(&self) -> u64 {
        self.stats.published.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    /// 启动心跳任务，每个进程只应启动一次
    pub fn start(&self) {
        let store = self.store.clone();
        let config = self.config.clone();
        let stats = self.stats.clone();
        let shutdown = self.shutdown.clone();

        tracing::info!(
            lease_key = %config.key,
            interval_secs = config.interval.as_secs(),
            lease_ttl_secs = config.lease_ttl.as_secs(),
            "Starting heartbeat publisher"
        );

        self.task_tracker.spawn(async move {
            let mut delay = config.initial_delay;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                match Self::publish(store.as_ref(), &config).await {
                    Ok(()) => {
                        stats.published.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(lease_key = %config.key, "Heartbeat published");
                    }
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            lease_key = %config.key,
                            error = %e,
                            "Heartbeat missed, lease may expire before next tick"
                        );
                    }
                }
                delay = config.interval;
            }

            tracing::info!(
                lease_key = %config.key,
                "Heartbeat publisher stopped, lease expires after its ttl"
            );
        });
    }

    /// 立即写入一次租约
    pub async fn publish_once(&self) -> Result<(), HeartbeatError> {
        Self::publish(self.store.as_ref(), &self.config).await
    }

    /// 停止心跳任务并等待退出，不删除租约
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }

    async fn publish(store: &dyn LeaseStore, config: &HeartbeatConfig) -> Result<(), HeartbeatError> {
        tokio::time::timeout(
            config.write_timeout,
            store.set_ex(&config.key, &config.value, config.lease_ttl),
        )
        .await
        .map_err(|_| HeartbeatError::Timeout(config.write_timeout))??;
        Ok(())
    }
}

impl Drop for HeartbeatPublisher {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.task_tracker.close();
    }
}
