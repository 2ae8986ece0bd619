use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigError, LoggingConfig, PresenceBackend};
use crate::services::client_manager::IsolatedChannelManager;
use crate::services::heartbeat::{HeartbeatConfig, HeartbeatPublisher};
use crate::services::identity::IdentityProvider;
use crate::services::lease_store::{LeaseStore, LeaseStoreError, MemoryLeaseStore, RedisLeaseStore};
use crate::services::policy::IsolationPolicy;
use crate::services::presence::{
    DiscoveryPresence, LeasePresence, NacosDirectory, PresenceError, PresenceSource,
};
use crate::services::router::{IsolationLayer, RouteResolver};

/// 进程内租约存储使用的地址
pub const MEMORY_LEASE_URL: &str = "memory://";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Presence(#[from] PresenceError),
    #[error(transparent)]
    LeaseStore(#[from] LeaseStoreError),
    #[error("Timed out connecting to lease store after {0:?}")]
    LeaseStoreTimeout(Duration),
}

/// 初始化日志，`RUST_LOG` 优先于配置
pub fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 组装好的隔离路由组件
#[derive(Debug)]
pub struct IsolationRuntime {
    resolver: Arc<RouteResolver>,
    heartbeat: Option<HeartbeatPublisher>,
    task_tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl IsolationRuntime {
    pub async fn from_config(config: &Config) -> Result<Self, RuntimeError> {
        config.validate()?;
        let task_tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();

        if !config.isolation_activated() {
            tracing::info!(
                profiles = ?config.isolation.profiles,
                environments = ?config.isolation.environments,
                "Isolation not started, environment mismatch"
            );
            return Ok(Self {
                resolver: Arc::new(RouteResolver::inactive()),
                heartbeat: None,
                task_tracker,
                shutdown,
            });
        }

        let policy = Arc::new(IsolationPolicy::from_config(&config.isolation)?);
        let identity = Arc::new(IdentityProvider::resolve(&config.isolation)?);
        let lookup_timeout = config.presence.lookup_timeout();

        let (presence, lease_store): (Arc<dyn PresenceSource>, Option<Arc<dyn LeaseStore>>) =
            match config.presence.backend {
                PresenceBackend::Discovery => {
                    let discovery = &config.presence.discovery;
                    let directory = Arc::new(NacosDirectory::new(discovery, lookup_timeout)?);
                    let presence: Arc<dyn PresenceSource> = Arc::new(DiscoveryPresence::new(
                        directory,
                        discovery.group.clone(),
                        discovery.cache_ttl(),
                        lookup_timeout,
                    ));
                    (presence, None)
                }
                PresenceBackend::Lease => {
                    let store = Self::connect_lease_store(config, &task_tracker, &shutdown).await?;
                    let presence: Arc<dyn PresenceSource> = Arc::new(LeasePresence::new(
                        store.clone(),
                        config.presence.lease.key_prefix.clone(),
                        lookup_timeout,
                    ));
                    (presence, Some(store))
                }
            };

        let resolver = Arc::new(RouteResolver::new(
            policy.clone(),
            identity.clone(),
            presence,
            config.isolation.profiles.as_slice(),
        ));

        // 默认环境不发布心跳
        let is_default = policy.is_default_address(identity.address());
        let heartbeat = match (lease_store, &config.isolation.service_name) {
            (Some(store), Some(service_name)) if !is_default => {
                let heartbeat_config = HeartbeatConfig::from_lease_config(
                    &config.presence.lease,
                    service_name,
                    identity.isolation_suffix(),
                );
                let publisher = HeartbeatPublisher::new(store, heartbeat_config);
                publisher.start();
                Some(publisher)
            }
            _ => None,
        };

        tracing::info!(
            local_address = %identity.address(),
            isolation_suffix = %identity.isolation_suffix(),
            default_instance = is_default,
            backend = ?config.presence.backend,
            heartbeat = heartbeat.is_some(),
            "Isolation startup successful"
        );

        Ok(Self {
            resolver,
            heartbeat,
            task_tracker,
            shutdown,
        })
    }

    async fn connect_lease_store(
        config: &Config,
        task_tracker: &TaskTracker,
        shutdown: &CancellationToken,
    ) -> Result<Arc<dyn LeaseStore>, RuntimeError> {
        let lease = &config.presence.lease;
        if lease.url == MEMORY_LEASE_URL {
            let store = MemoryLeaseStore::new();
            store.start_purge_task(lease.lease_ttl(), task_tracker, shutdown.clone());
            return Ok(Arc::new(store));
        }

        let connect_timeout = config.presence.lookup_timeout();
        let store = tokio::time::timeout(connect_timeout, RedisLeaseStore::connect(&lease.url))
            .await
            .map_err(|_| RuntimeError::LeaseStoreTimeout(connect_timeout))??;
        Ok(Arc::new(store))
    }

    pub fn resolver(&self) -> Arc<RouteResolver> {
        self.resolver.clone()
    }

    /// 供出站 HTTP 客户端使用的中间件
    pub fn layer(&self) -> IsolationLayer {
        IsolationLayer::new(self.resolver.clone())
    }

    /// 供出站 gRPC 调用使用的通道管理器
    pub fn channel_manager(&self, connect_timeout: Duration) -> IsolatedChannelManager {
        IsolatedChannelManager::new(self.resolver.clone(), connect_timeout)
    }

    pub fn heartbeat(&self) -> Option<&HeartbeatPublisher> {
        self.heartbeat.as_ref()
    }

    /// 停止后台任务；租约不主动删除，等待过期
    pub async fn shutdown(self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.shutdown().await;
        }
        self.shutdown.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}
