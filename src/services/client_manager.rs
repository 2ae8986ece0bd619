use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tonic::transport::{Channel, Endpoint};

use super::router::{RouteResolver, RouterError};

pub type ChannelPool = Arc<RwLock<HashMap<String, Channel>>>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Route resolution failed: {0}")]
    Route(#[from] RouterError),
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// 出站 gRPC 通道管理：先经路由决策得到目标地址，再按目标地址复用通道
#[derive(Debug, Clone)]
pub struct IsolatedChannelManager {
    resolver: Arc<RouteResolver>,
    channels: ChannelPool,
    connect_timeout: Duration,
}

impl IsolatedChannelManager {
    pub fn new(resolver: Arc<RouteResolver>, connect_timeout: Duration) -> Self {
        Self {
            resolver,
            channels: Arc::new(RwLock::new(HashMap::new())),
            connect_timeout,
        }
    }

    /// 返回目标服务的通道，路由失败时不创建通道
    pub async fn channel_for(&self, url: &str) -> Result<Channel, ClientError> {
        let target = self.resolver.resolve(url).await?;

        // 先尝试从缓存获取通道
        {
            let channels = self.channels.read().await;
            if let Some(channel) = channels.get(&target) {
                return Ok(channel.clone());
            }
        }

        // 缓存中没有，创建延迟连接的通道
        let channel = Endpoint::from_shared(target.clone())?
            .connect_timeout(self.connect_timeout)
            .connect_lazy();

        let mut channels = self.channels.write().await;
        let channel = channels.entry(target.clone()).or_insert(channel).clone();
        tracing::debug!(destination = %url, target = %target, "Created outbound channel");
        Ok(channel)
    }

    /// 已缓存通道的目标地址
    pub async fn cached_targets(&self) -> Vec<String> {
        let channels = self.channels.read().await;
        let mut targets: Vec<String> = channels.keys().cloned().collect();
        targets.sort();
        targets
    }

    pub async fn remove_channel(&self, target: &str) -> bool {
        let mut channels = self.channels.write().await;
        let removed = channels.remove(target).is_some();
        if removed {
            tracing::debug!(target = %target, "Removed outbound channel");
        }
        removed
    }

    pub async fn clear_all(&self) {
        let mut channels = self.channels.write().await;
        let count = channels.len();
        channels.clear();
        tracing::debug!(channel_count = count, "Cleared outbound channels");
    }
}
