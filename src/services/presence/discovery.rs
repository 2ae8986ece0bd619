use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::cache::PresenceCache;
use super::types::{PresenceError, PresenceSource};

/// 服务发现目录，返回分组下所有已注册的服务名
#[async_trait]
pub trait DiscoveryDirectory: Send + Sync + fmt::Debug {
    async fn service_names(&self, group: &str) -> Result<Vec<String>, PresenceError>;
}

/// 基于服务发现目录的实例查询。
///
/// 整个分组的服务列表按分组缓存，查询时在本地按前缀过滤。
#[derive(Debug, Clone)]
pub struct DiscoveryPresence {
    directory: Arc<dyn DiscoveryDirectory>,
    group: String,
    cache: PresenceCache,
    lookup_timeout: Duration,
}

impl DiscoveryPresence {
    pub fn new(
        directory: Arc<dyn DiscoveryDirectory>,
        group: impl Into<String>,
        cache_ttl: Duration,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            group: group.into(),
            cache: PresenceCache::new(cache_ttl),
            lookup_timeout,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn cache(&self) -> &PresenceCache {
        &self.cache
    }

    async fn all_services(&self) -> Result<Arc<Vec<String>>, PresenceError> {
        let directory = self.directory.clone();
        let group = self.group.clone();
        let lookup_timeout = self.lookup_timeout;

        self.cache
            .get_or_load(&self.group, move || async move {
                match tokio::time::timeout(lookup_timeout, directory.service_names(&group)).await {
                    Ok(result) => result,
                    Err(_) => Err(PresenceError::Timeout(lookup_timeout)),
                }
            })
            .await
    }
}

#[async_trait]
impl PresenceSource for DiscoveryPresence {
    async fn list_instances(
        &self,
        service: &str,
        _suffix: &str,
    ) -> Result<Vec<String>, PresenceError> {
        let services = self.all_services().await?;
        let instances: Vec<String> = services
            .iter()
            .filter(|name| name.starts_with(service))
            .cloned()
            .collect();

        tracing::debug!(
            service_name = %service,
            group = %self.group,
            instance_count = instances.len(),
            "Listed instances from discovery directory"
        );
        Ok(instances)
    }
}
