use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{PresenceError, PresenceSource};
use crate::services::identity::isolated_service_name;
use crate::services::lease_store::LeaseStore;

/// 租约 key 中服务名与后缀的分隔符
pub const LEASE_KEY_SEPARATOR: char = ':';

/// 租约 key：`prefix + service + ":" + suffix`
pub fn lease_key(prefix: &str, service: &str, suffix: &str) -> String {
    format!("{prefix}{service}{LEASE_KEY_SEPARATOR}{suffix}")
}

/// 基于心跳租约的实例查询。
///
/// 只做单 key 点查，不需要本地缓存。默认实例不发布租约，
/// 因此总是报告 `service` 本身，租约存在时再报告隔离实例。
#[derive(Debug, Clone)]
pub struct LeasePresence {
    store: Arc<dyn LeaseStore>,
    key_prefix: String,
    lookup_timeout: Duration,
}

impl LeasePresence {
    pub fn new(
        store: Arc<dyn LeaseStore>,
        key_prefix: impl Into<String>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            lookup_timeout,
        }
    }
}

#[async_trait]
impl PresenceSource for LeasePresence {
    async fn list_instances(
        &self,
        service: &str,
        suffix: &str,
    ) -> Result<Vec<String>, PresenceError> {
        let key = lease_key(&self.key_prefix, service, suffix);
        let lease = tokio::time::timeout(self.lookup_timeout, self.store.get(&key))
            .await
            .map_err(|_| PresenceError::Timeout(self.lookup_timeout))?
            .map_err(|e| PresenceError::Store(e.to_string()))?;

        let mut instances = vec![service.to_string()];
        if lease.is_some() {
            instances.push(isolated_service_name(service, suffix));
        }

        tracing::debug!(
            lease_key = %key,
            lease_present = lease.is_some(),
            "Looked up isolation lease"
        );
        Ok(instances)
    }
}
