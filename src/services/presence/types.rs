use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// 实例查询错误，可克隆以便同一次加载的结果分发给所有等待者
#[derive(Debug, Clone, Error)]
pub enum PresenceError {
    #[error("Presence lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("Discovery directory error: {0}")]
    Directory(String),
    #[error("Lease store error: {0}")]
    Store(String),
}

/// 实例存在性查询
#[async_trait]
pub trait PresenceSource: Send + Sync + fmt::Debug {
    /// 列出以 `service` 为前缀的实例标识；`suffix` 为调用方的隔离后缀
    async fn list_instances(&self, service: &str, suffix: &str)
    -> Result<Vec<String>, PresenceError>;
}
