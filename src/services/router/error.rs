use thiserror::Error;

use crate::services::presence::PresenceError;

/// 路由错误，出现时调用方应放弃本次调用而不是回退到默认实例
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    #[error("Invalid destination '{url}': {reason}")]
    InvalidDestination { url: String, reason: String },
    #[error("[{service}] is not registered in any presence source")]
    DestinationUnresolved { service: String },
    #[error("[{service}] has several isolated siblings for this suffix: {candidates:?}")]
    AmbiguousSibling {
        service: String,
        candidates: Vec<String>,
    },
    #[error("Failed to resolve presence: {0}")]
    PresenceUnavailable(#[from] PresenceError),
}
