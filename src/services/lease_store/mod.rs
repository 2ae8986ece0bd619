//! Lease store module
//!
//! Key/value store holding presence leases:
//! - `memory`: in-process store with per-key deadlines
//! - `redis_store`: shared Redis store used across processes

pub mod memory;
pub mod redis_store;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryLeaseStore;
pub use redis_store::RedisLeaseStore;

/// 租约存储错误类型
#[derive(Debug, Error)]
pub enum LeaseStoreError {
    #[error("Lease store connection error: {0}")]
    Connection(String),
    #[error("Lease store command failed: {0}")]
    Command(String),
}

/// 租约存储支持的命令：SET / SET EX / GET / EXPIRE / DEL
#[async_trait]
pub trait LeaseStore: Send + Sync + fmt::Debug {
    async fn set(&self, key: &str, value: &str) -> Result<(), LeaseStoreError>;

    /// 写入值并设置过期时间
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LeaseStoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, LeaseStoreError>;

    /// 返回 key 是否存在并已刷新过期时间
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LeaseStoreError>;

    /// 返回 key 是否存在并已删除
    async fn del(&self, key: &str) -> Result<bool, LeaseStoreError>;
}

// 过期时间按秒计，不足一秒按一秒
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
