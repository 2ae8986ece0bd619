use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{LeaseStore, LeaseStoreError, ttl_seconds};

impl From<redis::RedisError> for LeaseStoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            LeaseStoreError::Connection(e.to_string())
        } else {
            LeaseStoreError::Command(e.to_string())
        }
    }
}

/// 基于 Redis 的共享租约存储
#[derive(Clone)]
pub struct RedisLeaseStore {
    // ConnectionManager 自带断线重连，克隆共享同一条多路复用连接
    connection: ConnectionManager,
    url: String,
}

impl fmt::Debug for RedisLeaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisLeaseStore")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RedisLeaseStore {
    pub async fn connect(url: &str) -> Result<Self, LeaseStoreError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        tracing::info!(url = %url, "Connected to lease store");
        Ok(Self {
            connection,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), LeaseStoreError> {
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut connection)
            .await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LeaseStoreError> {
        // SET key value EX seconds，值和过期时间原子写入
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut connection)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LeaseStoreError> {
        let mut connection = self.connection.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LeaseStoreError> {
        let mut connection = self.connection.clone();
        let applied: bool = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds(ttl))
            .query_async(&mut connection)
            .await?;
        Ok(applied)
    }

    async fn del(&self, key: &str) -> Result<bool, LeaseStoreError> {
        let mut connection = self.connection.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut connection)
            .await?;
        Ok(removed > 0)
    }
}
