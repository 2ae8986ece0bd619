#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use isolation_router::services::identity::LocalInstanceIdentity;
use isolation_router::services::policy::IsolationPolicy;
use isolation_router::services::presence::{DiscoveryDirectory, PresenceError, PresenceSource};
use isolation_router::services::router::RouteResolver;

pub const DEFAULT_ADDRESS: &str = "10.0.0.1";
pub const PROFILE: &str = "dev";

pub fn address(raw: &str) -> IpAddr {
    raw.parse().expect("valid test address")
}

pub fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// `{defaultAddress="10.0.0.1", marker="svc-", forced=[], skip=[]}`
pub fn base_policy() -> IsolationPolicy {
    IsolationPolicy::new(address(DEFAULT_ADDRESS), "svc-").with_activation_environments([PROFILE])
}

pub fn resolver_for(
    policy: IsolationPolicy,
    local_address: &str,
    presence: Arc<dyn PresenceSource>,
) -> RouteResolver {
    RouteResolver::new(
        Arc::new(policy),
        Arc::new(LocalInstanceIdentity::new(address(local_address))),
        presence,
        &[PROFILE],
    )
}

/// 返回固定实例列表并记录调用次数
#[derive(Debug, Default)]
pub struct FakePresence {
    instances: Vec<String>,
    failure: Option<PresenceError>,
    calls: AtomicUsize,
}

impl FakePresence {
    pub fn with_instances(items: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            instances: names(items),
            ..Default::default()
        })
    }

    pub fn failing(error: PresenceError) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(error),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PresenceSource for FakePresence {
    async fn list_instances(
        &self,
        _service: &str,
        _suffix: &str,
    ) -> Result<Vec<String>, PresenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.instances.clone()),
        }
    }
}

/// 模拟慢速服务发现目录
#[derive(Debug)]
pub struct SlowDirectory {
    services: Vec<String>,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
}

impl SlowDirectory {
    pub fn new(items: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            services: names(items),
            delay,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            services: Vec::new(),
            delay,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryDirectory for SlowDirectory {
    async fn service_names(&self, _group: &str) -> Result<Vec<String>, PresenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(PresenceError::Directory("directory unavailable".to_string()));
        }
        Ok(self.services.clone())
    }
}
