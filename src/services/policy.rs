use std::collections::HashSet;
use std::net::IpAddr;

use crate::config::{ConfigError, IsolationConfig, parse_address};

/// 隔离策略，启动时构建一次，之后只读
#[derive(Debug, Clone)]
pub struct IsolationPolicy {
    activation_environments: HashSet<String>,
    default_address: IpAddr,
    forced_isolation_addresses: HashSet<IpAddr>,
    skip_isolation_services: HashSet<String>,
    service_marker: String,
}

impl IsolationPolicy {
    pub fn new(default_address: IpAddr, service_marker: impl Into<String>) -> Self {
        Self {
            activation_environments: HashSet::new(),
            default_address,
            forced_isolation_addresses: HashSet::new(),
            skip_isolation_services: HashSet::new(),
            service_marker: service_marker.into(),
        }
    }

    pub fn with_activation_environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.activation_environments = environments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_forced_isolation_addresses<I>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        self.forced_isolation_addresses = addresses.into_iter().collect();
        self
    }

    pub fn with_skip_isolation_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_isolation_services = services.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_config(config: &IsolationConfig) -> Result<Self, ConfigError> {
        let default_address = config
            .default_address
            .as_deref()
            .ok_or(ConfigError::MissingField("isolation.default_address"))
            .and_then(|address| parse_address("isolation.default_address", address))?;

        let forced = config
            .isolation_addresses
            .iter()
            .map(|address| parse_address("isolation.isolation_addresses", address))
            .collect::<Result<Vec<_>, _>>()?;

        if config.service_marker.trim().is_empty() {
            return Err(ConfigError::MissingField("isolation.service_marker"));
        }

        Ok(Self::new(default_address, config.service_marker.trim())
            .with_activation_environments(config.environments.iter().cloned())
            .with_forced_isolation_addresses(forced)
            .with_skip_isolation_services(config.skip_isolation_services.iter().cloned()))
    }

    /// 任一激活的环境标签命中即启用隔离
    pub fn is_activated_by<S: AsRef<str>>(&self, profiles: &[S]) -> bool {
        profiles
            .iter()
            .any(|profile| self.activation_environments.contains(profile.as_ref()))
    }

    pub fn default_address(&self) -> IpAddr {
        self.default_address
    }

    pub fn is_default_address(&self, address: IpAddr) -> bool {
        self.default_address == address
    }

    pub fn requires_forced_isolation(&self, address: IpAddr) -> bool {
        self.forced_isolation_addresses.contains(&address)
    }

    pub fn skips_isolation(&self, service: &str) -> bool {
        self.skip_isolation_services.contains(service)
    }

    pub fn service_marker(&self) -> &str {
        &self.service_marker
    }

    /// 目标地址不含服务标识时不参与隔离
    pub fn is_eligible(&self, destination: &str) -> bool {
        destination.contains(self.service_marker.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = IsolationConfig {
            environments: vec!["dev".to_string(), "test".to_string()],
            default_address: Some("10.0.0.1".to_string()),
            isolation_addresses: vec!["10.0.0.3".to_string()],
            skip_isolation_services: vec!["svc-auth".to_string()],
            service_marker: "svc-".to_string(),
            ..Default::default()
        };
        let policy = IsolationPolicy::from_config(&config).unwrap();

        assert!(policy.is_activated_by(&["local", "test"]));
        assert!(!policy.is_activated_by(&["prod"]));
        assert!(policy.is_default_address("10.0.0.1".parse().unwrap()));
        assert!(policy.requires_forced_isolation("10.0.0.3".parse().unwrap()));
        assert!(policy.skips_isolation("svc-auth"));
        assert!(policy.is_eligible("http://svc-orders.internal/api"));
        assert!(!policy.is_eligible("http://payments.internal/api"));
    }

    #[test]
    fn test_from_config_requires_marker() {
        let config = IsolationConfig {
            default_address: Some("10.0.0.1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            IsolationPolicy::from_config(&config),
            Err(ConfigError::MissingField("isolation.service_marker"))
        ));
    }
}
