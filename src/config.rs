use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "ISOLATION_CONFIG";
/// 默认配置文件
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 配置错误，全部在启动阶段抛出
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to read environment overrides: {0}")]
    Env(#[from] envy::Error),
    #[error("Missing required config field: {0}")]
    MissingField(&'static str),
    #[error("Invalid address '{value}' in {field}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub isolation: IsolationConfig,
    pub presence: PresenceConfig,
    pub logging: LoggingConfig,
}

/// 隔离策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// 启用隔离的环境标签，切勿包含生产环境
    #[serde(deserialize_with = "pound_list")]
    pub environments: Vec<String>,
    /// 当前进程激活的环境标签
    #[serde(deserialize_with = "pound_list")]
    pub profiles: Vec<String>,
    /// 默认环境地址，允许所有跨组调用
    pub default_address: Option<String>,
    /// 强制隔离地址
    #[serde(deserialize_with = "pound_list")]
    pub isolation_addresses: Vec<String>,
    /// 强制隔离时仍然调用默认服务的服务名
    #[serde(deserialize_with = "pound_list")]
    pub skip_isolation_services: Vec<String>,
    /// 目标地址中包含该标识才参与隔离
    pub service_marker: String,
    /// 当前服务的逻辑名
    pub service_name: Option<String>,
    /// 本机地址，缺省时自动探测
    pub local_address: Option<String>,
    /// 本机名，缺省时自动探测
    pub host_name: Option<String>,
    /// 隔离后缀是否追加主机名
    pub suffix_with_host_name: bool,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            environments: vec!["dev".to_string()],
            profiles: Vec::new(),
            default_address: None,
            isolation_addresses: Vec::new(),
            skip_isolation_services: Vec::new(),
            service_marker: String::new(),
            service_name: None,
            local_address: None,
            host_name: None,
            suffix_with_host_name: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceBackend {
    /// 查询服务发现目录
    #[default]
    Discovery,
    /// 共享存储中的心跳租约
    Lease,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub backend: PresenceBackend,
    /// 单次查询超时（毫秒）
    pub lookup_timeout_ms: u64,
    pub discovery: DiscoveryConfig,
    pub lease: LeaseConfig,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            backend: PresenceBackend::Discovery,
            lookup_timeout_ms: 2000,
            discovery: DiscoveryConfig::default(),
            lease: LeaseConfig::default(),
        }
    }
}

impl PresenceConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Nacos 服务发现配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub server_addr: String,
    pub group: String,
    pub namespace: Option<String>,
    pub page_size: u32,
    pub cache_ttl_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            server_addr: "http://127.0.0.1:8848".to_string(),
            group: "DEFAULT_GROUP".to_string(),
            namespace: None,
            page_size: 1000,
            cache_ttl_secs: 10,
        }
    }
}

impl DiscoveryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// 租约存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// `redis://host:port` 或 `memory://`
    pub url: String,
    pub key_prefix: String,
    pub heartbeat_interval_secs: u64,
    pub lease_ttl_secs: u64,
    pub initial_delay_secs: u64,
    pub write_timeout_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "ISOLATION:".to_string(),
            heartbeat_interval_secs: 4,
            lease_ttl_secs: 8,
            initial_delay_secs: 1,
            write_timeout_ms: 2000,
        }
    }
}

impl LeaseConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `RUST_LOG` 未设置时使用
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// 进程级环境变量覆盖，前缀 ISOLATION_
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    profiles: Option<Vec<String>>,
    local_address: Option<String>,
    host_name: Option<String>,
}

impl Config {
    /// 读取配置文件并应用环境变量覆盖，随后立即校验
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        let overrides: EnvOverrides = envy::prefixed("ISOLATION_").from_env()?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config_str)?)
    }

    fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(profiles) = overrides.profiles {
            self.isolation.profiles = profiles;
        }
        if overrides.local_address.is_some() {
            self.isolation.local_address = overrides.local_address;
        }
        if overrides.host_name.is_some() {
            self.isolation.host_name = overrides.host_name;
        }
    }

    /// 当前进程的环境标签是否命中启用环境
    pub fn isolation_activated(&self) -> bool {
        self.isolation
            .profiles
            .iter()
            .any(|profile| self.isolation.environments.contains(profile))
    }

    /// 启动期校验，未启用隔离时不校验隔离相关字段
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.isolation_activated() {
            return Ok(());
        }

        let isolation = &self.isolation;
        let default_address = isolation
            .default_address
            .as_deref()
            .ok_or(ConfigError::MissingField("isolation.default_address"))?;
        parse_address("isolation.default_address", default_address)?;
        for address in &isolation.isolation_addresses {
            parse_address("isolation.isolation_addresses", address)?;
        }
        if let Some(local_address) = &isolation.local_address {
            parse_address("isolation.local_address", local_address)?;
        }
        if isolation.service_marker.trim().is_empty() {
            return Err(ConfigError::MissingField("isolation.service_marker"));
        }

        if self.presence.lookup_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "presence.lookup_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        match self.presence.backend {
            PresenceBackend::Discovery => {
                let discovery = &self.presence.discovery;
                if discovery.server_addr.trim().is_empty() {
                    return Err(ConfigError::MissingField("presence.discovery.server_addr"));
                }
                if discovery.cache_ttl_secs == 0 || discovery.page_size == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "presence.discovery",
                        reason: "cache_ttl_secs and page_size must be greater than zero"
                            .to_string(),
                    });
                }
            }
            PresenceBackend::Lease => {
                if isolation
                    .service_name
                    .as_deref()
                    .is_none_or(|name| name.trim().is_empty())
                {
                    return Err(ConfigError::MissingField("isolation.service_name"));
                }
                let lease = &self.presence.lease;
                if lease.url.trim().is_empty() {
                    return Err(ConfigError::MissingField("presence.lease.url"));
                }
                if lease.heartbeat_interval_secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "presence.lease.heartbeat_interval_secs",
                        reason: "must be greater than zero".to_string(),
                    });
                }
                // 至少两次心跳才允许租约过期
                if lease.lease_ttl_secs < lease.heartbeat_interval_secs.saturating_mul(2) {
                    return Err(ConfigError::InvalidValue {
                        field: "presence.lease.lease_ttl_secs",
                        reason: format!(
                            "lease ttl {}s must be at least twice the heartbeat interval {}s",
                            lease.lease_ttl_secs, lease.heartbeat_interval_secs
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}

pub fn parse_address(field: &'static str, value: &str) -> Result<IpAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
        })
}

/// 解析 `a#b#c` 形式的列表
pub fn split_pound(raw: &str) -> Vec<String> {
    raw.split('#')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrPound {
    List(Vec<String>),
    Pound(String),
}

fn pound_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ListOrPound::deserialize(deserializer)? {
        ListOrPound::List(items) => items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect(),
        ListOrPound::Pound(raw) => split_pound(&raw),
    })
}
