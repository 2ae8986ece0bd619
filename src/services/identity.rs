use std::net::{IpAddr, UdpSocket};

use crate::config::{ConfigError, IsolationConfig, parse_address};

/// 服务名追加隔离后缀的分隔符
pub const ISOLATION_SYMBOL: char = '-';

/// 当前进程的身份，启动时计算一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInstanceIdentity {
    address: IpAddr,
    host_name: Option<String>,
    isolation_suffix: String,
}

impl LocalInstanceIdentity {
    /// 后缀仅由地址决定
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            host_name: None,
            isolation_suffix: numeric_address(&address),
        }
    }

    /// 后缀由地址和主机名共同决定，如 `10002-build-host`
    pub fn with_host_name(address: IpAddr, host_name: &str) -> Self {
        let sanitized = sanitize_host_name(host_name);
        let isolation_suffix = if sanitized.is_empty() {
            numeric_address(&address)
        } else {
            format!("{}{}{}", numeric_address(&address), ISOLATION_SYMBOL, sanitized)
        };
        Self {
            address,
            host_name: Some(host_name.to_string()),
            isolation_suffix,
        }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    pub fn isolation_suffix(&self) -> &str {
        &self.isolation_suffix
    }
}

/// 隔离服务名：`service-suffix`
pub fn isolated_service_name(service: &str, suffix: &str) -> String {
    format!("{service}{ISOLATION_SYMBOL}{suffix}")
}

/// 名称是否以 `-suffix` 结尾；只在分隔符边界匹配，`-100021` 不算带 `10002`
pub fn carries_suffix(name: &str, suffix: &str) -> bool {
    !suffix.is_empty()
        && name
            .strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with(ISOLATION_SYMBOL))
}

/// 地址的数字编码：IPv4 拼接各段十进制，IPv6 拼接各段十六进制
pub fn numeric_address(address: &IpAddr) -> String {
    match address {
        IpAddr::V4(v4) => v4.octets().iter().map(u8::to_string).collect(),
        IpAddr::V6(v6) => v6
            .segments()
            .iter()
            .map(|segment| format!("{segment:x}"))
            .collect(),
    }
}

// 主机名可能包含 '.' 或 '_'，二者都不能出现在服务名中
fn sanitize_host_name(host_name: &str) -> String {
    let mut sanitized = String::with_capacity(host_name.len());
    for c in host_name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            sanitized.push(c.to_ascii_lowercase());
        } else if !sanitized.ends_with(ISOLATION_SYMBOL) {
            sanitized.push(ISOLATION_SYMBOL);
        }
    }
    sanitized.trim_matches(ISOLATION_SYMBOL).to_string()
}

/// 解析本机身份：优先使用配置，否则自动探测
pub struct IdentityProvider;

impl IdentityProvider {
    pub fn resolve(config: &IsolationConfig) -> Result<LocalInstanceIdentity, ConfigError> {
        let address = match config.local_address.as_deref() {
            Some(address) => parse_address("isolation.local_address", address)?,
            None => Self::detect_local_address()?,
        };

        if !config.suffix_with_host_name {
            return Ok(LocalInstanceIdentity::new(address));
        }

        let host_name = config
            .host_name
            .clone()
            .or_else(Self::detect_host_name)
            .ok_or(ConfigError::MissingField("isolation.host_name"))?;
        Ok(LocalInstanceIdentity::with_host_name(address, &host_name))
    }

    // 通过 UDP connect 选出出口网卡地址，不会发送数据
    fn detect_local_address() -> Result<IpAddr, ConfigError> {
        let detect = || -> std::io::Result<IpAddr> {
            let socket = UdpSocket::bind("0.0.0.0:0")?;
            socket.connect("8.8.8.8:80")?;
            Ok(socket.local_addr()?.ip())
        };
        detect().map_err(|e| ConfigError::InvalidValue {
            field: "isolation.local_address",
            reason: format!("failed to detect local address: {e}"),
        })
    }

    fn detect_host_name() -> Option<String> {
        std::env::var("HOSTNAME")
            .ok()
            .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_suffix() {
        let identity = LocalInstanceIdentity::new("10.0.0.2".parse().unwrap());
        assert_eq!(identity.isolation_suffix(), "10002");
        assert_eq!(identity.host_name(), None);
    }

    #[test]
    fn test_suffix_with_host_name() {
        let identity =
            LocalInstanceIdentity::with_host_name("10.210.3.7".parse().unwrap(), "Build_Host.lan");
        assert_eq!(identity.isolation_suffix(), "1021037-build-host-lan");
    }

    #[test]
    fn test_blank_host_name_falls_back_to_address() {
        let identity = LocalInstanceIdentity::with_host_name("10.0.0.2".parse().unwrap(), " .. ");
        assert_eq!(identity.isolation_suffix(), "10002");
    }

    #[test]
    fn test_carries_suffix_on_separator_boundary() {
        assert!(carries_suffix("svc-orders-10002", "10002"));
        assert!(carries_suffix("svc-orders-canary-10002", "10002"));
        assert!(!carries_suffix("svc-orders-100021", "10002"));
        assert!(!carries_suffix("svc-orders-110002", "10002"));
        assert!(!carries_suffix("svc-orders-10002", ""));
    }

    #[test]
    fn test_ipv6_suffix() {
        let address: IpAddr = "fd00::1".parse().unwrap();
        assert_eq!(numeric_address(&address), "fd000000001");
    }

    #[test]
    fn test_resolve_from_config() {
        let config = IsolationConfig {
            local_address: Some("10.0.0.5".to_string()),
            host_name: Some("dev-box".to_string()),
            suffix_with_host_name: true,
            ..Default::default()
        };
        let identity = IdentityProvider::resolve(&config).unwrap();
        assert_eq!(identity.isolation_suffix(), "10005-dev-box");
        assert_eq!(isolated_service_name("svc-orders", identity.isolation_suffix()), "svc-orders-10005-dev-box");
    }
}
