use http::Uri;

use super::error::RouterError;
use crate::services::identity::{carries_suffix, isolated_service_name};

/// 解析后的目标地址，服务名取 host 的第一段
#[derive(Debug, Clone)]
pub struct Destination {
    uri: Uri,
    service: String,
}

impl Destination {
    pub fn parse(url: &str) -> Result<Self, RouterError> {
        let invalid = |reason: &str| RouterError::InvalidDestination {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        if uri.scheme().is_none() {
            return Err(invalid("missing scheme"));
        }
        let host = uri.host().ok_or_else(|| invalid("missing host"))?;
        let service = host.split('.').next().unwrap_or_default();
        if service.is_empty() {
            return Err(invalid("empty service name"));
        }

        Ok(Self {
            service: service.to_string(),
            uri,
        })
    }

    /// 目标服务名，如 `svc-orders`
    pub fn service(&self) -> &str {
        &self.service
    }

    /// 服务名已带本后缀，说明地址已经改写过
    pub fn is_isolated_for(&self, suffix: &str) -> bool {
        carries_suffix(&self.service, suffix)
    }

    /// 在服务名后插入后缀：`scheme://[userinfo@]service-suffix.rest[:port]/path?query`
    pub fn with_suffix(&self, suffix: &str) -> Result<String, RouterError> {
        let original = self.uri.authority().map(|a| a.as_str()).unwrap_or_default();
        // host 紧跟在 userinfo 的 '@' 之后
        let host_start = original.rfind('@').map_or(0, |at| at + 1);
        let rest = original
            .get(host_start + self.service.len()..)
            .unwrap_or_default();
        let authority = format!(
            "{}{}{rest}",
            &original[..host_start],
            isolated_service_name(&self.service, suffix),
        );

        let scheme = self.uri.scheme_str().unwrap_or("http");
        let path_and_query = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        Uri::builder()
            .scheme(scheme)
            .authority(authority.as_str())
            .path_and_query(path_and_query)
            .build()
            .map(|uri| uri.to_string())
            .map_err(|e| RouterError::InvalidDestination {
                url: self.uri.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_name() {
        let destination = Destination::parse("http://svc-orders.internal/api/x").unwrap();
        assert_eq!(destination.service(), "svc-orders");

        let bare = Destination::parse("http://svc-orders/api").unwrap();
        assert_eq!(bare.service(), "svc-orders");
    }

    #[test]
    fn test_suffix_goes_between_service_and_path() {
        let destination = Destination::parse("http://svc-orders.internal/api/x").unwrap();
        assert_eq!(
            destination.with_suffix("10002").unwrap(),
            "http://svc-orders-10002.internal/api/x"
        );
    }

    #[test]
    fn test_port_and_query_preserved() {
        let destination = Destination::parse("https://svc-orders:8443/api/x?id=7").unwrap();
        assert_eq!(
            destination.with_suffix("10002").unwrap(),
            "https://svc-orders-10002:8443/api/x?id=7"
        );
    }

    #[test]
    fn test_userinfo_preserved() {
        let destination = Destination::parse("http://user:pw@svc-orders.internal/api/x").unwrap();
        assert_eq!(destination.service(), "svc-orders");
        assert_eq!(
            destination.with_suffix("10003").unwrap(),
            "http://user:pw@svc-orders-10003.internal/api/x"
        );

        let with_port = Destination::parse("https://ops@svc-orders:8443/").unwrap();
        assert_eq!(
            with_port.with_suffix("10003").unwrap(),
            "https://ops@svc-orders-10003:8443/"
        );
    }

    #[test]
    fn test_detects_already_isolated_service() {
        let destination = Destination::parse("http://svc-orders-10002.internal/api").unwrap();
        assert!(destination.is_isolated_for("10002"));
        assert!(!destination.is_isolated_for("0002"));
        assert!(!destination.is_isolated_for(""));
    }

    #[test]
    fn test_rejects_relative_or_hostless_urls() {
        assert!(matches!(
            Destination::parse("/api/x"),
            Err(RouterError::InvalidDestination { .. })
        ));
        assert!(Destination::parse("not a url").is_err());
    }
}
