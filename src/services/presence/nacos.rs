use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::discovery::DiscoveryDirectory;
use super::types::PresenceError;
use crate::config::DiscoveryConfig;

const SERVICE_LIST_PATH: &str = "/nacos/v1/ns/service/list";

// GET /nacos/v1/ns/service/list 的响应体
#[derive(Debug, Deserialize)]
struct ServiceListPage {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    doms: Vec<String>,
}

/// Nacos 开放 API 客户端
#[derive(Debug, Clone)]
pub struct NacosDirectory {
    client: reqwest::Client,
    server_addr: String,
    namespace: Option<String>,
    page_size: u32,
    request_timeout: Duration,
}

impl NacosDirectory {
    pub fn new(config: &DiscoveryConfig, request_timeout: Duration) -> Result<Self, PresenceError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PresenceError::Directory(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            server_addr: config.server_addr.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            page_size: config.page_size.max(1),
            request_timeout,
        })
    }

    async fn fetch_page(&self, group: &str, page_no: u32) -> Result<ServiceListPage, PresenceError> {
        let url = format!("{}{}", self.server_addr, SERVICE_LIST_PATH);
        let page_no = page_no.to_string();
        let page_size = self.page_size.to_string();
        let mut query = vec![
            ("pageNo", page_no.as_str()),
            ("pageSize", page_size.as_str()),
            ("groupName", group),
        ];
        if let Some(namespace) = &self.namespace {
            query.push(("namespaceId", namespace.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PresenceError::Directory(format!(
                "Nacos returned HTTP {status} for group {group}"
            )));
        }

        response
            .json::<ServiceListPage>()
            .await
            .map_err(|e| PresenceError::Directory(format!("Invalid service list response: {e}")))
    }

    fn map_request_error(&self, e: reqwest::Error) -> PresenceError {
        if e.is_timeout() {
            PresenceError::Timeout(self.request_timeout)
        } else {
            PresenceError::Directory(format!("Nacos request failed: {e}"))
        }
    }
}

#[async_trait]
impl DiscoveryDirectory for NacosDirectory {
    async fn service_names(&self, group: &str) -> Result<Vec<String>, PresenceError> {
        let mut names = Vec::new();
        let mut page_no = 1;

        loop {
            let page = self.fetch_page(group, page_no).await?;
            let fetched = page.doms.len();
            names.extend(page.doms);

            if fetched < self.page_size as usize || names.len() as u64 >= page.count {
                break;
            }
            page_no += 1;
        }

        tracing::debug!(
            group = %group,
            service_count = names.len(),
            pages = page_no,
            "Fetched service list from Nacos"
        );
        Ok(names)
    }
}
