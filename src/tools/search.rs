//! 网页搜索适配器：Firecrawl 风格 /v1/search
//!
//! POST {query, limit, scrapeOptions: {formats: ["markdown"]}}，响应 {data: [{url, markdown}]}。
//! 单次请求带独立超时；非 2xx 按状态码归类（401 鉴权、429 限流、5xx 服务端、其它通用）。
//! 无结果返回空列表而不是错误。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::ResearchError;

pub const FIRECRAWL_BASE_URL: &str = "https://api.firecrawl.dev";

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    /// 页面正文（markdown），可能为空
    pub content: String,
}

/// 搜索客户端抽象
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ResearchError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<Vec<SearchItem>>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
}

/// Firecrawl 搜索客户端
pub struct FirecrawlSearch {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    limit: usize,
}

impl FirecrawlSearch {
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<&str>,
        timeout_secs: u64,
        limit: usize,
    ) -> Result<Self, ResearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ResearchError::Generic(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(FIRECRAWL_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.map(String::from).filter(|k| !k.is_empty()),
            limit: limit.max(1),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/search", self.base_url)
    }
}

#[async_trait]
impl SearchClient for FirecrawlSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ResearchError> {
        tracing::info!(query = %query, "web search");

        let body = json!({
            "query": query,
            "limit": self.limit,
            "scrapeOptions": { "formats": ["markdown"] },
        });
        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ResearchError::classify_status(status, &text));
        }

        let parsed: SearchResponse = serde_json::from_str(&text)
            .map_err(|e| ResearchError::MalformedOutput(format!("search response: {}", e)))?;

        let results: Vec<SearchResult> = parsed
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                let url = item.url.filter(|u| !u.is_empty())?;
                Some(SearchResult {
                    url,
                    content: item.markdown.unwrap_or_default(),
                })
            })
            .collect();

        tracing::debug!(query = %query, results = results.len(), "web search done");
        Ok(results)
    }
}
