//! 网页搜索：Tavily Search API
//!
//! 每次取 max_results 条，按 URL 去重，丢弃过短内容，正文截断到 snippet_chars 并附来源：
//! `- {content}... (Source: {url})`。没有可用结果时返回固定提示文本。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::SearchSection;
use crate::tools::{audited, ToolError, WebSearch};

pub const NO_WEB_RESULTS: &str = "No relevant web results found.";

/// 搜索引擎返回的一条原始结果
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// 清洗并格式化搜索结果
pub fn format_search_results(hits: &[SearchHit], snippet_chars: usize, min_content_chars: usize) -> String {
    let mut seen = HashSet::new();
    let lines: Vec<String> = hits
        .iter()
        .filter(|h| h.content.chars().count() >= min_content_chars)
        .filter(|h| seen.insert(h.url.as_str()))
        .map(|h| {
            let snippet: String = h.content.chars().take(snippet_chars).collect();
            format!("- {}... (Source: {})", snippet, h.url)
        })
        .collect();

    if lines.is_empty() {
        NO_WEB_RESULTS.to_string()
    } else {
        lines.join("\n")
    }
}

pub struct TavilySearch {
    client: Client,
    endpoint: String,
    api_key: String,
    max_results: usize,
    snippet_chars: usize,
    min_content_chars: usize,
    timeout: Duration,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>, section: &SearchSection) -> Self {
        let timeout = Duration::from_secs(section.timeout_secs.max(1));
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            endpoint: section.endpoint.clone(),
            api_key: api_key.into(),
            max_results: section.max_results,
            snippet_chars: section.snippet_chars,
            min_content_chars: section.min_content_chars,
            timeout,
        }
    }

    /// 读取 TAVILY_API_KEY；未设置时返回 None
    pub fn from_env(section: &SearchSection) -> Option<Self> {
        std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|key| Self::new(key, section))
    }

    async fn fetch(&self, query: &str) -> Result<Vec<SearchHit>, ToolError> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": self.max_results,
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ToolError::Http(resp.status().as_u16()));
        }
        let parsed: TavilyResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::Decode(e.to_string()))?;
        Ok(parsed.results)
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search_web(&self, query: &str) -> Result<String, ToolError> {
        let hits = audited("web_search", query, self.timeout, self.fetch(query)).await?;
        Ok(format_search_results(&hits, self.snippet_chars, self.min_content_chars))
    }
}

/// 未配置搜索时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWebSearch;

#[async_trait]
impl WebSearch for NoopWebSearch {
    async fn search_web(&self, _query: &str) -> Result<String, ToolError> {
        Err(ToolError::NotConfigured("web search".to_string()))
    }
}
