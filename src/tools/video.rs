//! 视频搜索：YouTube Data API v3
//!
//! GET search?part=snippet&type=video&maxResults=N，结果映射为 {title, url, channel}。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::VideoSection;
use crate::tools::{audited, ToolError, Video, VideoSearch};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct ItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
}

fn to_videos(resp: SearchResponse) -> Vec<Video> {
    resp.items
        .into_iter()
        .filter_map(|item| {
            let id = item.id.video_id?;
            Some(Video {
                title: item.snippet.title,
                url: format!("https://www.youtube.com/watch?v={id}"),
                channel: item.snippet.channel_title,
            })
        })
        .collect()
}

pub struct YouTubeSearch {
    client: Client,
    endpoint: String,
    api_key: String,
    max_results: usize,
    timeout: Duration,
}

impl YouTubeSearch {
    pub fn new(api_key: impl Into<String>, section: &VideoSection) -> Self {
        let timeout = Duration::from_secs(section.timeout_secs.max(1));
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            endpoint: section.endpoint.clone(),
            api_key: api_key.into(),
            max_results: section.max_results,
            timeout,
        }
    }

    /// 读取 YOUTUBE_API_KEY；未设置时返回 None
    pub fn from_env(section: &VideoSection) -> Option<Self> {
        std::env::var("YOUTUBE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|key| Self::new(key, section))
    }

    async fn fetch(&self, query: &str) -> Result<Vec<Video>, ToolError> {
        let max_results = self.max_results.to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("maxResults", max_results.as_str()),
                ("type", "video"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ToolError::Http(resp.status().as_u16()));
        }
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::Decode(e.to_string()))?;
        Ok(to_videos(parsed))
    }
}

#[async_trait]
impl VideoSearch for YouTubeSearch {
    async fn search_video(&self, query: &str) -> Result<Vec<Video>, ToolError> {
        audited("video_search", query, self.timeout, self.fetch(query)).await
    }
}

/// 未配置视频搜索时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVideoSearch;

#[async_trait]
impl VideoSearch for NoopVideoSearch {
    async fn search_video(&self, _query: &str) -> Result<Vec<Video>, ToolError> {
        Err(ToolError::NotConfigured("video search".to_string()))
    }
}
