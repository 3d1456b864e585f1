//! 外部协作方：网页搜索、视频搜索、文档上下文检索
//!
//! 每个协作方都是窄接口 trait，失败统一为 ToolError；worker 拿到 Err 时降级为占位文本而不是中断。
//! Collaborators 把 LLM 与这些客户端打包成一个显式注入的依赖，不使用全局单例。

pub mod documents;
pub mod executor;
pub mod search;
pub mod video;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmClient;

pub use documents::{InMemoryDocuments, NoopDocuments};
pub use executor::audited;
pub use search::{format_search_results, NoopWebSearch, SearchHit, TavilySearch};
pub use video::{NoopVideoSearch, YouTubeSearch};

/// 协作方调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {0}")]
    Http(u16),

    #[error("{0} timed out")]
    Timeout(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// 一条视频搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub title: String,
    pub url: String,
    pub channel: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// 返回已清洗、可直接拼入 prompt 的文本
    async fn search_web(&self, query: &str) -> Result<String, ToolError>;
}

#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search_video(&self, query: &str) -> Result<Vec<Video>, ToolError>;
}

#[async_trait]
pub trait DocumentContext: Send + Sync {
    async fn lookup_document_context(&self, query: &str) -> Result<String, ToolError>;
}

/// 协作方依赖包：所有 worker 通过它访问外部能力
#[derive(Clone)]
pub struct Collaborators {
    /// 生成模型（worker 正文、修复、摘要）
    pub llm: Arc<dyn LlmClient>,
    /// 评审模型（精炼循环的 Critic）
    pub critic_llm: Arc<dyn LlmClient>,
    /// 规划模型（Plan Builder）
    pub planner_llm: Arc<dyn LlmClient>,
    pub web: Arc<dyn WebSearch>,
    pub video: Arc<dyn VideoSearch>,
    pub docs: Arc<dyn DocumentContext>,
}

impl Collaborators {
    /// 三个角色共用同一个模型，搜索与文档均未配置
    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            critic_llm: llm.clone(),
            planner_llm: llm.clone(),
            llm,
            web: Arc::new(NoopWebSearch),
            video: Arc::new(NoopVideoSearch),
            docs: Arc::new(NoopDocuments),
        }
    }

    pub fn with_critic(mut self, critic: Arc<dyn LlmClient>) -> Self {
        self.critic_llm = critic;
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn LlmClient>) -> Self {
        self.planner_llm = planner;
        self
    }

    pub fn with_web(mut self, web: Arc<dyn WebSearch>) -> Self {
        self.web = web;
        self
    }

    pub fn with_video(mut self, video: Arc<dyn VideoSearch>) -> Self {
        self.video = video;
        self
    }

    pub fn with_docs(mut self, docs: Arc<dyn DocumentContext>) -> Self {
        self.docs = docs;
        self
    }
}
