//! 编排器：一次请求的完整流程
//!
//! 压缩历史（每次请求一次）→ Plan Builder → Driver 逐步派发 → 完成或在中断点暂停并写检查点。
//! resume 从检查点取回状态、注入载荷后继续同一个计划。
//!
//! 这里也负责按配置组装 LLM 后端与外部协作方（显式注入，不使用全局单例）。

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointManager;
use crate::config::AppConfig;
use crate::core::scheduler::{Driver, RunOutcome};
use crate::core::{AgentError, SharedState};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::ContextCompressor;
use crate::observability::audit;
use crate::plan::{Action, PlanBuilder, WorkerName};
use crate::tools::{
    Collaborators, DocumentContext, InMemoryDocuments, NoopDocuments, NoopVideoSearch, NoopWebSearch,
    TavilySearch, VideoSearch, WebSearch, YouTubeSearch,
};
use crate::workers::schema::Roadmap;
use crate::workers::WorkerRegistry;

/// 没有任何 worker 写出结果时的回复
pub const NO_OUTPUT: &str = "I could not produce an answer for this request.";

/// 一轮用户输入
#[derive(Debug, Clone, Default)]
pub struct Turn {
    pub request: String,
    /// 历史条目（旧 → 新），如 "User: ..." / "Assistant: ..."
    pub history: Vec<String>,
    pub milestone_context: Option<String>,
}

impl Turn {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }

    pub fn with_milestone(mut self, context: impl Into<String>) -> Self {
        self.milestone_context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowStatus {
    Completed,
    /// 等待外部输入；用 session_id 调用 resume
    Paused { session_id: String, at: WorkerName },
}

#[derive(Debug)]
pub struct WorkflowResult {
    pub status: WorkflowStatus,
    pub reply: String,
    pub state: SharedState,
}

impl WorkflowResult {
    pub fn session_id(&self) -> Option<&str> {
        match &self.status {
            WorkflowStatus::Paused { session_id, .. } => Some(session_id),
            WorkflowStatus::Completed => None,
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.status, WorkflowStatus::Paused { .. })
    }
}

pub struct Orchestrator {
    compressor: ContextCompressor,
    planner: PlanBuilder,
    driver: Driver,
    checkpoints: CheckpointManager,
    retention: Duration,
}

impl Orchestrator {
    pub fn new(collaborators: &Collaborators, cfg: &AppConfig, checkpoints: CheckpointManager) -> Self {
        let registry = WorkerRegistry::standard(collaborators, &cfg.orchestrator);
        Self {
            compressor: ContextCompressor::from_section(collaborators.llm.clone(), &cfg.compression),
            planner: PlanBuilder::new(collaborators.planner_llm.clone())
                .with_grading(cfg.orchestrator.grade_quizzes),
            driver: Driver::new(registry),
            checkpoints,
            retention: Duration::from_secs(cfg.checkpoint.retention_secs),
        }
    }

    /// 按配置组装全部依赖
    pub fn from_config(cfg: &AppConfig) -> Self {
        let collaborators = collaborators_from_config(cfg);
        let checkpoints = CheckpointManager::from_section(&cfg.checkpoint, &cfg.app.data_dir());
        Self::new(&collaborators, cfg, checkpoints)
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// 处理一轮请求
    pub async fn handle(&self, turn: Turn, cancel: &CancellationToken) -> Result<WorkflowResult, AgentError> {
        let compressed = self.compressor.compress(&turn.history, &turn.request).await;
        let plan = self
            .planner
            .build(&turn.request, &compressed, turn.milestone_context.as_deref())
            .await;
        audit(
            "plan",
            json!({
                "request": crate::observability::preview(&turn.request, 200),
                "actions": plan.actions().iter().map(Action::as_str).collect::<Vec<_>>(),
            }),
        );

        let mut state = SharedState::seed(turn.request);
        state.conversation_summary = compressed;
        state.selected_milestone_context = turn.milestone_context;
        state.load_plan(plan);

        let outcome = self.driver.run(state, cancel).await?;
        self.settle(outcome).await
    }

    /// 带载荷恢复暂停的会话；会话不存在或已恢复过时返回 UnknownSession
    ///
    /// 在暂停节点派发之前被取消时会话保持可恢复。
    pub async fn resume(
        &self,
        session_id: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<WorkflowResult, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let (state, paused_at) = self.checkpoints.resume(session_id, payload).await?;
        if cancel.is_cancelled() {
            self.checkpoints.pause_as(session_id, state, paused_at).await?;
            tracing::info!(session_id = %session_id, "resume cancelled, session kept");
            return Err(AgentError::Cancelled);
        }
        let outcome = self.driver.resume_at(state, paused_at, cancel).await?;
        self.settle(outcome).await
    }

    /// 清理超过保留期的检查点
    pub async fn purge_expired(&self) -> Result<usize, AgentError> {
        self.checkpoints.purge(self.retention).await
    }

    async fn settle(&self, outcome: RunOutcome) -> Result<WorkflowResult, AgentError> {
        match outcome {
            RunOutcome::Completed(state) => Ok(WorkflowResult {
                status: WorkflowStatus::Completed,
                reply: reply_of(&state),
                state,
            }),
            RunOutcome::Interrupted { state, at } => {
                let session_id = self.checkpoints.pause(state.clone(), at).await?;
                Ok(WorkflowResult {
                    status: WorkflowStatus::Paused { session_id, at },
                    reply: reply_of(&state),
                    state,
                })
            }
        }
    }
}

/// 把里程碑选择解析为上下文：能在路线图中按 id 或序号找到时用路线图内容，否则原样使用输入文本
pub fn resolve_milestone(roadmap: Option<&Roadmap>, selector: &str) -> Option<String> {
    let selector = selector.trim();
    if selector.is_empty() {
        return None;
    }
    roadmap
        .and_then(|r| r.milestone_context(selector))
        .or_else(|| Some(selector.to_string()))
}

fn reply_of(state: &SharedState) -> String {
    state
        .final_output
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| NO_OUTPUT.to_string())
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig, model: &str) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = cfg.llm.timeouts.request;
    let has_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai = std::env::var("OPENAI_API_KEY").is_ok();

    match provider.as_str() {
        "mock" => Arc::new(MockLlmClient),
        "deepseek" if has_deepseek || has_openai => {
            tracing::info!(model, "using DeepSeek LLM");
            Arc::new(create_deepseek_client(Some(model), timeout))
        }
        "openai" if has_openai => {
            tracing::info!(model, "using OpenAI-compatible LLM");
            Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), model, None, timeout))
        }
        _ if has_deepseek => {
            tracing::info!(model, provider = %provider, "unknown provider, using DeepSeek LLM");
            Arc::new(create_deepseek_client(Some(model), timeout))
        }
        _ => {
            tracing::warn!(provider = %provider, "no API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 生成 / 评审 / 规划三个角色的模型与外部协作方
pub fn collaborators_from_config(cfg: &AppConfig) -> Collaborators {
    let model = cfg.llm.model.as_str();
    let llm = create_llm_from_config(cfg, model);
    let critic = match cfg.llm.critic_model.as_deref() {
        Some(m) if m != model => create_llm_from_config(cfg, m),
        _ => llm.clone(),
    };
    let planner = match cfg.llm.planner_model.as_deref() {
        Some(m) if m != model => create_llm_from_config(cfg, m),
        _ => llm.clone(),
    };

    let web: Arc<dyn WebSearch> = match TavilySearch::from_env(&cfg.tools.search) {
        Some(search) => Arc::new(search),
        None => {
            tracing::warn!("TAVILY_API_KEY not set, web search disabled");
            Arc::new(NoopWebSearch)
        }
    };
    let video: Arc<dyn VideoSearch> = match YouTubeSearch::from_env(&cfg.tools.video) {
        Some(search) => Arc::new(search),
        None => {
            tracing::warn!("YOUTUBE_API_KEY not set, video search disabled");
            Arc::new(NoopVideoSearch)
        }
    };

    let docs_dir = cfg.app.data_dir().join("docs");
    let docs: Arc<dyn DocumentContext> = if docs_dir.is_dir() {
        let store = InMemoryDocuments::default();
        match store.load_dir(&docs_dir) {
            Ok(_) if !store.is_empty() => Arc::new(store),
            Ok(_) => Arc::new(NoopDocuments),
            Err(e) => {
                tracing::warn!(dir = %docs_dir.display(), error = %e, "failed to load documents");
                Arc::new(NoopDocuments)
            }
        }
    } else {
        Arc::new(NoopDocuments)
    };

    Collaborators::with_llm(llm)
        .with_critic(critic)
        .with_planner(planner)
        .with_web(web)
        .with_video(video)
        .with_docs(docs)
}
