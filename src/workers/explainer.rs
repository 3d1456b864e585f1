//! 讲解 worker（explain_node）
//!
//! 综合文档上下文、网页检索、视频推荐与压缩后的对话上下文生成讲解。
//! 视频检索失败时 videos 置空并记一条说明日志，讲解照常完成。

use async_trait::async_trait;
use serde_json::json;

use crate::core::{AgentError, ExecutionLogEntry, PartialState, SharedState};
use crate::memory::Message;
use crate::plan::WorkerName;
use crate::tools::{Collaborators, Video};
use crate::workers::{degrade, instruction_of, Worker};

const EXPLAIN_PROMPT: &str = "You are an expert technical explainer and research assistant.

USER QUESTION:
{instruction}

DOCUMENT CONTEXT:
{documents}

WEB SEARCH CONTEXT:
{web}

PRIOR CONVERSATION:
{context}

ROADMAP CONTEXT:
{roadmap}

SELECTED MILESTONE CONTEXT:
{milestone}

--- INSTRUCTIONS ---
1. Prefer the document context when it is relevant, and cite it.
2. Say explicitly when information is web-sourced.
3. Say when knowledge is general domain knowledge.
4. Do not invent references.
5. Explain clearly, step by step, and concisely.";

pub struct ExplainerWorker {
    collaborators: Collaborators,
}

impl ExplainerWorker {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    async fn find_videos(&self, query: &str, partial: &mut PartialState) -> Vec<Video> {
        match self.collaborators.video.search_video(query).await {
            Ok(videos) => videos,
            Err(e) => {
                tracing::warn!(error = %e, "video search failed, continuing without videos");
                partial.execution_log.push(ExecutionLogEntry::new(
                    self.name().as_str(),
                    "video_search_failed",
                    json!({ "error": e.to_string(), "videos": 0 }),
                ));
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Worker for ExplainerWorker {
    fn name(&self) -> WorkerName {
        WorkerName::ExplainNode
    }

    async fn execute(&self, state: &SharedState) -> Result<PartialState, AgentError> {
        let instruction = instruction_of(state);
        let mut partial = PartialState::new();

        let documents = match self.collaborators.docs.lookup_document_context(instruction).await {
            Ok(text) => text,
            Err(e) => {
                let (placeholder, entry) = degrade(self.name(), "document_context", e.into());
                partial.execution_log.push(entry);
                placeholder
            }
        };
        let web = match self.collaborators.web.search_web(instruction).await {
            Ok(text) => text,
            Err(e) => {
                let (placeholder, entry) = degrade(self.name(), "web_search", e.into());
                partial.execution_log.push(entry);
                placeholder
            }
        };
        let videos = self.find_videos(instruction, &mut partial).await;

        let roadmap = state
            .roadmap
            .as_ref()
            .map(|r| r.display_summary())
            .unwrap_or_else(|| "None".to_string());
        let prompt = EXPLAIN_PROMPT
            .replace("{instruction}", instruction)
            .replace("{documents}", &documents)
            .replace("{web}", &web)
            .replace("{context}", &state.conversation_summary)
            .replace("{roadmap}", &roadmap)
            .replace(
                "{milestone}",
                state.selected_milestone_context.as_deref().unwrap_or("None"),
            );

        let explanation = match self.collaborators.llm.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                let message = format!("Explanation unavailable: {e}");
                partial.execution_log.push(ExecutionLogEntry::new(
                    self.name().as_str(),
                    "generation_failed",
                    json!({ "error": e.to_string() }),
                ));
                partial.last_error = Some(message.clone());
                partial.final_output = Some(message);
                partial.videos = Some(videos);
                return Ok(partial);
            }
        };

        let mut output = explanation.clone();
        if !videos.is_empty() {
            output.push_str("\n\nRecommended videos:");
            for v in &videos {
                output.push_str(&format!("\n- {} ({}): {}", v.title, v.channel, v.url));
            }
        }

        partial.messages.push(Message::assistant(explanation.clone()));
        partial
            .research_memory
            .push(format!("Explanation of {instruction}: {explanation}"));
        partial.videos = Some(videos);
        partial.final_output = Some(output);
        Ok(partial)
    }
}
