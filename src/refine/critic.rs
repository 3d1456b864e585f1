//! Critic：独立评审模型对结构化输出做一次判断
//!
//! 评审模型与生成模型可以分开配置（避免自我认同）；回复必须是 {"approved": bool, "feedback": str}，
//! 无法解析或调用失败都视为未通过，反馈写明原因。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::LlmClient;
use crate::refine::extract_json;

pub const CRITIC_PROMPT: &str = "You are a strict reviewer.
Task: {task}
Review this {kind}:
{output}

Check logical ordering, completeness and relevance to the task.
Output ONLY JSON: {\"approved\": boolean, \"feedback\": \"string\"}";

/// 评审结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticVerdict {
    pub approved: bool,
    #[serde(default)]
    pub feedback: String,
}

impl CriticVerdict {
    pub fn rejected(feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            feedback: feedback.into(),
        }
    }
}

pub struct Critic {
    llm: Arc<dyn LlmClient>,
}

impl Critic {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn review(&self, task: &str, kind: &str, output: &str) -> CriticVerdict {
        let prompt = CRITIC_PROMPT
            .replace("{task}", task)
            .replace("{kind}", kind)
            .replace("{output}", output);

        let response = match self.llm.generate(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "critic call failed");
                return CriticVerdict::rejected(format!("Critic unavailable: {e}"));
            }
        };

        serde_json::from_str(extract_json(&response))
            .unwrap_or_else(|_| CriticVerdict::rejected("Format Error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};

    #[tokio::test]
    async fn test_review_parses_verdict() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "```json\n{\"approved\": true, \"feedback\": \"looks good\"}\n```",
        ]));
        let verdict = Critic::new(llm.clone()).review("learn rust", "roadmap", "{}").await;
        assert!(verdict.approved);
        assert_eq!(verdict.feedback, "looks good");
        assert!(llm.prompts()[0].contains("Task: learn rust"));
    }

    #[tokio::test]
    async fn test_unparsable_verdict_is_format_error() {
        let llm = Arc::new(ScriptedLlmClient::new(["LGTM!"]));
        let verdict = Critic::new(llm).review("t", "quiz", "{}").await;
        assert_eq!(verdict, CriticVerdict::rejected("Format Error"));
    }

    #[tokio::test]
    async fn test_failed_call_is_rejection() {
        let llm = Arc::new(ScriptedLlmClient::failing(LlmError::Timeout(3)));
        let verdict = Critic::new(llm).review("t", "quiz", "{}").await;
        assert!(!verdict.approved);
        assert!(verdict.feedback.starts_with("Critic unavailable"));
    }
}
