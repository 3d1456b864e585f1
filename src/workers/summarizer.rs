//! 摘要 worker：基于文档上下文与已积累的研究内容做总结

use async_trait::async_trait;
use serde_json::json;

use crate::core::{AgentError, ExecutionLogEntry, PartialState, SharedState};
use crate::memory::Message;
use crate::plan::WorkerName;
use crate::tools::Collaborators;
use crate::workers::{degrade, instruction_of, Worker};

pub struct SummarizerWorker {
    collaborators: Collaborators,
}

impl SummarizerWorker {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

#[async_trait]
impl Worker for SummarizerWorker {
    fn name(&self) -> WorkerName {
        WorkerName::Summarizer
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
        // 本次运行内已产生的研究内容优先于压缩上下文
        let research = if state.research_memory.is_empty() {
            "None yet.".to_string()
        } else {
            state.research_memory.join("\n")
        };

        let prompt = format!(
            "You are an expert summarizer and simplifier.\n\
             Provide a clear, objective summary for the user's request. Prioritize the document context when the request names a document; \
             summarize raw text given in the instruction; simplify complex topics. Do not add outside information unless needed for clarity.\n\n\
             USER INSTRUCTION:\n{instruction}\n\n\
             DOCUMENT CONTEXT:\n{documents}\n\n\
             RESEARCH SO FAR:\n{research}\n\n\
             CONVERSATION HISTORY:\n{}",
            state.conversation_summary
        );

        match self.collaborators.llm.generate(&prompt).await {
            Ok(summary) => {
                partial.messages.push(Message::assistant(summary.clone()));
                partial
                    .research_memory
                    .push(format!("Summary generated for: {instruction}"));
                partial.final_output = Some(summary);
            }
            Err(e) => {
                let message = format!("Summary unavailable: {e}");
                partial.execution_log.push(ExecutionLogEntry::new(
                    self.name().as_str(),
                    "generation_failed",
                    json!({ "error": e.to_string() }),
                ));
                partial.last_error = Some(message.clone());
                partial.final_output = Some(message);
            }
        }
        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_summary_reads_research_memory() {
        let llm = Arc::new(ScriptedLlmClient::new(["short summary"]));
        let mut state = SharedState::seed("summarize");
        state.current_instruction = "summarize what we covered".into();
        state.research_memory.push("Explanation of lifetimes: they scope borrows".into());

        let partial = SummarizerWorker::new(Collaborators::with_llm(llm.clone()))
            .execute(&state)
            .await
            .unwrap();

        assert_eq!(partial.final_output.as_deref(), Some("short summary"));
        assert_eq!(
            partial.research_memory,
            vec!["Summary generated for: summarize what we covered"]
        );
        assert!(llm.prompts()[0].contains("they scope borrows"));
    }
}
