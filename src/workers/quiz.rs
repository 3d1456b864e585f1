//! 测验 worker（quiz_generator）：精炼循环生成 Quiz

use async_trait::async_trait;
use serde_json::json;

use crate::core::{AgentError, ExecutionLogEntry, PartialState, SharedState};
use crate::memory::Message;
use crate::plan::WorkerName;
use crate::refine::{RefineOutcome, RefinementLoop};
use crate::tools::Collaborators;
use crate::workers::schema::Quiz;
use crate::workers::{instruction_of, record_refinement, Worker};

pub struct QuizWorker {
    refiner: RefinementLoop,
}

impl QuizWorker {
    pub fn new(collaborators: &Collaborators, max_attempts: u32) -> Self {
        Self {
            refiner: RefinementLoop::new(collaborators, max_attempts),
        }
    }
}

#[async_trait]
impl Worker for QuizWorker {
    fn name(&self) -> WorkerName {
        WorkerName::QuizGenerator
    }

    async fn execute(&self, state: &SharedState) -> Result<PartialState, AgentError> {
        let instruction = instruction_of(state);
        let mut context = state.conversation_summary.clone();
        if let Some(milestone) = &state.selected_milestone_context {
            context.push_str(&format!("\n\nSELECTED MILESTONE:\n{milestone}"));
        }
        context.push_str(
            "\n\nWrite multiple choice questions (each with at least two options and the correct answer copied verbatim from them), short answer questions and coding questions.",
        );

        let refined = self.refiner.run::<Quiz>(instruction, &context).await;
        let attempts = refined.attempts;
        let mut partial = record_refinement(self.name(), &refined, PartialState::new());

        match refined.outcome {
            RefineOutcome::Accepted(quiz) => {
                let summary = quiz.display_summary();
                partial.raw_data_storage.push(json!({ "quiz": &quiz }));
                partial.research_memory.push(format!("Quiz generated for: {instruction}"));
                partial.messages.push(Message::assistant(summary.clone()));
                partial.execution_log.push(ExecutionLogEntry::new(
                    self.name().as_str(),
                    "quiz_accepted",
                    json!({ "mcq": quiz.mcq_questions.len(), "failed_attempts": attempts }),
                ));
                partial.final_output = Some(summary);
                partial.quiz_output = Some(quiz);
            }
            RefineOutcome::Exhausted { feedback, last } => {
                let message = format!(
                    "Could not produce an acceptable quiz after {attempts} attempts. Last feedback: {feedback}"
                );
                if let Some(draft) = last {
                    partial.raw_data_storage.push(json!({ "rejected_quiz": draft }));
                }
                partial.messages.push(Message::assistant(message.clone()));
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
    use crate::workers::schema::fixtures;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_quiz_is_repaired_then_accepted() {
        let good = serde_json::to_string(&fixtures::quiz()).unwrap();
        // 生成输出截断 → 修复模型返回完整 JSON
        let llm = Arc::new(ScriptedLlmClient::new(vec![format!("```json\n{}", &good[..20]), good.clone()]));
        let critic = Arc::new(ScriptedLlmClient::new([r#"{"approved":true,"feedback":"fine"}"#]));
        let worker = QuizWorker::new(&Collaborators::with_llm(llm.clone()).with_critic(critic), 3);

        let mut state = SharedState::seed("quiz me on ownership");
        state.selected_milestone_context = Some("Milestone m1 - Ownership".into());
        let partial = worker.execute(&state).await.unwrap();

        assert_eq!(partial.quiz_output, Some(fixtures::quiz()));
        assert_eq!(partial.refinement_attempts, Some(0));
        assert_eq!(llm.calls(), 2);
        assert!(llm.prompts()[0].contains("SELECTED MILESTONE:\nMilestone m1 - Ownership"));
    }

    #[tokio::test]
    async fn test_quiz_rule_violation_feeds_back() {
        let mut bad = fixtures::quiz();
        bad.mcq_questions[0].correct_answer = "borrow".into();
        let bad = serde_json::to_string(&bad).unwrap();
        let good = serde_json::to_string(&fixtures::quiz()).unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([bad, good]));
        let critic = Arc::new(ScriptedLlmClient::new([r#"{"approved":true,"feedback":""}"#]));
        let worker = QuizWorker::new(&Collaborators::with_llm(llm.clone()).with_critic(critic), 3);

        let partial = worker.execute(&SharedState::seed("quiz")).await.unwrap();
        assert!(partial.quiz_output.is_some());
        assert_eq!(partial.refinement_attempts, Some(1));
        assert!(llm.prompts()[1].contains("mcq_0 correct_answer 'borrow' is not one of its options"));
    }
}
