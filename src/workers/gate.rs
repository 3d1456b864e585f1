//! 提交闸门（await_submission）
//!
//! 调度器在执行它之前暂停并写检查点；恢复后它才真正执行，确认答卷已注入。

use async_trait::async_trait;
use serde_json::json;

use crate::core::{AgentError, ExecutionLogEntry, PartialState, SharedState};
use crate::plan::WorkerName;
use crate::workers::Worker;

#[derive(Debug, Default, Clone, Copy)]
pub struct SubmissionGate;

#[async_trait]
impl Worker for SubmissionGate {
    fn name(&self) -> WorkerName {
        WorkerName::AwaitSubmission
    }

    async fn execute(&self, state: &SharedState) -> Result<PartialState, AgentError> {
        let entry = match &state.user_submission {
            Some(submission) => ExecutionLogEntry::new(
                self.name().as_str(),
                "submission_received",
                json!({ "answers": submission.user_answers.len(), "topic": submission.quiz.topic }),
            ),
            None => ExecutionLogEntry::new(
                self.name().as_str(),
                "submission_missing",
                json!({}),
            ),
        };
        Ok(PartialState::new().with_log(entry))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::workers::schema::{fixtures, QuizSubmission};

    #[tokio::test]
    async fn test_gate_logs_whether_answers_arrived() {
        let mut state = SharedState::seed("quiz me");
        let partial = SubmissionGate.execute(&state).await.unwrap();
        assert_eq!(partial.execution_log[0].action, "submission_missing");

        state.user_submission = Some(QuizSubmission {
            quiz: fixtures::quiz(),
            user_answers: BTreeMap::from([("mcq_0".to_string(), "move".to_string())]),
        });
        let partial = SubmissionGate.execute(&state).await.unwrap();
        assert_eq!(partial.execution_log[0].action, "submission_received");
        assert_eq!(partial.execution_log[0].details["answers"], 1);
    }
}
