//! 评分 worker（user_summary）
//!
//! 把答卷（键为 mcq_{i}）合并进测验，统计选择题：未作答跳过，正确率为百分比并保留两位小数；
//! 答对的题目记为强项，答错记为弱项，再请模型写一段学习总结。

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;

use crate::core::{AgentError, ExecutionLogEntry, PartialState, SharedState};
use crate::memory::Message;
use crate::plan::WorkerName;
use crate::tools::Collaborators;
use crate::workers::schema::{GraderOutput, Quiz};
use crate::workers::Worker;

pub const NO_SUBMISSION: &str = "No user submission found";
pub const SUMMARY_FAILED: &str = "Summary generation failed.";

/// 纯计分结果（不含模型总结）
#[derive(Debug, Clone, PartialEq)]
pub struct Scorecard {
    pub accuracy: f64,
    pub correct: usize,
    pub answered: usize,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

pub fn score(quiz: &Quiz, answers: &BTreeMap<String, String>) -> Scorecard {
    let mut correct = 0;
    let mut answered = 0;
    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();

    for (i, q) in quiz.mcq_questions.iter().enumerate() {
        let Some(answer) = answers.get(&format!("mcq_{i}")) else {
            continue;
        };
        answered += 1;
        if answer.trim() == q.correct_answer.trim() {
            correct += 1;
            strengths.push(q.question.clone());
        } else {
            weaknesses.push(q.question.clone());
        }
    }

    let accuracy = if answered == 0 {
        0.0
    } else {
        (correct as f64 / answered as f64 * 100.0 * 100.0).round() / 100.0
    };

    Scorecard {
        accuracy,
        correct,
        answered,
        strengths,
        weaknesses,
    }
}

pub struct GraderWorker {
    collaborators: Collaborators,
}

impl GraderWorker {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    async fn summarize(&self, card: &Scorecard) -> String {
        let prompt = format!(
            "You are an educational analyst.\n\n\
             User quiz performance data:\n- Accuracy: {}%\n- Correct answers: {}/{}\n\n\
             Strength areas:\n{:?}\n\nWeak areas:\n{:?}\n\n\
             TASK:\nGenerate a concise learning summary with:\n\
             1. Overall performance assessment\n2. Key strengths\n3. Key weaknesses\n4. Clear learning recommendations\n\n\
             Keep it short, factual, and reusable.",
            card.accuracy, card.correct, card.answered, card.strengths, card.weaknesses
        );
        match self.collaborators.llm.generate(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "grading summary failed");
                SUMMARY_FAILED.to_string()
            }
        }
    }
}

#[async_trait]
impl Worker for GraderWorker {
    fn name(&self) -> WorkerName {
        WorkerName::Grader
    }

    async fn execute(&self, state: &SharedState) -> Result<PartialState, AgentError> {
        let Some(submission) = &state.user_submission else {
            return Ok(PartialState::new()
                .with_error(NO_SUBMISSION)
                .with_final_output(NO_SUBMISSION)
                .with_log(ExecutionLogEntry::new(
                    self.name().as_str(),
                    "grading_skipped",
                    json!({ "reason": NO_SUBMISSION }),
                )));
        };

        let card = score(&submission.quiz, &submission.user_answers);
        tracing::info!(accuracy = card.accuracy, correct = card.correct, answered = card.answered, "quiz graded");
        let summary_text = self.summarize(&card).await;

        let output = GraderOutput {
            accuracy: card.accuracy,
            correct: card.correct,
            answered: card.answered,
            strengths: card.strengths,
            weaknesses: card.weaknesses,
            summary_text,
        };
        let report = format!(
            "Score: {}/{} ({}%)\n\n{}",
            output.correct, output.answered, output.accuracy, output.summary_text
        );

        let mut partial = PartialState::new()
            .with_message(Message::system("User quiz performance analysis completed"))
            .with_raw(json!({ "user_profile_summary": &output }))
            .with_log(ExecutionLogEntry::new(
                self.name().as_str(),
                "quiz_graded",
                json!({ "accuracy": output.accuracy, "answered": output.answered }),
            ))
            .with_final_output(report);
        partial.grader_output = Some(output);
        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::workers::schema::{fixtures, QuizSubmission};
    use std::sync::Arc;

    fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_score_skips_unanswered_and_rounds() {
        let quiz = fixtures::quiz();
        let card = score(&quiz, &answers(&[("mcq_0", "move"), ("mcq_1", "many"), ("mcq_2", "no")]));
        assert_eq!(card.correct, 2);
        assert_eq!(card.answered, 3);
        assert_eq!(card.accuracy, 66.67);
        assert_eq!(card.weaknesses, vec![quiz.mcq_questions[1].question.clone()]);

        let partial = score(&quiz, &answers(&[("mcq_1", "one")]));
        assert_eq!(partial.answered, 1);
        assert_eq!(partial.accuracy, 100.0);
    }

    #[test]
    fn test_score_nothing_answered() {
        let card = score(&fixtures::quiz(), &BTreeMap::new());
        assert_eq!(card.accuracy, 0.0);
        assert!(card.strengths.is_empty() && card.weaknesses.is_empty());
    }

    #[tokio::test]
    async fn test_missing_submission() {
        let worker = GraderWorker::new(Collaborators::with_llm(Arc::new(ScriptedLlmClient::default())));
        let partial = worker.execute(&SharedState::seed("grade")).await.unwrap();
        assert_eq!(partial.last_error.as_deref(), Some(NO_SUBMISSION));
        assert!(partial.grader_output.is_none());
    }

    #[tokio::test]
    async fn test_summary_fallback_text() {
        let llm = Arc::new(ScriptedLlmClient::failing(LlmError::Timeout(2)));
        let worker = GraderWorker::new(Collaborators::with_llm(llm));
        let mut state = SharedState::seed("grade");
        state.user_submission = Some(QuizSubmission {
            quiz: fixtures::quiz(),
            user_answers: answers(&[("mcq_0", "move")]),
        });

        let partial = worker.execute(&state).await.unwrap();
        let output = partial.grader_output.unwrap();
        assert_eq!(output.summary_text, SUMMARY_FAILED);
        assert_eq!(output.accuracy, 100.0);
    }
}
