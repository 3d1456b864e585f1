//! 端到端编排测试：脚本化模型 + 内存 / 文件检查点

use std::sync::Arc;

use async_trait::async_trait;
use buddy::checkpoint::{CheckpointManager, CheckpointStore, FileCheckpointStore};
use buddy::config::AppConfig;
use buddy::core::{AgentError, Orchestrator, SharedState, Turn, WorkflowStatus};
use buddy::llm::ScriptedLlmClient;
use buddy::plan::{Action, WorkerName, UNSUPPORTED_REQUEST};
use buddy::tools::{Collaborators, ToolError, Video, VideoSearch};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const QUIZ: &str = r#"{
  "topic": "Rust ownership",
  "proficiency_level": "beginner",
  "mcq_questions": [
    {"question": "Which keyword moves a closure's captures?", "skill": "closures", "options": ["move", "ref"], "correct_answer": "move"},
    {"question": "How many mutable borrows may coexist?", "skill": "borrowing", "options": ["one", "many"], "correct_answer": "one"}
  ],
  "article_questions": [],
  "coding_questions": []
}"#;

const APPROVE: &str = r#"{"approved": true, "feedback": ""}"#;

struct Models {
    worker: Arc<ScriptedLlmClient>,
    critic: Arc<ScriptedLlmClient>,
    planner: Arc<ScriptedLlmClient>,
}

impl Models {
    fn new(plan: &str, worker: ScriptedLlmClient, critic: ScriptedLlmClient) -> Self {
        Self {
            worker: Arc::new(worker),
            critic: Arc::new(critic),
            planner: Arc::new(ScriptedLlmClient::new([plan])),
        }
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators::with_llm(self.worker.clone())
            .with_critic(self.critic.clone())
            .with_planner(self.planner.clone())
    }
}

fn config(grade_quizzes: bool) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.orchestrator.grade_quizzes = grade_quizzes;
    cfg
}

fn dispatches(state: &SharedState) -> usize {
    state
        .execution_log
        .iter()
        .filter(|e| e.node_name == "scheduler" && e.action == "dispatch")
        .count()
}

fn submission() -> serde_json::Value {
    json!({
        "quiz": serde_json::from_str::<serde_json::Value>(QUIZ).unwrap(),
        "user_answers": {"mcq_0": "move", "mcq_1": "many"}
    })
}

#[tokio::test]
async fn test_explain_then_quiz_dispatches_twice_then_ends() {
    let models = Models::new(
        r#"{"actions":["explain_node","quiz_generator"],"instructions":["Explain ownership","Quiz on ownership"]}"#,
        ScriptedLlmClient::new(["Ownership means each value has one owner.", QUIZ]),
        ScriptedLlmClient::new([APPROVE]),
    );
    let orchestrator = Orchestrator::new(&models.collaborators(), &config(false), CheckpointManager::in_memory());

    let result = orchestrator
        .handle(Turn::new("explain ownership then quiz me"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(dispatches(&result.state), 2);
    assert_eq!(result.state.next, Action::End);
    assert_eq!(result.state.pending_steps(), 0);
    assert!(result.state.quiz_output.is_some());
    assert!(result.reply.starts_with("Quiz on 'Rust ownership'"));
    // 累加字段按派发顺序追加
    assert!(result.state.research_memory[0].starts_with("Explanation of Explain ownership"));
    assert!(result.state.research_memory[1].starts_with("Quiz generated for"));
    assert_eq!(models.worker.calls(), 2);
}

#[tokio::test]
async fn test_three_rejections_exhaust_with_last_feedback() {
    let models = Models::new(
        r#"{"actions":["quiz_generator"],"instructions":["Quiz on ownership"]}"#,
        ScriptedLlmClient::new(Vec::<String>::new()).with_fallback(QUIZ),
        ScriptedLlmClient::new([
            r#"{"approved": false, "feedback": "f1"}"#,
            r#"{"approved": false, "feedback": "f2"}"#,
            r#"{"approved": false, "feedback": "f3"}"#,
        ]),
    );
    let orchestrator = Orchestrator::new(&models.collaborators(), &config(false), CheckpointManager::in_memory());

    let result = orchestrator
        .handle(Turn::new("quiz me"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.state.refinement_attempts, 3);
    assert!(result.reply.contains("Last feedback: f3"));
    assert!(result.state.quiz_output.is_none());
    assert_eq!(models.critic.calls(), 3);
    assert_eq!(models.worker.calls(), 3);
}

#[tokio::test]
async fn test_pause_resume_grades_and_second_resume_is_rejected() {
    let models = Models::new(
        r#"{"actions":["quiz_generator"],"instructions":["Quiz on ownership"]}"#,
        ScriptedLlmClient::new([QUIZ, "Solid on closures, revisit borrowing."]),
        ScriptedLlmClient::new([APPROVE]),
    );
    let orchestrator = Orchestrator::new(&models.collaborators(), &config(true), CheckpointManager::in_memory());

    let paused = orchestrator
        .handle(Turn::new("quiz me on ownership"), &CancellationToken::new())
        .await
        .unwrap();
    let session_id = paused.session_id().unwrap().to_string();
    assert!(matches!(
        paused.status,
        WorkflowStatus::Paused { at: WorkerName::AwaitSubmission, .. }
    ));
    assert!(paused.state.grader_output.is_none());

    let result = orchestrator
        .resume(&session_id, submission(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);
    let graded = result.state.grader_output.clone().unwrap();
    assert_eq!((graded.correct, graded.answered), (1, 2));
    assert_eq!(graded.accuracy, 50.0);
    assert_eq!(graded.summary_text, "Solid on closures, revisit borrowing.");
    assert!(result.reply.starts_with("Score: 1/2 (50%)"));
    // quiz_generator + await_submission + user_summary
    assert_eq!(dispatches(&result.state), 3);

    let err = orchestrator
        .resume(&session_id, submission(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::UnknownSession(id) if id == session_id));
}

#[tokio::test]
async fn test_resume_from_another_process_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let models = Models::new(
        r#"{"actions":["quiz_generator"],"instructions":["Quiz on ownership"]}"#,
        ScriptedLlmClient::new([QUIZ, "Keep practicing."]),
        ScriptedLlmClient::new([APPROVE]),
    );
    let store = || CheckpointManager::new(Arc::new(FileCheckpointStore::new(dir.path())));

    let first = Orchestrator::new(&models.collaborators(), &config(true), store());
    let paused = first
        .handle(Turn::new("quiz me"), &CancellationToken::new())
        .await
        .unwrap();
    let session_id = paused.session_id().unwrap().to_string();

    let second = Orchestrator::new(&models.collaborators(), &config(true), store());
    let result = second
        .resume(&session_id, submission(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.state.grader_output.is_some());

    let err = first
        .resume(&session_id, submission(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::UnknownSession(_)));
}

#[tokio::test]
async fn test_cancelled_resume_keeps_session() {
    let models = Models::new(
        r#"{"actions":["quiz_generator"],"instructions":["Quiz on ownership"]}"#,
        ScriptedLlmClient::new([QUIZ, "Good start."]),
        ScriptedLlmClient::new([APPROVE]),
    );
    let orchestrator = Orchestrator::new(&models.collaborators(), &config(true), CheckpointManager::in_memory());
    let paused = orchestrator
        .handle(Turn::new("quiz me"), &CancellationToken::new())
        .await
        .unwrap();
    let session_id = paused.session_id().unwrap().to_string();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = orchestrator
        .resume(&session_id, submission(), &cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(
        orchestrator.checkpoints().store().session_ids().await.unwrap(),
        vec![session_id.clone()]
    );

    let result = orchestrator
        .resume(&session_id, submission(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(result.state.grader_output.is_some());
}

struct BrokenVideo;

#[async_trait]
impl VideoSearch for BrokenVideo {
    async fn search_video(&self, _query: &str) -> Result<Vec<Video>, ToolError> {
        Err(ToolError::Http(503))
    }
}

#[tokio::test]
async fn test_video_failure_is_logged_and_run_completes() {
    let models = Models::new(
        r#"{"actions":["explain_node"],"instructions":["Explain borrowing"]}"#,
        ScriptedLlmClient::new(["Borrowing lends access without moving."]),
        ScriptedLlmClient::default(),
    );
    let collaborators = models.collaborators().with_video(Arc::new(BrokenVideo));
    let orchestrator = Orchestrator::new(&collaborators, &config(true), CheckpointManager::in_memory());

    let result = orchestrator
        .handle(Turn::new("explain borrowing"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(result.state.videos.is_empty());
    let entry = result
        .state
        .execution_log
        .iter()
        .find(|e| e.action == "video_search_failed")
        .unwrap();
    assert!(entry.details["error"].as_str().unwrap().contains("503"));
    assert_eq!(result.reply, "Borrowing lends access without moving.");
}

#[tokio::test]
async fn test_unknown_action_ends_without_dispatch() {
    let models = Models::new(
        r#"{"actions":["foo"],"instructions":["do foo"]}"#,
        ScriptedLlmClient::default(),
        ScriptedLlmClient::default(),
    );
    let orchestrator = Orchestrator::new(&models.collaborators(), &config(true), CheckpointManager::in_memory());

    let result = orchestrator
        .handle(Turn::new("book me a flight"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.reply, UNSUPPORTED_REQUEST);
    assert_eq!(dispatches(&result.state), 0);
    assert_eq!(models.worker.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_run_writes_no_checkpoint() {
    let models = Models::new(
        r#"{"actions":["quiz_generator"],"instructions":["Quiz"]}"#,
        ScriptedLlmClient::new([QUIZ]),
        ScriptedLlmClient::new([APPROVE]),
    );
    let checkpoints = CheckpointManager::in_memory();
    let orchestrator = Orchestrator::new(&models.collaborators(), &config(true), checkpoints.clone());
    let token = CancellationToken::new();
    token.cancel();

    let err = orchestrator.handle(Turn::new("quiz me"), &token).await.unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    assert!(checkpoints.store().session_ids().await.unwrap().is_empty());
}
