//! Worker：无状态的执行单元
//!
//! 每个 worker 拿到 SharedState 的只读引用，返回只含改动字段的 PartialState。
//! 协作方失败在 worker 内部降级为占位文本并写执行日志，不向调度器传播。

pub mod explainer;
pub mod gate;
pub mod grader;
pub mod quiz;
pub mod registry;
pub mod roadmap;
pub mod schema;
pub mod summarizer;

use async_trait::async_trait;
use serde_json::json;

use crate::core::{AgentError, ExecutionLogEntry, PartialState, RecoveryEngine, SharedState};
use crate::plan::WorkerName;
use crate::refine::Refined;

pub use explainer::ExplainerWorker;
pub use gate::SubmissionGate;
pub use grader::GraderWorker;
pub use quiz::QuizWorker;
pub use registry::WorkerRegistry;
pub use roadmap::RoadmapWorker;
pub use summarizer::SummarizerWorker;

#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> WorkerName;

    async fn execute(&self, state: &SharedState) -> Result<PartialState, AgentError>;
}

/// 当前步骤的指令；为空时退回原始请求
pub(crate) fn instruction_of(state: &SharedState) -> &str {
    if state.current_instruction.trim().is_empty() {
        &state.user_prompt
    } else {
        &state.current_instruction
    }
}

/// 协作方失败：返回占位文本与一条说明日志
pub(crate) fn degrade(node: WorkerName, collaborator: &str, err: AgentError) -> (String, ExecutionLogEntry) {
    let placeholder = RecoveryEngine::new().placeholder(&err);
    tracing::warn!(node = %node, collaborator, error = %err, "collaborator degraded");
    let entry = ExecutionLogEntry::new(
        node.as_str(),
        "collaborator_degraded",
        json!({ "collaborator": collaborator, "error": err.to_string() }),
    );
    (placeholder, entry)
}

/// 把精炼结果的计数、最新校验与每次失败反馈写入部分更新
pub(crate) fn record_refinement<T>(node: WorkerName, refined: &Refined<T>, mut partial: PartialState) -> PartialState {
    for (i, feedback) in refined.feedback_history.iter().enumerate() {
        partial.execution_log.push(ExecutionLogEntry::new(
            node.as_str(),
            "refine_attempt_failed",
            json!({ "attempt": i + 1, "feedback": feedback }),
        ));
    }
    partial.refinement_attempts = Some(refined.attempts);
    partial.validation_errors = Some(refined.validation.errors.clone());
    partial
}
