//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供精炼循环决定是带反馈重试、修复、降级还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 协作方不可用时写入状态的占位文本
pub const UNAVAILABLE_PLACEHOLDER: &str = "[unavailable]";

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::GenerationFailure(e) => RecoveryAction::RetryWithFeedback(format!(
                "The previous generation call failed ({e}). Produce the complete output again."
            )),
            AgentError::SchemaParseFailure(raw) => RecoveryAction::Repair(raw.clone()),
            AgentError::ValidationRuleFailure(errors) => {
                let bullets: Vec<String> = errors.iter().map(|e| format!("- {e}")).collect();
                RecoveryAction::RetryWithFeedback(format!(
                    "The previous output broke these rules:\n{}\nFix every one of them.",
                    bullets.join("\n")
                ))
            }
            AgentError::CollaboratorUnavailable(e) => {
                RecoveryAction::Degrade(format!("{UNAVAILABLE_PLACEHOLDER} {e}"))
            }
            AgentError::PlanRouting(_) => {
                RecoveryAction::Terminate(crate::plan::UNSUPPORTED_REQUEST.to_string())
            }
            other => RecoveryAction::Terminate(other.to_string()),
        }
    }

    /// 协作方失败时的占位文本（Degrade 之外的错误也统一降级，保证 worker 不中断）
    pub fn placeholder(&self, err: &AgentError) -> String {
        match self.handle(err) {
            RecoveryAction::Degrade(text) => text,
            _ => format!("{UNAVAILABLE_PLACEHOLDER} {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::tools::ToolError;

    #[test]
    fn test_recovery_generation_failure() {
        let engine = RecoveryEngine::new();
        let err = AgentError::GenerationFailure(LlmError::Timeout(30));
        match engine.handle(&err) {
            RecoveryAction::RetryWithFeedback(msg) => assert!(msg.contains("failed")),
            other => panic!("Expected RetryWithFeedback, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_parse_failure_repairs() {
        let engine = RecoveryEngine::new();
        let err = AgentError::SchemaParseFailure("missing field `goal`".to_string());
        assert_eq!(
            engine.handle(&err),
            RecoveryAction::Repair("missing field `goal`".to_string())
        );
    }

    #[test]
    fn test_recovery_rule_failure_lists_violations() {
        let engine = RecoveryEngine::new();
        let err = AgentError::ValidationRuleFailure(vec![
            "roadmap has no milestones".to_string(),
            "duration is empty".to_string(),
        ]);
        match engine.handle(&err) {
            RecoveryAction::RetryWithFeedback(msg) => {
                assert!(msg.contains("- roadmap has no milestones"));
                assert!(msg.contains("- duration is empty"));
            }
            other => panic!("Expected RetryWithFeedback, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_collaborator_degrades() {
        let engine = RecoveryEngine::new();
        let err = AgentError::CollaboratorUnavailable(ToolError::NotConfigured("video".into()));
        let text = engine.placeholder(&err);
        assert!(text.starts_with(UNAVAILABLE_PLACEHOLDER));
        assert!(text.contains("video"));
    }

    #[test]
    fn test_recovery_unknown_session_terminates() {
        let engine = RecoveryEngine::new();
        let err = AgentError::UnknownSession("s1".to_string());
        assert!(matches!(engine.handle(&err), RecoveryAction::Terminate(_)));
    }
}
