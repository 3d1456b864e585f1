//! 编排错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithFeedback / Repair / Degrade / Terminate。
//! 所有错误都以数据形式在组件间传递（写入 PartialState 或作为结果返回），不会以 panic 穿越边界。

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::llm::LlmError;
use crate::tools::ToolError;

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 生成模型调用本身失败（网络 / 鉴权 / 限流 / 超时）
    #[error("Generation failed: {0}")]
    GenerationFailure(#[from] LlmError),

    /// 生成文本无法解析为目标结构
    #[error("Schema parse failed: {0}")]
    SchemaParseFailure(String),

    /// 结构合法但违反业务规则（如路线图没有里程碑）
    #[error("Validation rules violated: {}", .0.join("; "))]
    ValidationRuleFailure(Vec<String>),

    /// 搜索 / 视频 / 文档检索不可用；调用方用占位文本降级
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(#[from] ToolError),

    /// resume 时会话不存在或已被恢复过
    #[error("Unknown or already resolved session: {0}")]
    UnknownSession(String),

    /// Plan Builder 产出了未注册的 action
    #[error("Plan routing failed: unknown action '{0}'")]
    PlanRouting(String),

    /// resume 载荷与暂停节点期望的形状不符
    #[error("Invalid resume payload: {0}")]
    InvalidPayload(String),

    #[error("Checkpoint store error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Cancelled")]
    Cancelled,
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 将反馈注入下一次生成（生成失败、业务规则违例）
    RetryWithFeedback(String),
    /// 交给修复模型重写一次（解析失败）
    Repair(String),
    /// 用占位文本继续（外部协作方不可用）
    Degrade(String),
    /// 终止当前调用并向调用方报告
    Terminate(String),
}
