//! Buddy - 学习助手编排引擎
//!
//! 模块划分：
//! - **checkpoint**: 暂停会话的持久化（内存 / 文件）与恢复
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、共享状态、调度驱动、主控流程
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话历史、分词、上下文压缩
//! - **observability**: tracing 初始化与审计日志
//! - **plan**: 计划类型与 Plan Builder
//! - **refine**: 生成 → 校验 → 评审的精炼循环
//! - **tools**: 网页搜索、视频搜索、文档检索等外部协作方
//! - **workers**: 路线图、测验、讲解、摘要、提交闸门、评分

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod refine;
pub mod tools;
pub mod workers;

pub use crate::core::{Orchestrator, Turn, WorkflowResult, WorkflowStatus};
