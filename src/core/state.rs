//! 共享状态：一次运行内的唯一事实来源
//!
//! Scheduler 持有 SharedState；worker 只拿到只读引用并返回 PartialState，由 SharedState::merge 查 FIELD_KINDS 按字段语义合并：
//! - Replace：后写覆盖
//! - Accumulate：追加，永不替换
//! - Queue：只由 Scheduler 从队首弹出，worker 写入会被丢弃

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::Message;
use crate::plan::{Action, Plan};
use crate::tools::Video;
use crate::workers::schema::{GraderOutput, Quiz, QuizSubmission, Roadmap};

/// 字段合并语义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Replace,
    Accumulate,
    Queue,
}

/// SharedState 每个字段的合并语义
pub const FIELD_KINDS: &[(&str, FieldKind)] = &[
    ("user_prompt", FieldKind::Replace),
    ("current_instruction", FieldKind::Replace),
    ("next", FieldKind::Replace),
    ("roadmap", FieldKind::Replace),
    ("quiz_output", FieldKind::Replace),
    ("videos", FieldKind::Replace),
    ("validation_errors", FieldKind::Replace),
    ("final_output", FieldKind::Replace),
    ("last_error", FieldKind::Replace),
    ("refinement_attempts", FieldKind::Replace),
    ("conversation_summary", FieldKind::Replace),
    ("selected_milestone_context", FieldKind::Replace),
    ("user_submission", FieldKind::Replace),
    ("grader_output", FieldKind::Replace),
    ("research_memory", FieldKind::Accumulate),
    ("execution_log", FieldKind::Accumulate),
    ("raw_data_storage", FieldKind::Accumulate),
    ("messages", FieldKind::Accumulate),
    ("plan_actions", FieldKind::Queue),
    ("plan_instructions", FieldKind::Queue),
];

pub fn field_kind(name: &str) -> Option<FieldKind> {
    FIELD_KINDS
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, kind)| *kind)
}

/// 执行日志条目（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub node_name: String,
    pub action: String,
    pub details: serde_json::Value,
}

impl ExecutionLogEntry {
    pub fn new(node_name: impl Into<String>, action: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            node_name: node_name.into(),
            action: action.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedState {
    pub user_prompt: String,
    pub messages: Vec<Message>,
    pub final_output: Option<String>,

    plan_actions: VecDeque<Action>,
    plan_instructions: VecDeque<String>,
    pub current_instruction: String,
    pub next: Action,

    pub roadmap: Option<Roadmap>,
    pub quiz_output: Option<Quiz>,
    pub validation_errors: Vec<String>,
    pub refinement_attempts: u32,

    pub execution_log: Vec<ExecutionLogEntry>,
    pub research_memory: Vec<String>,
    pub raw_data_storage: Vec<serde_json::Value>,
    pub videos: Vec<Video>,

    /// 压缩后的上下文（规划前生成一次）
    pub conversation_summary: String,
    pub selected_milestone_context: Option<String>,

    pub user_submission: Option<QuizSubmission>,
    pub grader_output: Option<GraderOutput>,
    pub last_error: Option<String>,
}

impl SharedState {
    /// 种子状态：请求 + 空累加器
    pub fn seed(user_prompt: impl Into<String>) -> Self {
        let user_prompt = user_prompt.into();
        Self {
            messages: vec![Message::user(user_prompt.clone())],
            user_prompt,
            ..Self::default()
        }
    }

    /// 装入计划（覆盖尚未消费的队列）
    pub fn load_plan(&mut self, plan: Plan) {
        let (actions, instructions) = plan.into_parts();
        self.plan_actions = actions.into();
        self.plan_instructions = instructions.into();
    }

    pub fn pending_actions(&self) -> impl Iterator<Item = &Action> {
        self.plan_actions.iter()
    }

    pub fn pending_steps(&self) -> usize {
        self.plan_actions.len()
    }

    /// 弹出队首一步；两个队列同步弹出
    pub(crate) fn pop_step(&mut self) -> Option<(Action, String)> {
        let action = self.plan_actions.pop_front()?;
        let instruction = self.plan_instructions.pop_front().unwrap_or_default();
        Some((action, instruction))
    }

    pub fn log(&mut self, entry: ExecutionLogEntry) {
        self.execution_log.push(entry);
    }

    /// 按字段语义合并 worker 的部分更新
    pub fn merge(&mut self, update: PartialState) {
        let PartialState {
            messages,
            research_memory,
            execution_log,
            raw_data_storage,
            final_output,
            roadmap,
            quiz_output,
            videos,
            validation_errors,
            refinement_attempts,
            selected_milestone_context,
            grader_output,
            last_error,
            plan_actions,
            plan_instructions,
        } = update;

        accumulate("messages", &mut self.messages, messages);
        accumulate("research_memory", &mut self.research_memory, research_memory);
        accumulate("execution_log", &mut self.execution_log, execution_log);
        accumulate("raw_data_storage", &mut self.raw_data_storage, raw_data_storage);

        replace("final_output", &mut self.final_output, final_output.map(Some));
        replace("roadmap", &mut self.roadmap, roadmap.map(Some));
        replace("quiz_output", &mut self.quiz_output, quiz_output.map(Some));
        replace("videos", &mut self.videos, videos);
        replace("validation_errors", &mut self.validation_errors, validation_errors);
        replace("refinement_attempts", &mut self.refinement_attempts, refinement_attempts);
        replace(
            "selected_milestone_context",
            &mut self.selected_milestone_context,
            selected_milestone_context.map(Some),
        );
        replace("grader_output", &mut self.grader_output, grader_output.map(Some));
        replace("last_error", &mut self.last_error, last_error.map(Some));

        replace("plan_actions", &mut self.plan_actions, plan_actions.map(VecDeque::from));
        replace("plan_instructions", &mut self.plan_instructions, plan_instructions.map(VecDeque::from));
    }
}

/// 单值字段：只有 Replace 字段接受写入，Queue 字段的写入被丢弃
fn replace<T>(field: &str, slot: &mut T, value: Option<T>) {
    let Some(value) = value else { return };
    match field_kind(field) {
        Some(FieldKind::Replace) => *slot = value,
        kind => tracing::warn!(field, ?kind, "worker update to non-replace field ignored"),
    }
}

/// 序列字段：Accumulate 追加，永不替换
fn accumulate<T>(field: &str, slot: &mut Vec<T>, values: Vec<T>) {
    if values.is_empty() {
        return;
    }
    match field_kind(field) {
        Some(FieldKind::Accumulate) => slot.extend(values),
        kind => tracing::warn!(field, ?kind, "worker update to non-accumulate field ignored"),
    }
}

/// worker 返回的部分更新：None / 空 Vec 表示未改动
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialState {
    pub messages: Vec<Message>,
    pub research_memory: Vec<String>,
    pub execution_log: Vec<ExecutionLogEntry>,
    pub raw_data_storage: Vec<serde_json::Value>,

    pub final_output: Option<String>,
    pub roadmap: Option<Roadmap>,
    pub quiz_output: Option<Quiz>,
    pub videos: Option<Vec<Video>>,
    pub validation_errors: Option<Vec<String>>,
    pub refinement_attempts: Option<u32>,
    pub selected_milestone_context: Option<String>,
    pub grader_output: Option<GraderOutput>,
    pub last_error: Option<String>,

    /// 只有 Scheduler 能改写队列；这里出现的值会被 merge 丢弃
    pub plan_actions: Option<Vec<Action>>,
    pub plan_instructions: Option<Vec<String>>,
}

impl PartialState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, msg: Message) -> Self {
        self.messages.push(msg);
        self
    }

    pub fn with_research(mut self, note: impl Into<String>) -> Self {
        self.research_memory.push(note.into());
        self
    }

    pub fn with_log(mut self, entry: ExecutionLogEntry) -> Self {
        self.execution_log.push(entry);
        self
    }

    pub fn with_raw(mut self, value: serde_json::Value) -> Self {
        self.raw_data_storage.push(value);
        self
    }

    pub fn with_final_output(mut self, text: impl Into<String>) -> Self {
        self.final_output = Some(text.into());
        self
    }

    pub fn with_error(mut self, text: impl Into<String>) -> Self {
        self.last_error = Some(text.into());
        self
    }
}
