//! 计划：worker 名称的封闭枚举、动作（worker 或 END）与等长的 (action, instruction) 序列
//!
//! Plan 只能经由 Plan::new 构造，保证 actions 与 instructions 等长、首个 END 之后的步骤被截断；
//! 构造后不可修改，调度时转入 SharedState 的队列字段逐个弹出。

pub mod builder;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

pub use builder::PlanBuilder;

/// 无法处理的请求 / 非法动作时的统一回复
pub const UNSUPPORTED_REQUEST: &str = "Sorry, I cannot do this task";

/// 已注册的 worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerName {
    /// 学习路线图生成
    #[serde(rename = "planner")]
    Planner,
    #[serde(rename = "quiz_generator")]
    QuizGenerator,
    /// 基于文档与搜索的讲解
    #[serde(rename = "explain_node")]
    ExplainNode,
    #[serde(rename = "summarizer")]
    Summarizer,
    /// 暂停点：等待学习者提交答案
    #[serde(rename = "await_submission")]
    AwaitSubmission,
    /// 测验评分与学习总结
    #[serde(rename = "user_summary")]
    Grader,
}

impl WorkerName {
    pub const ALL: [WorkerName; 6] = [
        WorkerName::Planner,
        WorkerName::QuizGenerator,
        WorkerName::ExplainNode,
        WorkerName::Summarizer,
        WorkerName::AwaitSubmission,
        WorkerName::Grader,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerName::Planner => "planner",
            WorkerName::QuizGenerator => "quiz_generator",
            WorkerName::ExplainNode => "explain_node",
            WorkerName::Summarizer => "summarizer",
            WorkerName::AwaitSubmission => "await_submission",
            WorkerName::Grader => "user_summary",
        }
    }

    /// 规划模型可以直接选用的 worker；暂停点与评分只由 PlanBuilder 自动插入
    pub fn is_plannable(&self) -> bool {
        !matches!(self, WorkerName::AwaitSubmission | WorkerName::Grader)
    }

    /// 注入规划 prompt 的能力描述
    pub fn capability(&self) -> &'static str {
        match self {
            WorkerName::Planner => "builds a structured learning roadmap (milestones and tasks) for a goal",
            WorkerName::QuizGenerator => "writes a quiz (multiple choice, short answer, coding) on a topic",
            WorkerName::ExplainNode => "explains a concept using the learner's documents, web results and videos",
            WorkerName::Summarizer => "summarizes the research gathered so far",
            WorkerName::AwaitSubmission => "waits for the learner to submit quiz answers",
            WorkerName::Grader => "grades a submitted quiz and summarizes strengths and weaknesses",
        }
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerName {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkerName::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| AgentError::PlanRouting(s.to_string()))
    }
}

/// 计划中的一步：某个 worker，或终止
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Action {
    Worker(WorkerName),
    #[default]
    End,
}

impl Action {
    pub const END: &'static str = "END";

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Worker(w) => w.as_str(),
            Action::End => Self::END,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Action::End)
    }

    /// 解析规划模型给出的动作名：只接受 END 与可规划 worker
    pub fn parse_plannable(s: &str) -> Result<Self, AgentError> {
        match s.trim().parse::<Action>()? {
            Action::Worker(w) if !w.is_plannable() => Err(AgentError::PlanRouting(s.to_string())),
            action => Ok(action),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::END {
            Ok(Action::End)
        } else {
            s.parse().map(Action::Worker)
        }
    }
}

impl From<Action> for String {
    fn from(a: Action) -> Self {
        a.as_str().to_string()
    }
}

impl TryFrom<String> for Action {
    type Error = AgentError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// 不可变计划
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    actions: Vec<Action>,
    instructions: Vec<String>,
}

impl Plan {
    /// 长度不一致或为空时报错；首个 END 之后的步骤被丢弃
    pub fn new(mut actions: Vec<Action>, mut instructions: Vec<String>) -> Result<Self, AgentError> {
        if actions.len() != instructions.len() {
            return Err(AgentError::PlanRouting(format!(
                "{} actions for {} instructions",
                actions.len(),
                instructions.len()
            )));
        }
        if actions.is_empty() {
            return Err(AgentError::PlanRouting("empty plan".to_string()));
        }
        if let Some(pos) = actions.iter().position(Action::is_end) {
            actions.truncate(pos + 1);
            instructions.truncate(pos + 1);
        }
        Ok(Self {
            actions,
            instructions,
        })
    }

    /// 单步终止计划，instruction 作为给用户的说明
    pub fn end(instruction: impl Into<String>) -> Self {
        Self {
            actions: vec![Action::End],
            instructions: vec![instruction.into()],
        }
    }

    pub fn unsupported() -> Self {
        Self::end(UNSUPPORTED_REQUEST)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn instructions(&self) -> &[String] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// 需要真正派发给 worker 的步数
    pub fn dispatch_count(&self) -> usize {
        self.actions.iter().filter(|a| !a.is_end()).count()
    }

    pub fn into_parts(self) -> (Vec<Action>, Vec<String>) {
        (self.actions, self.instructions)
    }
}
