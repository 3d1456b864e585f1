//! Plan Builder：一次模型调用把请求拆成 (worker, instruction) 序列
//!
//! - 动作只能是可规划 worker 或 END；出现未知动作、长度不一致、空计划时整体替换为 [END] + 统一回复
//! - 模型调用失败或输出无法解析时返回带说明的 [END]，不抛错
//! - 开启评分时每个 quiz_generator 之后自动插入 await_submission 与 user_summary

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::plan::{Action, Plan, WorkerName};
use crate::refine::{extract_json, format_instructions};

/// 规划模型的输出格式
#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
struct PlanFormat {
    /// The sequence of worker names to call, or END
    actions: Vec<String>,
    /// One self-contained instruction per action
    instructions: Vec<String>,
}

const SYSTEM_PROMPT: &str = "You are the orchestrator of a study assistant.

AVAILABLE WORKERS:
{workers}
- END: stop; use it alone when the request is outside these capabilities.

RULES:
- Workers are stateless and cannot see the chat history. When a request depends on earlier context
  (\"summarize that\", \"quiz me on what we discussed\"), copy the relevant details from the context
  into the worker's instruction.
- A request may need several workers in order; the same worker may appear more than once.
- For document-specific requests (\"page 5\"), name the source in the instruction.
- Always include the selected milestone when it applies: {milestone}

CONTEXT (SUMMARIZED FROM HISTORY):
------------------------------------------------
{context}
------------------------------------------------

{format}";

pub struct PlanBuilder {
    llm: Arc<dyn LlmClient>,
    grade_quizzes: bool,
}

impl PlanBuilder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            grade_quizzes: true,
        }
    }

    pub fn with_grading(mut self, enabled: bool) -> Self {
        self.grade_quizzes = enabled;
        self
    }

    fn system_prompt(&self, compressed_context: &str, milestone_context: Option<&str>) -> String {
        let workers: Vec<String> = WorkerName::ALL
            .iter()
            .filter(|w| w.is_plannable())
            .map(|w| format!("- {}: {}", w.as_str(), w.capability()))
            .collect();
        SYSTEM_PROMPT
            .replace("{workers}", &workers.join("\n"))
            .replace("{milestone}", milestone_context.unwrap_or("No specific milestone selected."))
            .replace("{context}", compressed_context)
            .replace("{format}", &format_instructions::<PlanFormat>())
    }

    pub async fn build(&self, request: &str, compressed_context: &str, milestone_context: Option<&str>) -> Plan {
        let messages = [
            Message::system(self.system_prompt(compressed_context, milestone_context)),
            Message::user(request),
        ];
        let plan = match self.llm.complete(&messages).await {
            Ok(output) => self.plan_from_output(&output),
            Err(e) => {
                tracing::warn!(error = %e, "planner call failed");
                Plan::end(format!(
                    "I could not plan this request because the planning service failed ({e}). Please try again."
                ))
            }
        };
        tracing::info!(
            actions = ?plan.actions().iter().map(Action::as_str).collect::<Vec<_>>(),
            "plan built"
        );
        plan
    }

    /// 解析并校验模型输出
    pub fn plan_from_output(&self, output: &str) -> Plan {
        let format: PlanFormat = match serde_json::from_str(extract_json(output)) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "planner output is not a valid plan");
                return Plan::end(
                    "I could not understand how to handle this request. Please rephrase it.",
                );
            }
        };

        match self.validate(format) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(error = %e, "plan rejected");
                Plan::unsupported()
            }
        }
    }

    fn validate(&self, format: PlanFormat) -> Result<Plan, AgentError> {
        let actions = format
            .actions
            .iter()
            .map(|a| Action::parse_plannable(a))
            .collect::<Result<Vec<_>, _>>()?;
        let plan = Plan::new(actions, format.instructions)?;
        Ok(if self.grade_quizzes {
            insert_grading(plan)
        } else {
            plan
        })
    }
}

/// 每个 quiz_generator 之后插入 await_submission + user_summary
fn insert_grading(plan: Plan) -> Plan {
    if !plan.actions().contains(&Action::Worker(WorkerName::QuizGenerator)) {
        return plan;
    }
    let (actions, instructions) = plan.into_parts();
    let mut out_actions = Vec::with_capacity(actions.len() + 2);
    let mut out_instructions = Vec::with_capacity(actions.len() + 2);
    for (action, instruction) in actions.into_iter().zip(instructions) {
        let is_quiz = action == Action::Worker(WorkerName::QuizGenerator);
        out_actions.push(action);
        out_instructions.push(instruction);
        if is_quiz {
            out_actions.push(Action::Worker(WorkerName::AwaitSubmission));
            out_instructions.push("Wait for the learner to submit answers to the quiz.".to_string());
            out_actions.push(Action::Worker(WorkerName::Grader));
            out_instructions.push("Grade the submitted quiz and summarize strengths and weaknesses.".to_string());
        }
    }
    Plan::new(out_actions, out_instructions).unwrap_or_else(|_| Plan::unsupported())
}
