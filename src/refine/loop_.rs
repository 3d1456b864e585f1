//! 精炼循环状态机
//!
//! Generating → Validating → Critiquing → Accepted；任一环节失败计一次尝试，
//! 达到上限进入 Exhausted 并带出最后一次反馈。计数器归本循环所有，每次 run 从 0 开始。

use std::sync::Arc;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::llm::LlmClient;
use crate::refine::{format_instructions, Critic, RefineTarget, SchemaValidator, ValidationResult};
use crate::tools::Collaborators;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineState {
    Generating,
    Validating,
    Critiquing,
    Accepted,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefineOutcome<T> {
    Accepted(T),
    /// 最后一次反馈 + 最后一个能解析的值（可能未通过规则或评审）
    Exhausted { feedback: String, last: Option<T> },
}

/// 一次 run 的结果
#[derive(Debug, Clone)]
pub struct Refined<T> {
    pub outcome: RefineOutcome<T>,
    /// 失败的尝试次数
    pub attempts: u32,
    pub validation: ValidationResult,
    /// 每次失败尝试的反馈（按顺序）
    pub feedback_history: Vec<String>,
}

impl<T> Refined<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, RefineOutcome::Accepted(_))
    }
}

pub struct RefinementLoop {
    llm: Arc<dyn LlmClient>,
    validator: SchemaValidator,
    critic: Critic,
    recovery: RecoveryEngine,
    max_attempts: u32,
}

impl RefinementLoop {
    pub fn new(collaborators: &Collaborators, max_attempts: u32) -> Self {
        Self {
            llm: collaborators.llm.clone(),
            validator: SchemaValidator::new(collaborators.llm.clone()),
            critic: Critic::new(collaborators.critic_llm.clone()),
            recovery: RecoveryEngine::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 生成一个通过校验与评审的 T，或在上限处耗尽
    pub async fn run<T: RefineTarget>(&self, task: &str, context: &str) -> Refined<T> {
        let mut attempts = 0u32;
        let mut feedback_history: Vec<String> = Vec::new();
        let mut raw: Option<String> = None;
        let mut last: Option<T> = None;
        let mut validation = ValidationResult::default();
        let mut state = RefineState::Generating;

        loop {
            tracing::debug!(target_kind = T::NAME, ?state, attempts, "refine step");
            let failure = match state {
                RefineState::Generating => {
                    let prompt = self.generation_prompt::<T>(task, context, raw.as_deref(), feedback_history.last());
                    match self.llm.generate(&prompt).await {
                        Ok(text) => {
                            raw = Some(text);
                            state = RefineState::Validating;
                            None
                        }
                        Err(e) => Some(self.feedback_for(&AgentError::from(e))),
                    }
                }
                RefineState::Validating => {
                    let text = raw.clone().unwrap_or_default();
                    match self.validator.parse_or_repair::<T>(task, &text).await {
                        Ok((value, repaired)) => {
                            if repaired {
                                tracing::info!(target_kind = T::NAME, "output repaired");
                            }
                            if let Ok(normalized) = serde_json::to_string_pretty(&value) {
                                raw = Some(normalized);
                            }
                            let violations = value.validate();
                            validation = ValidationResult::from_errors(violations.clone());
                            last = Some(value);
                            if violations.is_empty() {
                                state = RefineState::Critiquing;
                                None
                            } else {
                                Some(self.feedback_for(&AgentError::ValidationRuleFailure(violations)))
                            }
                        }
                        Err(e) => {
                            validation = ValidationResult::from_errors(vec![e.to_string()]);
                            Some(self.feedback_for(&e))
                        }
                    }
                }
                RefineState::Critiquing => {
                    let text = raw.clone().unwrap_or_default();
                    let verdict = self.critic.review(task, T::NAME, &text).await;
                    if verdict.approved {
                        state = RefineState::Accepted;
                        None
                    } else {
                        Some(verdict.feedback)
                    }
                }
                RefineState::Accepted => {
                    tracing::info!(target_kind = T::NAME, attempts, "refinement accepted");
                    let outcome = match last {
                        Some(value) => RefineOutcome::Accepted(value),
                        None => RefineOutcome::Exhausted {
                            feedback: "accepted without a value".to_string(),
                            last: None,
                        },
                    };
                    return Refined {
                        outcome,
                        attempts,
                        validation,
                        feedback_history,
                    };
                }
                RefineState::Exhausted => {
                    let feedback = feedback_history.last().cloned().unwrap_or_default();
                    tracing::warn!(target_kind = T::NAME, attempts, feedback = %feedback, "refinement exhausted");
                    return Refined {
                        outcome: RefineOutcome::Exhausted { feedback, last },
                        attempts,
                        validation,
                        feedback_history,
                    };
                }
            };

            if let Some(feedback) = failure {
                attempts += 1;
                feedback_history.push(feedback);
                state = if attempts >= self.max_attempts {
                    RefineState::Exhausted
                } else {
                    RefineState::Generating
                };
            }
        }
    }

    fn feedback_for(&self, err: &AgentError) -> String {
        match self.recovery.handle(err) {
            RecoveryAction::RetryWithFeedback(text) => text,
            RecoveryAction::Repair(detail) => {
                format!("The previous output could not be parsed ({detail}). Return valid JSON only.")
            }
            RecoveryAction::Degrade(text) | RecoveryAction::Terminate(text) => text,
        }
    }

    fn generation_prompt<T: RefineTarget>(
        &self,
        task: &str,
        context: &str,
        prior: Option<&str>,
        feedback: Option<&String>,
    ) -> String {
        let mut prompt = format!(
            "You are an expert educational assistant. Produce a {kind}.\nTask: {task}\n\nContext:\n{context}\n",
            kind = T::NAME
        );
        if let Some(feedback) = feedback {
            if let Some(prior) = prior {
                prompt.push_str(&format!("\nPREVIOUS ATTEMPT:\n{prior}\n"));
            }
            prompt.push_str(&format!(
                "\nPREVIOUS ATTEMPT CRITIQUE: {feedback}\nFIX THESE ISSUES IN THE NEW {}.\n",
                T::NAME.to_uppercase()
            ));
        }
        prompt.push('\n');
        prompt.push_str(&format_instructions::<T>());
        prompt
    }
}
