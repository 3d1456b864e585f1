//! 调度器与驱动循环
//!
//! Scheduler::step 从计划队列队首弹出一步写入 next / current_instruction；队列为空时 next = END。
//! Driver 反复调用 step，把 next 派发给注册表中的 worker，按字段语义合并部分更新，直到 END、
//! 遇到中断节点（暂停，交给 CheckpointManager 持久化）或被取消。
//!
//! 每次派发写一条 node = "scheduler"、action = "dispatch" 的执行日志，并同步输出一条审计日志。

use std::collections::HashSet;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, ExecutionLogEntry, SharedState};
use crate::observability::{audit, preview};
use crate::plan::{Action, WorkerName};
use crate::workers::WorkerRegistry;

const NODE: &str = "scheduler";

/// 单步调度
pub struct Scheduler;

impl Scheduler {
    pub fn step(state: &mut SharedState) -> Action {
        match state.pop_step() {
            Some((action, instruction)) => {
                state.next = action;
                state.current_instruction = instruction;
            }
            None => {
                state.next = Action::End;
                state.current_instruction.clear();
            }
        }
        state.next
    }
}

/// 一次驱动的结果
#[derive(Debug)]
pub enum RunOutcome {
    Completed(SharedState),
    /// 在中断节点之前停下；next / current_instruction 已指向该节点
    Interrupted { state: SharedState, at: WorkerName },
}

impl RunOutcome {
    pub fn state(&self) -> &SharedState {
        match self {
            RunOutcome::Completed(state) => state,
            RunOutcome::Interrupted { state, .. } => state,
        }
    }

    pub fn into_state(self) -> SharedState {
        match self {
            RunOutcome::Completed(state) => state,
            RunOutcome::Interrupted { state, .. } => state,
        }
    }
}

#[derive(Clone)]
pub struct Driver {
    registry: WorkerRegistry,
    interrupts: HashSet<WorkerName>,
}

impl Driver {
    /// 默认中断点：await_submission
    pub fn new(registry: WorkerRegistry) -> Self {
        Self {
            registry,
            interrupts: HashSet::from([WorkerName::AwaitSubmission]),
        }
    }

    /// 从队首开始驱动，直到 END / 中断 / 取消
    pub async fn run(&self, mut state: SharedState, cancel: &CancellationToken) -> Result<RunOutcome, AgentError> {
        loop {
            if cancel.is_cancelled() {
                tracing::info!(pending = state.pending_steps(), "run cancelled");
                return Err(AgentError::Cancelled);
            }

            let worker = match Scheduler::step(&mut state) {
                Action::End => {
                    finish(&mut state);
                    return Ok(RunOutcome::Completed(state));
                }
                Action::Worker(worker) => worker,
            };

            if self.interrupts.contains(&worker) {
                let entry = ExecutionLogEntry::new(
                    NODE,
                    "interrupt",
                    json!({ "at": worker.as_str(), "pending": state.pending_steps() }),
                );
                record(&mut state, entry);
                tracing::info!(at = %worker, "run interrupted");
                return Ok(RunOutcome::Interrupted { state, at: worker });
            }

            self.dispatch(&mut state, worker).await;
        }
    }

    /// 恢复：先派发暂停时的节点，再继续队列
    ///
    /// 暂停节点总会派发，取消从其后的步骤开始生效；会话已认领，调用方须在此之前检查取消。
    pub async fn resume_at(
        &self,
        mut state: SharedState,
        paused_at: WorkerName,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        state.next = Action::Worker(paused_at);
        self.dispatch(&mut state, paused_at).await;
        self.run(state, cancel).await
    }

    /// 派发一步；worker 错误转为 last_error 与日志，不中断运行
    async fn dispatch(&self, state: &mut SharedState, worker: WorkerName) {
        let entry = ExecutionLogEntry::new(
            NODE,
            "dispatch",
            json!({
                "worker": worker.as_str(),
                "instruction": preview(&state.current_instruction, 200),
            }),
        );
        record(state, entry);

        let result = match self.registry.get(worker) {
            Some(w) => w.execute(state).await,
            None => Err(AgentError::PlanRouting(worker.as_str().to_string())),
        };

        match result {
            Ok(partial) => {
                for entry in &partial.execution_log {
                    mirror(entry);
                }
                state.merge(partial);
            }
            Err(e) => {
                tracing::warn!(worker = %worker, error = %e, "worker failed");
                state.last_error = Some(e.to_string());
                record(
                    state,
                    ExecutionLogEntry::new(
                        worker.as_str(),
                        "worker_failed",
                        json!({ "error": e.to_string() }),
                    ),
                );
            }
        }
    }
}

/// END：计划自带的说明作为最终输出（未有 worker 写过时）
fn finish(state: &mut SharedState) {
    let instruction = state.current_instruction.trim();
    if state.final_output.is_none() && !instruction.is_empty() {
        state.final_output = Some(instruction.to_string());
    }
    tracing::debug!(steps = state.execution_log.len(), "run completed");
}

fn record(state: &mut SharedState, entry: ExecutionLogEntry) {
    mirror(&entry);
    state.log(entry);
}

fn mirror(entry: &ExecutionLogEntry) {
    audit(
        &entry.action,
        json!({
            "node": entry.node_name,
            "timestamp": entry.timestamp.to_rfc3339(),
            "details": entry.details,
        }),
    );
}
