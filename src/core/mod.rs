//! 核心编排层：错误与恢复、共享状态、调度驱动、主控流程

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod scheduler;
pub mod state;

pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{
    collaborators_from_config, create_llm_from_config, resolve_milestone, Orchestrator, Turn, WorkflowResult,
    WorkflowStatus,
};
pub use recovery::{RecoveryEngine, UNAVAILABLE_PLACEHOLDER};
pub use scheduler::{Driver, RunOutcome, Scheduler};
pub use state::{field_kind, ExecutionLogEntry, FieldKind, PartialState, SharedState, FIELD_KINDS};
