//! 检查点：暂停会话的持久化与一次性恢复
//!
//! 在指定的暂停点把完整 SharedState 按 session_id 存下并停止调度；resume 时取出（取出即删除），
//! 注入外部载荷后从暂停点继续。同一会话最多被恢复一次，会话之间不共享状态。

pub mod manager;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::SharedState;
use crate::plan::WorkerName;

pub use manager::CheckpointManager;
pub use store::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt checkpoint: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid session id '{0}'")]
    InvalidSessionId(String),

    #[error("session '{0}' is already paused")]
    SessionExists(String),
}

/// 一个暂停中的会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointedSession {
    pub session_id: String,
    pub saved_state: SharedState,
    /// 尚未执行的暂停节点
    pub paused_at: WorkerName,
    pub created_at: DateTime<Utc>,
}

impl CheckpointedSession {
    pub fn new(session_id: impl Into<String>, saved_state: SharedState, paused_at: WorkerName) -> Self {
        Self {
            session_id: session_id.into(),
            saved_state,
            paused_at,
            created_at: Utc::now(),
        }
    }
}

/// session id 只允许字母、数字、- 与 _（文件后端直接用作文件名）
pub fn validate_session_id(id: &str) -> Result<(), CheckpointError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(CheckpointError::InvalidSessionId(id.to_string()))
    }
}
