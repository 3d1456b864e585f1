//! 检查点管理：暂停、带载荷恢复、过期清理
//!
//! 恢复顺序：peek 确认会话存在 → 按暂停节点校验载荷 → take 认领（竞争失败视为已恢复）→ 注入载荷。
//! 载荷不合法时会话保持原样，调用方可以修正后重试。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::checkpoint::{
    validate_session_id, CheckpointError, CheckpointStore, CheckpointedSession, FileCheckpointStore,
    InMemoryCheckpointStore,
};
use crate::config::CheckpointSection;
use crate::core::{AgentError, SharedState};
use crate::plan::WorkerName;
use crate::workers::schema::QuizSubmission;

#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCheckpointStore::new()))
    }

    /// 按 [checkpoint] 段选择后端；file 后端默认目录 {data_dir}/checkpoints
    pub fn from_section(section: &CheckpointSection, data_dir: &Path) -> Self {
        match section.backend.as_str() {
            "memory" => Self::in_memory(),
            other => {
                if other != "file" {
                    tracing::warn!(backend = %other, "unknown checkpoint backend, using file");
                }
                let dir = section
                    .dir
                    .clone()
                    .unwrap_or_else(|| data_dir.join("checkpoints"));
                Self::new(Arc::new(FileCheckpointStore::new(dir)))
            }
        }
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// 以新生成的 session id 暂停
    pub async fn pause(&self, state: SharedState, at: WorkerName) -> Result<String, AgentError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.pause_as(&session_id, state, at).await?;
        Ok(session_id)
    }

    pub async fn pause_as(&self, session_id: &str, state: SharedState, at: WorkerName) -> Result<(), AgentError> {
        if self.store.peek(session_id).await?.is_some() {
            return Err(CheckpointError::SessionExists(session_id.to_string()).into());
        }
        self.store
            .save(CheckpointedSession::new(session_id, state, at))
            .await?;
        tracing::info!(session_id = %session_id, paused_at = %at, "session paused");
        Ok(())
    }

    /// 认领会话并注入载荷，返回 (状态, 暂停节点)
    pub async fn resume(
        &self,
        session_id: &str,
        payload: serde_json::Value,
    ) -> Result<(SharedState, WorkerName), AgentError> {
        // 不合法的 id 不可能对应任何会话，各后端统一报 UnknownSession
        if validate_session_id(session_id).is_err() {
            return Err(AgentError::UnknownSession(session_id.to_string()));
        }
        let pending = self
            .store
            .peek(session_id)
            .await?
            .ok_or_else(|| AgentError::UnknownSession(session_id.to_string()))?;
        let injection = parse_payload(pending.paused_at, payload)?;

        let session = self
            .store
            .take(session_id)
            .await?
            .ok_or_else(|| AgentError::UnknownSession(session_id.to_string()))?;

        let mut state = session.saved_state;
        injection.apply(&mut state);
        tracing::info!(session_id = %session_id, paused_at = %session.paused_at, "session resumed");
        Ok((state, session.paused_at))
    }

    pub async fn purge(&self, retention: Duration) -> Result<usize, AgentError> {
        let purged = self.store.purge_older_than(retention).await?;
        if purged > 0 {
            tracing::info!(purged, "expired checkpoints purged");
        }
        Ok(purged)
    }
}

/// 各暂停节点期望的载荷
enum Injection {
    Submission(QuizSubmission),
}

impl Injection {
    fn apply(self, state: &mut SharedState) {
        match self {
            Injection::Submission(submission) => state.user_submission = Some(submission),
        }
    }
}

fn parse_payload(at: WorkerName, payload: serde_json::Value) -> Result<Injection, AgentError> {
    match at {
        WorkerName::AwaitSubmission => serde_json::from_value::<QuizSubmission>(payload)
            .map(Injection::Submission)
            .map_err(|e| AgentError::InvalidPayload(format!("expected {{quiz, user_answers}}: {e}"))),
        other => Err(AgentError::InvalidPayload(format!("{other} is not a pause point"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::schema::fixtures;

    fn submission_payload() -> serde_json::Value {
        serde_json::json!({
            "quiz": fixtures::quiz(),
            "user_answers": {"mcq_0": "move"}
        })
    }

    #[tokio::test]
    async fn test_resume_injects_submission_once() {
        let manager = CheckpointManager::in_memory();
        manager
            .pause_as("s1", SharedState::seed("quiz me"), WorkerName::AwaitSubmission)
            .await
            .unwrap();

        let (state, at) = manager.resume("s1", submission_payload()).await.unwrap();
        assert_eq!(at, WorkerName::AwaitSubmission);
        let sub = state.user_submission.unwrap();
        assert_eq!(sub.user_answers.get("mcq_0").map(String::as_str), Some("move"));

        let err = manager.resume("s1", submission_payload()).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownSession(id) if id == "s1"));
    }

    #[tokio::test]
    async fn test_bad_payload_keeps_session() {
        let manager = CheckpointManager::in_memory();
        manager
            .pause_as("s2", SharedState::seed("q"), WorkerName::AwaitSubmission)
            .await
            .unwrap();

        let err = manager
            .resume("s2", serde_json::json!({"answers": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidPayload(_)));
        assert!(manager.resume("s2", submission_payload()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let manager = CheckpointManager::in_memory();
        let err = manager.resume("nope", submission_payload()).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn test_malformed_id_is_unknown_on_every_backend() {
        let dir = tempfile::tempdir().unwrap();
        let managers = [
            CheckpointManager::in_memory(),
            CheckpointManager::new(Arc::new(FileCheckpointStore::new(dir.path()))),
        ];
        for manager in managers {
            for id in ["no/such session", "../etc/passwd", ""] {
                let err = manager.resume(id, submission_payload()).await.unwrap_err();
                assert!(matches!(err, AgentError::UnknownSession(ref got) if got == id), "{err:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_duplicate_pause_is_rejected() {
        let manager = CheckpointManager::in_memory();
        let id = manager
            .pause(SharedState::seed("q"), WorkerName::AwaitSubmission)
            .await
            .unwrap();
        let err = manager
            .pause_as(&id, SharedState::seed("q"), WorkerName::AwaitSubmission)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Checkpoint(CheckpointError::SessionExists(_))));
    }
}
