//! 检查点存储：内存与 JSON 文件两种后端
//!
//! take 是"读取并删除"的原子操作，保证同一会话只能被恢复一次：
//! 内存后端在写锁内 remove，文件后端先 rename 认领再读取。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::checkpoint::{validate_session_id, CheckpointError, CheckpointedSession};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, session: CheckpointedSession) -> Result<(), CheckpointError>;

    /// 只读查看，不消费
    async fn peek(&self, session_id: &str) -> Result<Option<CheckpointedSession>, CheckpointError>;

    /// 取出并删除；不存在或已被取走时返回 None
    async fn take(&self, session_id: &str) -> Result<Option<CheckpointedSession>, CheckpointError>;

    /// 删除早于 age 的会话，返回删除数
    async fn purge_older_than(&self, age: Duration) -> Result<usize, CheckpointError>;

    async fn session_ids(&self) -> Result<Vec<String>, CheckpointError>;
}

fn cutoff(age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 进程内存储
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    sessions: RwLock<HashMap<String, CheckpointedSession>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, session: CheckpointedSession) -> Result<(), CheckpointError> {
        validate_session_id(&session.session_id)?;
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn peek(&self, session_id: &str) -> Result<Option<CheckpointedSession>, CheckpointError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn take(&self, session_id: &str) -> Result<Option<CheckpointedSession>, CheckpointError> {
        Ok(self.sessions.write().await.remove(session_id))
    }

    async fn purge_older_than(&self, age: Duration) -> Result<usize, CheckpointError> {
        let cutoff = cutoff(age);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.created_at >= cutoff);
        Ok(before - sessions.len())
    }

    async fn session_ids(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// 每个会话一个 {dir}/{session_id}.json；跨进程时 rename 保证只有一个进程能认领
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, CheckpointError> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    /// 崩溃遗留的 .{id}.tmp / .{id}.claimed-* 按文件 mtime 清理，不计入会话数
    async fn sweep_orphans(&self, age: Duration) -> Result<(), CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let cutoff = SystemTime::now().checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH);
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let orphan = name.starts_with('.') && (name.ends_with(".tmp") || name.contains(".claimed-"));
            if !orphan {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            if modified <= cutoff {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => tracing::debug!(file = %name, "orphaned checkpoint file removed"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    async fn read(path: &Path) -> Result<Option<CheckpointedSession>, CheckpointError> {
        match tokio::fs::read_to_string(path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, session: CheckpointedSession) -> Result<(), CheckpointError> {
        let path = self.path_for(&session.session_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        // 先写临时文件再 rename，读者不会看到半写的 JSON
        let tmp = self.dir.join(format!(".{}.tmp", session.session_id));
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&session)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn peek(&self, session_id: &str) -> Result<Option<CheckpointedSession>, CheckpointError> {
        Self::read(&self.path_for(session_id)?).await
    }

    async fn take(&self, session_id: &str) -> Result<Option<CheckpointedSession>, CheckpointError> {
        let path = self.path_for(session_id)?;
        let claimed = self
            .dir
            .join(format!(".{session_id}.claimed-{}", uuid::Uuid::new_v4()));
        match tokio::fs::rename(&path, &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let session = Self::read(&claimed).await;
        tokio::fs::remove_file(&claimed).await?;
        session
    }

    async fn purge_older_than(&self, age: Duration) -> Result<usize, CheckpointError> {
        let cutoff = cutoff(age);
        let mut purged = 0;
        for id in self.session_ids().await? {
            let path = self.path_for(&id)?;
            let stale = match Self::read(&path).await {
                Ok(Some(session)) => session.created_at < cutoff,
                Ok(None) => false,
                Err(CheckpointError::Serde(e)) => {
                    tracing::warn!(session_id = %id, error = %e, "unreadable checkpoint purged");
                    true
                }
                Err(e) => return Err(e),
            };
            if stale {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => purged += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        self.sweep_orphans(age).await?;
        Ok(purged)
    }

    async fn session_ids(&self) -> Result<Vec<String>, CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".json") {
                if validate_session_id(id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SharedState;
    use crate::plan::WorkerName;
    use std::sync::Arc;

    fn session(id: &str) -> CheckpointedSession {
        CheckpointedSession::new(id, SharedState::seed("quiz me"), WorkerName::AwaitSubmission)
    }

    async fn exercise_take_once(store: Arc<dyn CheckpointStore>) {
        store.save(session("s1")).await.unwrap();
        assert!(store.peek("s1").await.unwrap().is_some());

        let first = store.take("s1").await.unwrap().unwrap();
        assert_eq!(first.saved_state.user_prompt, "quiz me");
        assert!(store.take("s1").await.unwrap().is_none());
        assert!(store.peek("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_take_is_at_most_once() {
        exercise_take_once(Arc::new(InMemoryCheckpointStore::new())).await;
    }

    #[tokio::test]
    async fn test_file_take_is_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        exercise_take_once(Arc::new(FileCheckpointStore::new(dir.path()))).await;
    }

    #[tokio::test]
    async fn test_concurrent_take_has_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCheckpointStore::new(dir.path()));
        store.save(session("race")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.take("race").await.unwrap().is_some() }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let store = InMemoryCheckpointStore::new();
        store.save(session("a")).await.unwrap();
        store.save(session("b")).await.unwrap();
        store.take("a").await.unwrap();
        assert_eq!(store.session_ids().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let mut old = session("old");
        old.created_at = Utc::now() - chrono::Duration::hours(48);
        store.save(old).await.unwrap();
        store.save(session("fresh")).await.unwrap();

        let purged = store.purge_older_than(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.session_ids().await.unwrap(), vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_purge_sweeps_orphaned_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let tmp = dir.path().join(".s1.tmp");
        let claimed = dir.path().join(".s2.claimed-0000");
        std::fs::write(&tmp, b"{").unwrap();
        std::fs::write(&claimed, b"{}").unwrap();

        // 未过保留期的遗留文件保留
        assert_eq!(store.purge_older_than(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(tmp.exists() && claimed.exists());

        assert_eq!(store.purge_older_than(Duration::ZERO).await.unwrap(), 0);
        assert!(!tmp.exists());
        assert!(!claimed.exists());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let err = store.take("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidSessionId(_)));
    }
}
