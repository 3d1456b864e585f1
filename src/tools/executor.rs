//! 协作方调用执行器
//!
//! 对每次外部调用施加超时，超时转为 ToolError::Timeout；每次调用输出结构化审计日志（JSON）。

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::observability::{audit, preview};
use crate::tools::ToolError;

/// 在超时内执行协作方调用并记录审计日志
pub async fn audited<T, F>(
    collaborator: &str,
    query: &str,
    limit: Duration,
    fut: F,
) -> Result<T, ToolError>
where
    F: Future<Output = Result<T, ToolError>>,
{
    let start = Instant::now();
    let result = timeout(limit, fut).await;

    let outcome = match &result {
        Ok(Ok(_)) => "ok",
        Ok(Err(_)) => "error",
        Err(_) => "timeout",
    };
    audit(
        "collaborator_audit",
        serde_json::json!({
            "collaborator": collaborator,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "query_preview": preview(query, 200),
        }),
    );

    match result {
        Ok(inner) => inner,
        Err(_) => Err(ToolError::Timeout(collaborator.to_string())),
    }
}
