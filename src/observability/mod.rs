//! 可观测性：tracing 初始化与结构化审计日志

use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// 初始化全局 subscriber（RUST_LOG 可覆盖，默认 info）；重复调用时静默忽略
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .with(fmt::layer())
        .try_init();
}

/// 输出一条 JSON 审计日志，event 字段写入 payload
pub fn audit(event: &str, mut payload: serde_json::Value) {
    if let Some(obj) = payload.as_object_mut() {
        obj.insert("event".to_string(), serde_json::Value::from(event));
    }
    tracing::info!(audit = %payload.to_string(), "{}", event);
}

/// 截断过长文本用于日志预览
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_by_chars() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("编程语言", 2), "编程...");
        assert_eq!(preview("ok", 10), "ok");
    }
}
