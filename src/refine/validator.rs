//! 结构化输出的解析与修复
//!
//! 先剥离 ```json 代码块或截取首尾花括号再解析；失败时把解析错误、原文与格式说明交给修复模型重写一次。

use std::sync::Arc;

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use crate::core::AgentError;
use crate::llm::LlmClient;

/// 从模型输出中提取 JSON 文本（```json ... ``` 或首个 { 到最后一个 }）
pub fn extract_json(output: &str) -> &str {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// 注入 prompt 的格式说明（含 JSON Schema）
pub fn format_instructions<T: JsonSchema>() -> String {
    let schema = serde_json::to_string_pretty(&schema_for!(T)).unwrap_or_default();
    format!(
        "Respond with a single JSON object that conforms to this JSON schema. Output only the JSON, no prose and no code fences.\n{schema}"
    )
}

/// 不经修复的直接解析
pub fn parse_json<T: DeserializeOwned>(output: &str) -> Result<T, AgentError> {
    serde_json::from_str(extract_json(output)).map_err(|e| AgentError::SchemaParseFailure(e.to_string()))
}

const REPAIR_PROMPT: &str = "You are a JSON repair agent.
The task was: {task}

The following output failed to parse:
{error}

Bad output:
{bad_output}

Rewrite it so it matches the required schema exactly, keeping its content.
{format_instructions}";

/// 解析器 + 一次修复机会
pub struct SchemaValidator {
    repair_llm: Arc<dyn LlmClient>,
}

impl SchemaValidator {
    pub fn new(repair_llm: Arc<dyn LlmClient>) -> Self {
        Self { repair_llm }
    }

    /// 解析为 T；失败时调用一次修复模型。返回 (值, 是否经过修复)
    pub async fn parse_or_repair<T>(&self, task: &str, output: &str) -> Result<(T, bool), AgentError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let error = match parse_json::<T>(output) {
            Ok(value) => return Ok((value, false)),
            Err(e) => e,
        };
        tracing::debug!(error = %error, "structured output failed to parse, attempting repair");

        let prompt = REPAIR_PROMPT
            .replace("{task}", task)
            .replace("{error}", &error.to_string())
            .replace("{bad_output}", output)
            .replace("{format_instructions}", &format_instructions::<T>());
        let repaired = self.repair_llm.generate(&prompt).await?;

        parse_json::<T>(&repaired)
            .map(|value| (value, true))
            .map_err(|e| AgentError::SchemaParseFailure(format!("repair failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```json\n{\"x\":1}\n```"), "{\"x\":1}");
        assert_eq!(extract_json("```\n{\"x\":1}\n```"), "{\"x\":1}");
        assert_eq!(extract_json("Sure! {\"x\":1} hope it helps"), "{\"x\":1}");
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[test]
    fn test_format_instructions_embed_schema() {
        let text = format_instructions::<Point>();
        assert!(text.contains("\"x\""));
        assert!(text.contains("\"required\""));
    }

    #[tokio::test]
    async fn test_valid_output_skips_repair() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let validator = SchemaValidator::new(llm.clone());
        let (p, repaired) = validator
            .parse_or_repair::<Point>("point", "{\"x\":1,\"y\":2}")
            .await
            .unwrap();
        assert_eq!(p, Point { x: 1, y: 2 });
        assert!(!repaired);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_repair_is_called_once_with_error_and_bad_output() {
        let llm = Arc::new(ScriptedLlmClient::new(["{\"x\":3,\"y\":4}"]));
        let validator = SchemaValidator::new(llm.clone());
        let (p, repaired) = validator
            .parse_or_repair::<Point>("point", "{\"x\":3}")
            .await
            .unwrap();
        assert_eq!(p, Point { x: 3, y: 4 });
        assert!(repaired);
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("missing field `y`"));
        assert!(prompt.contains("{\"x\":3}"));
    }

    #[tokio::test]
    async fn test_failed_repair_is_parse_failure() {
        let llm = Arc::new(ScriptedLlmClient::new(["still broken"]));
        let validator = SchemaValidator::new(llm.clone());
        let err = validator
            .parse_or_repair::<Point>("point", "garbage")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SchemaParseFailure(_)));
        assert_eq!(llm.calls(), 1);
    }
}
