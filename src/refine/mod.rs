//! 精炼循环：生成 → 解析/修复 → 评审，带显式尝试上限
//!
//! 任何需要结构化输出的 worker 都通过 RefinementLoop 生成 RefineTarget；
//! 耗尽是终止状态（RefineOutcome::Exhausted），不是错误。

pub mod critic;
pub mod loop_;
pub mod validator;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use critic::{Critic, CriticVerdict};
pub use loop_::{RefineOutcome, RefineState, Refined, RefinementLoop};
pub use validator::{extract_json, format_instructions, SchemaValidator};

/// 可被精炼循环生成的结构化目标
pub trait RefineTarget: DeserializeOwned + Serialize + JsonSchema + Send + Sync {
    /// 用于 prompt 与日志的名称
    const NAME: &'static str;

    /// 业务规则违例，空表示通过
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }
}

/// 单次尝试的校验结果；只看最新一次
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// 由违例列表构建；列表为空即视为通过
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}
