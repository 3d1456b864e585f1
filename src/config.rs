//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BUDDY__*` 覆盖（双下划线表示嵌套，如 `BUDDY__ORCHESTRATOR__MAX_REFINE_ATTEMPTS=5`）。
//! API Key 只从环境变量读取（OPENAI_API_KEY / DEEPSEEK_API_KEY / TAVILY_API_KEY / YOUTUBE_API_KEY）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub compression: CompressionSection,
    pub tools: ToolsSection,
    pub checkpoint: CheckpointSection,
}

/// [app] 段：应用名、数据目录、对话轮数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 数据目录，未设置时用 ./data
    pub data_dir: Option<PathBuf>,
    /// 对话历史保留轮数（短期记忆）
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            data_dir: None,
            max_context_turns: 20,
        }
    }
}

impl AppSection {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("data"))
    }
}

/// [llm] 段：后端选择、分角色模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；没有任何 API Key 时回退 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 评审模型（精炼循环的 Critic），未设置时与 model 相同
    pub critic_model: Option<String>,
    /// 规划模型（Plan Builder），未设置时与 model 相同
    pub planner_model: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            critic_model: None,
            planner_model: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次模型请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [orchestrator] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 精炼循环尝试上限，路线图与测验共用
    pub max_refine_attempts: u32,
    /// 测验生成后是否插入 await_submission + user_summary（暂停等待作答并评分）
    pub grade_quizzes: bool,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_refine_attempts: 3,
            grade_quizzes: true,
        }
    }
}

/// [compression] 段：上下文压缩阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompressionSection {
    pub word_threshold: usize,
    /// 超出阈值不到该倍数时走中间档（近期原文 + 旧条目摘要）
    pub partial_tier_factor: usize,
    /// 中间档保留原文的词数占阈值的比例
    pub recent_share: f32,
}

impl Default for CompressionSection {
    fn default() -> Self {
        Self {
            word_threshold: 150,
            partial_tier_factor: 2,
            recent_share: 0.5,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsSection {
    pub search: SearchSection,
    pub video: VideoSection,
}

/// [tools.search] 段：Tavily 端点、超时与结果清洗参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_results: usize,
    /// 单条结果保留的最大字符数
    pub snippet_chars: usize,
    /// 短于该字符数的结果直接丢弃
    pub min_content_chars: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: "https://api.tavily.com/search".to_string(),
            timeout_secs: 15,
            max_results: 10,
            snippet_chars: 300,
            min_content_chars: 50,
        }
    }
}

/// [tools.video] 段：YouTube Data API
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoSection {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_results: usize,
}

impl Default for VideoSection {
    fn default() -> Self {
        Self {
            endpoint: "https://www.googleapis.com/youtube/v3/search".to_string(),
            timeout_secs: 15,
            max_results: 5,
        }
    }
}

/// [checkpoint] 段：暂停会话的存储后端与保留时长
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    /// memory / file
    pub backend: String,
    /// file 后端目录，未设置时用 {data_dir}/checkpoints
    pub dir: Option<PathBuf>,
    /// 超过该秒数未恢复的会话会被 purge 清理
    pub retention_secs: u64,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            dir: None,
            retention_secs: 7 * 24 * 3600,
        }
    }
}

/// 从 config 目录加载配置，环境变量 BUDDY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BUDDY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BUDDY")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.max_refine_attempts, 3);
        assert!(cfg.orchestrator.grade_quizzes);
        assert_eq!(cfg.compression.word_threshold, 150);
        assert_eq!(cfg.tools.search.max_results, 10);
        assert_eq!(cfg.tools.video.max_results, 5);
        assert_eq!(cfg.app.data_dir(), PathBuf::from("data"));
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buddy.toml");
        std::fs::write(
            &path,
            "[orchestrator]\nmax_refine_attempts = 5\n\n[compression]\nword_threshold = 80\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.orchestrator.max_refine_attempts, 5);
        assert_eq!(cfg.compression.word_threshold, 80);
        // 未出现的键保持默认
        assert!(cfg.orchestrator.grade_quizzes);
        assert_eq!(cfg.tools.search.snippet_chars, 300);
    }
}
