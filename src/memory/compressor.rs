//! 上下文压缩器
//!
//! 规划前把累积的历史压到有界大小，每次 Plan Builder 调用前执行一次：
//! - 词数低于阈值：原样保留历史 + 原始请求
//! - 超出阈值但不到 partial_tier_factor 倍：最近若干条原样保留，其余交给模型摘要
//! - 更大：整体摘要
//!
//! 摘要调用失败时退化为截取最后 threshold 个词，不中断规划。

use std::sync::Arc;

use crate::config::CompressionSection;
use crate::llm::LlmClient;
use crate::memory::tokenizer::{tail_words, word_count};

/// 压缩档位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionTier {
    Verbatim,
    Partial,
    Full,
}

pub struct ContextCompressor {
    llm: Arc<dyn LlmClient>,
    word_threshold: usize,
    partial_tier_factor: usize,
    recent_share: f32,
}

impl ContextCompressor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self::from_section(llm, &CompressionSection::default())
    }

    pub fn from_section(llm: Arc<dyn LlmClient>, section: &CompressionSection) -> Self {
        Self {
            llm,
            word_threshold: section.word_threshold.max(1),
            partial_tier_factor: section.partial_tier_factor.max(1),
            recent_share: section.recent_share.clamp(0.0, 1.0),
        }
    }

    pub fn with_threshold(mut self, words: usize) -> Self {
        self.word_threshold = words.max(1);
        self
    }

    pub fn tier_for(&self, words: usize) -> CompressionTier {
        if words < self.word_threshold {
            CompressionTier::Verbatim
        } else if words < self.word_threshold * self.partial_tier_factor {
            CompressionTier::Partial
        } else {
            CompressionTier::Full
        }
    }

    /// 压缩历史条目（旧 → 新）并附上原始请求
    pub async fn compress(&self, history: &[String], original_request: &str) -> String {
        let raw = history.join("\n");
        let words = word_count(&raw);
        let tier = self.tier_for(words);
        tracing::debug!(words, ?tier, "compressing context");

        match tier {
            CompressionTier::Verbatim => verbatim(original_request, &raw),
            CompressionTier::Partial => {
                let (older, recent) = self.split_recent(history);
                if older.is_empty() {
                    return self.summarize_all(original_request, &raw).await;
                }
                match self.summarize(&older.join("\n")).await {
                    Some(summary) => format!(
                        "ORIGINAL USER REQUEST: {original_request}\n\nCOMPRESSED RESEARCH CONTEXT: {summary}\n\nRECENT HISTORY:\n{}",
                        recent.join("\n")
                    ),
                    None => self.truncated(original_request, &raw),
                }
            }
            CompressionTier::Full => self.summarize_all(original_request, &raw).await,
        }
    }

    async fn summarize_all(&self, original_request: &str, raw: &str) -> String {
        match self.summarize(raw).await {
            Some(summary) => format!(
                "ORIGINAL USER REQUEST: {original_request}\n\nCOMPRESSED RESEARCH CONTEXT: {summary}"
            ),
            None => self.truncated(original_request, raw),
        }
    }

    async fn summarize(&self, text: &str) -> Option<String> {
        let prompt = format!("Provide a high-density summary of this research: {text}");
        match self.llm.generate(&prompt).await {
            Ok(summary) => Some(summary.trim().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "context summarization failed, truncating history");
                None
            }
        }
    }

    fn truncated(&self, original_request: &str, raw: &str) -> String {
        format!(
            "ORIGINAL USER REQUEST: {original_request}\n\nTRUNCATED HISTORY (summary unavailable):\n{}",
            tail_words(raw, self.word_threshold)
        )
    }

    /// 从最新条目往回取，直到达到 recent_share * threshold 个词
    fn split_recent<'a>(&self, history: &'a [String]) -> (&'a [String], &'a [String]) {
        let budget = (self.word_threshold as f32 * self.recent_share) as usize;
        let mut used = 0;
        let mut split = history.len();
        for (i, entry) in history.iter().enumerate().rev() {
            let n = word_count(entry);
            if used + n > budget {
                break;
            }
            used += n;
            split = i;
        }
        history.split_at(split)
    }
}

fn verbatim(original_request: &str, raw: &str) -> String {
    format!("ORIGINAL USER REQUEST: {original_request}\n\nRAW HISTORY:\n{raw}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};

    fn words(n: usize, tag: &str) -> String {
        vec![tag; n].join(" ")
    }

    #[tokio::test]
    async fn test_below_threshold_is_identity_plus_request() {
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let compressor = ContextCompressor::new(llm.clone());
        let history = vec!["User: hi".to_string(), "Assistant: hello".to_string()];

        let out = compressor.compress(&history, "teach me rust").await;
        assert_eq!(
            out,
            "ORIGINAL USER REQUEST: teach me rust\n\nRAW HISTORY:\nUser: hi\nAssistant: hello"
        );
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_far_over_threshold_summarizes_everything() {
        let llm = Arc::new(ScriptedLlmClient::new(["dense digest"]));
        let compressor = ContextCompressor::new(llm.clone());
        let history = vec![words(400, "x")];

        let out = compressor.compress(&history, "req").await;
        assert_eq!(out, "ORIGINAL USER REQUEST: req\n\nCOMPRESSED RESEARCH CONTEXT: dense digest");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_moderately_over_keeps_recent_verbatim() {
        let llm = Arc::new(ScriptedLlmClient::new(["old digest"]));
        let compressor = ContextCompressor::new(llm.clone());
        let history = vec![words(100, "old"), words(60, "mid"), words(40, "new")];

        let out = compressor.compress(&history, "req").await;
        assert!(out.contains("COMPRESSED RESEARCH CONTEXT: old digest"));
        assert!(out.contains(&format!("RECENT HISTORY:\n{}", words(40, "new"))));
        assert!(!out.contains("mid mid"));
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("old old") && prompt.contains("mid mid"));
        assert!(!prompt.contains("new new"));
    }

    #[tokio::test]
    async fn test_summary_failure_truncates() {
        let llm = Arc::new(ScriptedLlmClient::failing(LlmError::Timeout(5)));
        let compressor = ContextCompressor::new(llm).with_threshold(3);
        let history = vec!["one two three four five six seven".to_string()];

        let out = compressor.compress(&history, "req").await;
        assert!(out.ends_with("TRUNCATED HISTORY (summary unavailable):\nfive six seven"));
    }

    #[test]
    fn test_tier_boundaries() {
        let compressor = ContextCompressor::new(Arc::new(ScriptedLlmClient::default()));
        assert_eq!(compressor.tier_for(149), CompressionTier::Verbatim);
        assert_eq!(compressor.tier_for(150), CompressionTier::Partial);
        assert_eq!(compressor.tier_for(299), CompressionTier::Partial);
        assert_eq!(compressor.tier_for(300), CompressionTier::Full);
    }
}
