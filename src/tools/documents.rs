//! 文档上下文检索
//!
//! InMemoryDocuments 按段落切分文本，检索时按查询与段落的分词重叠数排序取前 k 段。
//! 没有真实向量库；文档接入与嵌入流水线不在本 crate 范围内。

use std::collections::HashSet;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::memory::tokenizer::{overlap_score, tokenize_to_set};
use crate::tools::{DocumentContext, ToolError};

pub const NO_DOCUMENT_CONTEXT: &str = "No relevant document context found.";

/// 内存文档库：(段落原文, 词集合)
pub struct InMemoryDocuments {
    chunks: RwLock<Vec<(String, HashSet<String>)>>,
    top_k: usize,
}

impl InMemoryDocuments {
    pub fn new(top_k: usize) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            top_k: top_k.max(1),
        }
    }

    /// 按空行切段后加入
    pub fn add(&self, text: &str) {
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            chunks.push((para.to_string(), tokenize_to_set(para)));
        }
    }

    /// 读取目录下的 .md / .txt 文件（不递归）
    pub fn load_dir(&self, dir: &Path) -> std::io::Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_text = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("md") | Some("txt")
            );
            if path.is_file() && is_text {
                self.add(&std::fs::read_to_string(&path)?);
                loaded += 1;
            }
        }
        tracing::info!(dir = %dir.display(), files = loaded, "documents loaded");
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search(&self, query: &str) -> Vec<String> {
        let query_tokens = tokenize_to_set(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(usize, &String)> = chunks
            .iter()
            .map(|(text, tokens)| (overlap_score(&query_tokens, tokens), text))
            .filter(|(s, _)| *s > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

impl Default for InMemoryDocuments {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl DocumentContext for InMemoryDocuments {
    async fn lookup_document_context(&self, query: &str) -> Result<String, ToolError> {
        let hits = self.search(query);
        if hits.is_empty() {
            Ok(NO_DOCUMENT_CONTEXT.to_string())
        } else {
            Ok(hits.join("\n---\n"))
        }
    }
}

/// 未加载任何文档时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDocuments;

#[async_trait]
impl DocumentContext for NoopDocuments {
    async fn lookup_document_context(&self, _query: &str) -> Result<String, ToolError> {
        Err(ToolError::NotConfigured("document context".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_ranks_by_overlap() {
        let docs = InMemoryDocuments::new(1);
        docs.add("Ownership moves values between bindings.\n\nBorrowing lets you reference a value without taking ownership of it.");
        assert_eq!(docs.len(), 2);

        let ctx = docs
            .lookup_document_context("explain borrowing and ownership")
            .await
            .unwrap();
        assert!(ctx.starts_with("Borrowing"));
    }

    #[tokio::test]
    async fn test_lookup_without_match() {
        let docs = InMemoryDocuments::default();
        docs.add("Photosynthesis converts light into chemical energy.");
        let ctx = docs.lookup_document_context("rust lifetimes").await.unwrap();
        assert_eq!(ctx, NO_DOCUMENT_CONTEXT);
    }

    #[test]
    fn test_load_dir_reads_text_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "alpha\n\nbeta").unwrap();
        std::fs::write(dir.path().join("b.bin"), "ignored").unwrap();
        let docs = InMemoryDocuments::default();
        assert_eq!(docs.load_dir(dir.path()).unwrap(), 1);
        assert_eq!(docs.len(), 2);
    }
}
