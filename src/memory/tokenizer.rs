//! 分词模块
//!
//! 中英文混合分词：包含 CJK 时用 jieba，否则按空白切分。
//! 上下文压缩器用 word_count / tail_words 统计与截断历史，文档检索用 tokenize_to_set 计算重叠。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

/// 全局 Jieba 实例（延迟初始化）
static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3000}'..='\u{303F}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

/// 判断文本是否包含 CJK 字符
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 按"词"切分，保留原样（不转小写、不过滤短词），用于计数与截断
fn words(text: &str) -> Vec<&str> {
    if contains_cjk(text) {
        get_jieba()
            .cut(text, false)
            .into_iter()
            .filter(|w| !w.trim().is_empty())
            .collect()
    } else {
        text.split_whitespace().collect()
    }
}

/// 词数：英文按空白，中文按 jieba 精确模式
pub fn word_count(text: &str) -> usize {
    words(text).len()
}

/// 取最后 n 个词（压缩失败时的截断兜底）；相邻两个 CJK 词直接相连，其余以空格分隔
pub fn tail_words(text: &str, n: usize) -> String {
    let all = words(text);
    let start = all.len().saturating_sub(n);
    let mut out = String::new();
    let mut prev_cjk_end = false;
    for word in &all[start..] {
        let starts_cjk = word.chars().next().is_some_and(is_cjk);
        if !out.is_empty() && !(prev_cjk_end && starts_cjk) {
            out.push(' ');
        }
        out.push_str(word);
        prev_cjk_end = word.chars().last().is_some_and(is_cjk);
    }
    out
}

/// 检索用分词：小写、过滤单字符英文词
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.to_lowercase())
            .filter(|s| s.len() > 1 || is_cjk(s.chars().next().unwrap_or(' ')))
            .collect()
    } else {
        text.split(|c: char| !c.is_alphanumeric())
            .map(|s| s.to_lowercase())
            .filter(|s| s.len() > 1)
            .collect()
    }
}

/// 分词并返回词集合
pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 两个词集合的重叠分数（交集大小）
pub fn overlap_score(set1: &HashSet<String>, set2: &HashSet<String>) -> usize {
    set1.intersection(set2).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_english() {
        assert_eq!(word_count("Explain  binary search\ntrees"), 4);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn test_word_count_chinese() {
        let n = word_count("我喜欢编程和人工智能");
        assert!(n >= 3 && n <= 10, "unexpected word count {n}");
    }

    #[test]
    fn test_tail_words() {
        assert_eq!(tail_words("a b c d e", 2), "d e");
        assert_eq!(tail_words("a b", 5), "a b");
    }

    #[test]
    fn test_tail_words_mixed_text_keeps_ascii_spacing() {
        let tail = tail_words("hello world 你好", 10);
        assert!(tail.starts_with("hello world"), "got {tail}");
        assert!(tail.ends_with("你好"), "got {tail}");
        assert!(!tail.contains("helloworld"));
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = tokenize("Rust, ownership; and borrowing!");
        assert!(tokens.contains(&"rust".to_string()));
        assert!(tokens.contains(&"borrowing".to_string()));
    }

    #[test]
    fn test_tokenize_mixed() {
        let tokens = tokenize("我喜欢 Rust 编程语言");
        assert!(tokens.iter().any(|t| t == "rust" || t.contains("编程")));
    }

    #[test]
    fn test_overlap_score() {
        let set1 = tokenize_to_set("Rust programming");
        let set2 = tokenize_to_set("Rust language");
        assert_eq!(overlap_score(&set1, &set2), 1);
    }
}
