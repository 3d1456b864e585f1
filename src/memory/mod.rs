//! 记忆层：短期对话历史、中英文分词、规划前的上下文压缩

pub mod compressor;
pub mod conversation;
pub mod tokenizer;

pub use compressor::{CompressionTier, ContextCompressor};
pub use conversation::{ConversationMemory, Message, Role};
