//! # Inline Translate
//!
//! 通过流式 LLM chat-completions 接口原地翻译 HTML 文档：译文逐段流入
//! 源元素末尾的译文节点，链接、强调、脚注等内联标记经令牌协议保留下来。
//!
//! ## 模块组织
//!
//! - `parsers` - HTML 解析、DOM 操作与序列化
//! - `translation` - 翻译服务、批次编排、流解析、令牌协议与传输
//! - `env` - 类型化的环境变量访问

pub mod env;
pub mod parsers;
pub mod translation;

// Re-export commonly used items for convenience
pub use parsers::*;
pub use translation::{TranslationConfig, TranslationError, TranslationResult, TranslationService};
