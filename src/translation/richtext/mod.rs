//! 富文本令牌协议
//!
//! - `classify`: 内联元素分类（成对 / 原子 / 展平 / 跳过）
//! - `sanitize`: 克隆元素的属性消毒
//! - `codec`: 令牌化、输出解析、校验与渲染

pub mod classify;
pub mod codec;
pub mod sanitize;

pub use classify::{classify, classify_parts, has_inline_tokens, InlineKind, PairedTag};
pub use codec::{
    looks_truncated, normalize_output, parse_output, render, strip_tokens, tokenize, validate,
    OutputItem, TokenEntry, TokenKind, TokenizedParagraph, RICH_V2_MARKER,
};
