//! 翻译管道模块
//!
//! - `collector` / `filters`: 扫描文档、挑选段落
//! - `sizing`: 批次大小策略
//! - `batch`: 批次编排
//! - `stream`: `%%` 分隔符解析
//! - `target`: 译文节点生命周期

pub mod batch;
pub mod collector;
pub mod filters;
pub mod sizing;
pub mod stream;
pub mod target;

// 重新导出主要类型
pub use batch::{BatchOrchestrator, BatchStats, SchedulerState};
pub use collector::{CollectorOptions, RichTextMode, TextCollector, TranslationContext};
pub use filters::{detect_language, is_excluded_domain, should_skip_translation, DetectedLanguage};
pub use sizing::{estimate_tokens, BatchSizePolicy, FixedBatchSize, TokenBudgetPolicy};
pub use stream::{Dispatch, ParagraphMode, StreamSplitter};
pub use target::RenderTarget;
