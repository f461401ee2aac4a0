//! 翻译模块
//!
//! 通过流式 chat-completions 接口逐段原地翻译 HTML 文档：
//! - **core**: 文档级翻译服务
//! - **pipeline**: 段落收集、批次编排、`%%` 流解析与译文节点
//! - **richtext**: 保留内联标记的令牌协议
//! - **transport**: 流式传输（事件通道、SSE、HTTP）
//! - **storage**: 翻译结果缓存
//! - **config**: 配置与提示词
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use inline_translate::parsers::html::{html_to_dom, serialize_document};
//! use inline_translate::translation::{TranslationConfig, TranslationService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TranslationConfig::default_with_lang("zh-CN", None);
//! let service = TranslationService::from_config(config)?;
//!
//! let dom = html_to_dom(b"<p>Streaming translation in place.</p>", "utf-8");
//! service.translate_document(&dom, Some("https://example.org/")).await?;
//! let html = serialize_document(&dom, "utf-8")?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 配置管理模块 - 配置加载、环境变量覆盖与提示词组装
pub mod config;

/// 核心翻译服务模块
pub mod core;

/// 错误处理模块 - 统一的错误类型和用户消息脱敏
pub mod error;

/// 翻译管道模块 - 收集、批次编排、流解析与渲染
pub mod pipeline;

/// 富文本令牌协议
pub mod richtext;

/// 存储模块 - 翻译结果缓存
pub mod storage;

/// 流式传输模块
pub mod transport;

// ============================================================================
// 核心API导出
// ============================================================================

pub use self::core::{ServiceStats, TranslationOutcome, TranslationService, TranslationSummary};

pub use config::{constants, ConfigManager, TranslationConfig};

pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};

// ============================================================================
// 高级API导出
// ============================================================================

pub use pipeline::{
    BatchOrchestrator, BatchSizePolicy, BatchStats, FixedBatchSize, RenderTarget, RichTextMode,
    StreamSplitter, TextCollector, TokenBudgetPolicy, TranslationContext,
};

pub use storage::{CacheStats, TranslationCache};

pub use transport::{
    stream_channel, HttpTransport, RequestConfig, StreamChannel, StreamEvent, StreamSender,
    StreamTransport, TranslateRequest,
};

// ============================================================================
// 便利函数
// ============================================================================

/// 使用给定配置和 HTTP 传输翻译文档
///
/// 一次性调用；需要跨文档复用缓存时直接持有 [`TranslationService`]。
pub async fn translate_document(
    dom: &markup5ever_rcdom::RcDom,
    config: TranslationConfig,
    page_url: Option<&str>,
) -> TranslationResult<TranslationSummary> {
    let service = TranslationService::from_config(config)?;
    service.translate_document(dom, page_url).await
}
