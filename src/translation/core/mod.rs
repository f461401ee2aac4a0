//! 翻译系统核心模块
//!
//! 整合文本收集、批次编排与流式传输，为上层提供文档级的翻译接口。
//!
//! ## 模块依赖关系
//!
//! ```text
//! TranslationService (service.rs)
//!     ├── TextCollector (pipeline/collector.rs)
//!     └── BatchOrchestrator (pipeline/batch.rs)
//!             ├── StreamTransport (transport/)
//!             ├── StreamSplitter (pipeline/stream.rs)
//!             ├── RenderTarget (pipeline/target.rs)
//!             └── TranslationCache (storage/cache.rs)
//! ```

pub mod service;

/// 统一翻译服务 - 主要的对外接口
pub use service::TranslationService;

/// 服务运行统计信息
pub use service::{ServiceStats, ServiceStatsSnapshot};

/// 单次文档翻译的结果
pub use service::{TranslationOutcome, TranslationSummary};
